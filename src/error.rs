use crate::parser::ParseError;
use crate::transport::Phase;

/// Main error type for the engine.
///
/// Every failure a request can hit is a variant here. Errors never escape
/// through a separate channel: the executor converts them into a synthetic
/// response carrying a pseudo status in the 595..=599 range and delivers it
/// through the one completion path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// URL could not be parsed at all
  #[error("URL invalid: {0}")]
  BadUrl(String),
  /// URL scheme is not http or https
  #[error("URL scheme unsupported")]
  UnsupportedScheme,
  /// Redirect budget exhausted
  #[error("too many redirects")]
  TooManyRedirects,
  /// Redirect target could not be resolved or is not http(s)
  #[error("redirect unusable: {0}")]
  BadRedirect(String),
  /// DNS resolution failed or returned no addresses
  #[error("DNS resolution failed: {0}")]
  Dns(#[source] std::io::Error),
  /// TCP connect failed for every resolved address
  #[error("connect failed: {0}")]
  Connect(#[source] std::io::Error),
  /// Proxy refused or broke the CONNECT handshake
  #[error("proxy CONNECT failed: {0}")]
  ProxyConnect(String),
  /// TLS handshake failed
  #[error("TLS handshake failed: {0}")]
  Tls(#[source] std::io::Error),
  /// Writing the request head or body failed
  #[error("request send failed: {0}")]
  Send(#[source] std::io::Error),
  /// Server closed the connection before a status line arrived
  #[error("connection closed before response")]
  EarlyClose,
  /// Transport failed while the status line or headers were being read
  #[error("response receive failed: {0}")]
  Recv(#[source] std::io::Error),
  /// Status line or header block was malformed
  #[error("response header invalid: {0}")]
  Header(#[source] ParseError),
  /// Transport failed while the body was being read
  #[error("body read failed: {0}")]
  Body(#[source] std::io::Error),
  /// Chunked framing was malformed
  #[error("chunk decode failed: {0}")]
  Chunk(#[source] ParseError),
  /// Connection closed before `Content-Length` bytes arrived
  #[error("body truncated")]
  TruncatedBody,
  /// An `on_header` or `on_body` callback returned false
  #[error("user abort")]
  Aborted,
  /// The inactivity timer fired; tagged with the phase it interrupted
  #[error("timeout while {0}")]
  Timeout(Phase),
}

impl Error {
  /// Pseudo status injected into the synthetic response for this failure.
  ///
  /// 595 connect/proxy, 596 TLS/send/header, 597 body, 598 user abort,
  /// 599 non-retryable logical error.
  #[must_use]
  pub fn status(&self) -> u16 {
    match self {
      Self::BadUrl(_) | Self::UnsupportedScheme | Self::TooManyRedirects | Self::BadRedirect(_) => 599,
      Self::Dns(_) | Self::Connect(_) | Self::ProxyConnect(_) => 595,
      Self::Tls(_) | Self::Send(_) | Self::EarlyClose | Self::Recv(_) | Self::Header(_) => 596,
      Self::Body(_) | Self::Chunk(_) | Self::TruncatedBody => 597,
      Self::Aborted => 598,
      Self::Timeout(phase) => match phase {
        Phase::Writing | Phase::ReadingStatus | Phase::ReadingHeaders => 596,
        Phase::ReadingBody => 597,
        _ => 595,
      },
    }
  }

  /// True for transport-level failures that permit the one-shot retry on a
  /// reused idle connection.
  #[must_use]
  pub fn is_transport(&self) -> bool {
    matches!(self, Self::Send(_) | Self::EarlyClose | Self::Recv(_))
  }
}
