use crate::error::Error;
use crate::parser::chunked::take_line;
use crate::parser::status::parse_status_line;
use crate::transport::stream::MaybeTls;
use bytes::BytesMut;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Where a connection currently is in its lifecycle.
///
/// The executor keeps this current so transport failures and timeouts can
/// be tagged with the right pseudo status (595 before headers, 596 during
/// send/headers, 597 during body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// TCP connect in progress
  Connecting,
  /// CONNECT handshake with a proxy
  ProxyConnect,
  /// TLS negotiation
  TlsHandshake,
  /// Parked, waiting for reuse or expiry
  Idle,
  /// Request head/body going out
  Writing,
  /// Waiting for the status line
  ReadingStatus,
  /// Inside the header block
  ReadingHeaders,
  /// Consuming the body
  ReadingBody,
  /// Shut down
  Closed,
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Self::Connecting => "connecting",
      Self::ProxyConnect => "proxy CONNECT",
      Self::TlsHandshake => "TLS handshake",
      Self::Idle => "idle",
      Self::Writing => "writing request",
      Self::ReadingStatus => "reading status",
      Self::ReadingHeaders => "reading headers",
      Self::ReadingBody => "reading body",
      Self::Closed => "closed",
    })
  }
}

/// Low-level failure of a single socket operation; the executor maps these
/// onto [`Error`] variants according to the phase.
#[derive(Debug)]
pub(crate) enum ConnError {
  /// The operation itself failed
  Io(std::io::Error),
  /// The inactivity timer fired
  Timeout,
  /// Peer closed cleanly
  Closed,
}

/// One TCP (optionally TLS) link with inbound buffering.
///
/// Every read and write is bounded by the inactivity timeout; a successful
/// operation implicitly re-arms it since the next operation gets a fresh
/// window. Any failure marks the connection dirty, which bars it from
/// returning to the idle pool.
#[derive(Debug)]
pub struct Connection {
  stream: MaybeTls,
  buf: BytesMut,
  phase: Phase,
  timeout: Duration,
  max_read_size: usize,
  dirty: bool,
}

impl Connection {
  pub(crate) fn new(stream: TcpStream, timeout: Duration, max_read_size: usize) -> Self {
    Self {
      stream: MaybeTls::Plain(stream),
      buf: BytesMut::with_capacity(8 * 1024),
      phase: Phase::Connecting,
      timeout,
      max_read_size,
      dirty: false,
    }
  }

  pub(crate) fn set_phase(&mut self, phase: Phase) {
    self.phase = phase;
  }

  /// Re-arm for a new tenant request (idle reuse).
  pub(crate) fn adopt(&mut self, timeout: Duration, max_read_size: usize) {
    self.timeout = timeout;
    self.max_read_size = max_read_size;
  }

  pub(crate) fn is_dirty(&self) -> bool {
    self.dirty
  }

  /// Bytes read past the last parsed element (header block or chunk).
  pub(crate) fn buffer(&mut self) -> &mut BytesMut {
    &mut self.buf
  }

  /// Read once from the socket into the buffer. Returns the byte count,
  /// zero meaning EOF.
  pub(crate) async fn fill(&mut self) -> Result<usize, ConnError> {
    self.buf.reserve(self.max_read_size.min(16 * 1024));
    match tokio::time::timeout(self.timeout, self.stream.read_buf(&mut self.buf)).await {
      Err(_) => {
        self.dirty = true;
        Err(ConnError::Timeout)
      },
      Ok(Err(e)) => {
        self.dirty = true;
        Err(ConnError::Io(e))
      },
      Ok(Ok(n)) => Ok(n),
    }
  }

  /// Read one CRLF-terminated line. `ConnError::Closed` if the peer hangs
  /// up before the line completes.
  pub(crate) async fn read_line(&mut self) -> Result<String, ConnError> {
    loop {
      if let Some(line) = take_line(&mut self.buf) {
        return Ok(line);
      }
      if self.fill().await? == 0 {
        self.dirty = true;
        return Err(ConnError::Closed);
      }
    }
  }

  /// Read lines up to and including the blank terminator, returning the
  /// block (newline-separated, fold lines intact) without the terminator.
  pub(crate) async fn read_header_text(&mut self) -> Result<String, ConnError> {
    let mut text = String::new();
    loop {
      let line = self.read_line().await?;
      if line.is_empty() {
        return Ok(text);
      }
      text.push_str(&line);
      text.push('\n');
    }
  }

  /// Write the whole buffer out.
  pub(crate) async fn write_all(&mut self, data: &[u8]) -> Result<(), ConnError> {
    match tokio::time::timeout(self.timeout, async {
      self.stream.write_all(data).await?;
      self.stream.flush().await
    })
    .await
    {
      Err(_) => {
        self.dirty = true;
        Err(ConnError::Timeout)
      },
      Ok(Err(e)) => {
        self.dirty = true;
        Err(ConnError::Io(e))
      },
      Ok(Ok(())) => Ok(()),
    }
  }

  /// CONNECT tunnel handshake through an HTTP proxy, for https targets.
  ///
  /// Sends `CONNECT authority HTTP/1.0` and requires a 2xx reply before
  /// anything else happens on the link.
  pub(crate) async fn proxy_connect(&mut self, authority: &str) -> Result<(), Error> {
    self.phase = Phase::ProxyConnect;
    let head = format!("CONNECT {authority} HTTP/1.0\r\nHost: {authority}\r\n\r\n");
    self
      .write_all(head.as_bytes())
      .await
      .map_err(|e| self.proxy_err(e))?;
    let line = self.read_line().await.map_err(|e| self.proxy_err(e))?;
    let status = parse_status_line(&line).map_err(|_| Error::ProxyConnect(format!("bad reply: {line}")))?;
    if !(200..300).contains(&status.status) {
      return Err(Error::ProxyConnect(format!("{} {}", status.status, status.reason)));
    }
    // Discard the proxy's header block; the tunnel starts after it.
    self.read_header_text().await.map_err(|e| self.proxy_err(e))?;
    Ok(())
  }

  fn proxy_err(&self, e: ConnError) -> Error {
    match e {
      ConnError::Timeout => Error::Timeout(Phase::ProxyConnect),
      ConnError::Io(e) => Error::ProxyConnect(e.to_string()),
      ConnError::Closed => Error::ProxyConnect(String::from("proxy closed connection")),
    }
  }

  /// Wrap the link in TLS for `host`, consuming and returning the
  /// connection. Runs before the connection is attached to a lease.
  pub(crate) async fn into_tls(self, host: &str, config: Arc<ClientConfig>) -> Result<Self, Error> {
    let Self {
      stream,
      buf,
      phase: _,
      timeout,
      max_read_size,
      dirty,
    } = self;
    let MaybeTls::Plain(tcp) = stream else {
      return Err(Error::Tls(std::io::Error::other("already TLS")));
    };
    let name_host = host.trim_start_matches('[').trim_end_matches(']');
    let name = ServerName::try_from(String::from(name_host))
      .map_err(|_| Error::Tls(std::io::Error::other("invalid TLS server name")))?;
    let connector = TlsConnector::from(config);
    let tls = tokio::time::timeout(timeout, connector.connect(name, tcp))
      .await
      .map_err(|_| Error::Timeout(Phase::TlsHandshake))?
      .map_err(Error::Tls)?;
    Ok(Self {
      stream: MaybeTls::Tls(Box::new(tls)),
      buf,
      phase: Phase::TlsHandshake,
      timeout,
      max_read_size,
      dirty,
    })
  }

  /// Raw read for the body-handle hand-off: buffered bytes first, then the
  /// socket, with no timeout; the engine no longer owns pacing.
  pub(crate) async fn raw_read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
    if !self.buf.is_empty() {
      let n = self.buf.len().min(out.len());
      out[..n].copy_from_slice(&self.buf.split_to(n));
      return Ok(n);
    }
    self.stream.read(out).await
  }
}
