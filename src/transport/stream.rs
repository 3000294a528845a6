use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// A TCP stream, possibly wrapped in TLS
pub enum MaybeTls {
  /// Plain-text link
  Plain(TcpStream),
  /// TLS-wrapped link
  Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for MaybeTls {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Plain(_) => f.write_str("MaybeTls::Plain"),
      Self::Tls(_) => f.write_str("MaybeTls::Tls"),
    }
  }
}

impl AsyncRead for MaybeTls {
  fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
      Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
    }
  }
}

impl AsyncWrite for MaybeTls {
  fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
    match self.get_mut() {
      Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
      Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
    }
  }

  fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Self::Plain(s) => Pin::new(s).poll_flush(cx),
      Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
    }
  }

  fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    match self.get_mut() {
      Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
      Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
    }
  }
}
