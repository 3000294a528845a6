use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Socket establishment seam.
///
/// The default walks the resolved address list in order. A per-request
/// override replaces the whole step; tunnels, unix-socket shims, and test
/// doubles plug in here.
#[async_trait]
pub trait Connect: Send + Sync {
  /// Open a TCP stream to one of `addrs`.
  async fn connect(&self, addrs: &[SocketAddr]) -> io::Result<TcpStream>;
}

/// Default connector: first address that accepts wins
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connect for TcpConnector {
  async fn connect(&self, addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err: Option<io::Error> = None;
    for addr in addrs {
      match TcpStream::connect(addr).await {
        Ok(stream) => return Ok(stream),
        Err(e) => last_err = Some(e),
      }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty address list")))
  }
}
