use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Hostname resolution seam.
///
/// The engine resolves through this trait so tests and embedders can swap
/// the system resolver for a fixed table or an external service. Results
/// are not cached.
#[async_trait]
pub trait Resolve: Send + Sync {
  /// Resolve `host` into socket addresses carrying `port`.
  async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
  async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
      return Err(io::Error::new(io::ErrorKind::NotFound, "no addresses"));
    }
    Ok(addrs)
  }
}
