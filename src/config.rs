use crate::error::Error;
use crate::parser::uri::{Scheme, Target};
use std::time::Duration;

/// A forward HTTP proxy.
///
/// Plain http requests are rewritten to absolute-URI form and sent to the
/// proxy directly; https requests tunnel through a CONNECT handshake
/// first. The proxy's `host:port` partitions the idle pool, so direct and
/// proxied connections to the same origin never mix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
  /// Proxy hostname
  pub host: String,
  /// Proxy port
  pub port: u16,
}

impl Proxy {
  /// Proxy at `host:port`
  #[must_use]
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self { host: host.into(), port }
  }

  /// Parse a proxy URL such as `http://proxy.example:3128/`.
  ///
  /// # Errors
  /// Rejects unparseable URLs and non-http schemes (CONNECT through a TLS
  /// proxy is not supported).
  pub fn from_url(url: &str) -> Result<Self, Error> {
    let target = Target::split(url)?;
    if target.scheme != Scheme::Http {
      return Err(Error::UnsupportedScheme);
    }
    Ok(Self {
      host: target.host,
      port: target.port,
    })
  }

  /// Pool-partitioning identity
  #[must_use]
  pub(crate) fn identity(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}

/// Engine configuration.
///
/// These are the process-wide defaults; `timeout`, `recurse`, and the
/// proxy can additionally be overridden per request.
#[derive(Debug, Clone)]
pub struct Config {
  /// Redirect budget for a request chain
  pub max_recurse: u32,
  /// Inactivity timeout, reset on every successful socket operation
  pub timeout: Duration,
  /// Per-host connection cap, idle connections included
  pub max_per_host: usize,
  /// How long an idle connection survives before its slot is reclaimed
  pub persistent_timeout: Duration,
  /// `User-Agent` sent unless overridden or suppressed
  pub user_agent: String,
  /// Read buffer growth hint per socket read
  pub max_read_size: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      max_recurse: 10,
      timeout: Duration::from_secs(300),
      max_per_host: 4,
      persistent_timeout: Duration::from_secs(3),
      user_agent: concat!("evhttp/", env!("CARGO_PKG_VERSION")).into(),
      max_read_size: 64 * 1024,
    }
  }
}

/// Fluent builder for [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
  config: Config,
}

impl ConfigBuilder {
  /// Builder seeded with the defaults
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the redirect budget
  #[must_use]
  pub const fn max_recurse(mut self, n: u32) -> Self {
    self.config.max_recurse = n;
    self
  }

  /// Set the inactivity timeout
  #[must_use]
  pub const fn timeout(mut self, d: Duration) -> Self {
    self.config.timeout = d;
    self
  }

  /// Set the per-host connection cap
  #[must_use]
  pub const fn max_per_host(mut self, n: usize) -> Self {
    self.config.max_per_host = n;
    self
  }

  /// Set the idle connection lifetime
  #[must_use]
  pub const fn persistent_timeout(mut self, d: Duration) -> Self {
    self.config.persistent_timeout = d;
    self
  }

  /// Set the default `User-Agent`
  #[must_use]
  pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
    self.config.user_agent = ua.into();
    self
  }

  /// Set the per-read buffer hint
  #[must_use]
  pub const fn max_read_size(mut self, n: usize) -> Self {
    self.config.max_read_size = n;
    self
  }

  /// Finish the configuration
  #[must_use]
  pub fn build(self) -> Config {
    self.config
  }
}

/// Default proxy seeded from the environment: the lowercase `http_proxy`
/// variable, read once per process, ignored if unparseable.
pub(crate) fn proxy_from_env() -> Option<Proxy> {
  static ENV_PROXY: once_cell::sync::Lazy<Option<Proxy>> = once_cell::sync::Lazy::new(|| {
    let raw = std::env::var("http_proxy").ok()?;
    if raw.is_empty() {
      return None;
    }
    Proxy::from_url(&raw).ok()
  });
  ENV_PROXY.clone()
}
