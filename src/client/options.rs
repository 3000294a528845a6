use crate::config::Proxy;
use crate::cookie_jar::CookieJar;
use crate::headers::Headers;
use crate::response::ResponseHead;
use crate::transport::connector::Connect;
use crate::transport::tls::TlsProfile;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;

/// Callback observing the response head; returning `false` aborts the
/// request with status 598
pub type HeaderCallback = Box<dyn FnMut(&ResponseHead) -> bool + Send>;
/// Callback receiving each decoded body fragment; returning `false` aborts
/// with status 598
pub type BodyCallback = Box<dyn FnMut(&[u8]) -> bool + Send>;
/// Callback run on the raw socket right after connect, before any bytes
/// move (socket options, diagnostics)
pub type PrepareCallback = Box<dyn FnMut(&TcpStream) + Send>;

/// Which proxy a request goes through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyChoice {
  /// The engine's default proxy (env-seeded, possibly none)
  #[default]
  Default,
  /// Force a direct connection even when a default proxy is set
  Direct,
  /// Use this proxy
  Via(Proxy),
}

/// Per-request options.
///
/// Every knob a request accepts is a typed field here; there is no
/// dynamic bag, so an unknown option cannot be smuggled in. Construct
/// with [`RequestOptions::new`] and chain setters.
pub struct RequestOptions {
  pub(crate) headers: Headers,
  pub(crate) body: Vec<u8>,
  pub(crate) timeout: Option<Duration>,
  pub(crate) recurse: Option<u32>,
  pub(crate) proxy: ProxyChoice,
  pub(crate) cookie_jar: Option<Arc<Mutex<CookieJar>>>,
  pub(crate) tls: TlsProfile,
  pub(crate) session: String,
  pub(crate) persistent: Option<bool>,
  pub(crate) keepalive: bool,
  pub(crate) connector: Option<Arc<dyn Connect>>,
  pub(crate) on_prepare: Option<PrepareCallback>,
  pub(crate) on_header: Option<HeaderCallback>,
  pub(crate) on_body: Option<BodyCallback>,
  pub(crate) want_body_handle: bool,
  pub(crate) max_read_size: Option<usize>,
  pub(crate) suppressed: Vec<String>,
}

impl RequestOptions {
  /// Options with every default: no extra headers, empty body, engine
  /// timeouts, default proxy, no jar, `low` TLS profile, anonymous
  /// session, keep-alive on.
  #[must_use]
  pub fn new() -> Self {
    Self {
      headers: Headers::new(),
      body: Vec::new(),
      timeout: None,
      recurse: None,
      proxy: ProxyChoice::Default,
      cookie_jar: None,
      tls: TlsProfile::Low,
      session: String::new(),
      persistent: None,
      keepalive: true,
      connector: None,
      on_prepare: None,
      on_header: None,
      on_body: None,
      want_body_handle: false,
      max_read_size: None,
      suppressed: Vec::new(),
    }
  }

  /// Add a request header (may repeat for multi-value headers)
  #[must_use]
  pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
    self.headers.insert(name, value);
    self
  }

  /// Omit an engine-default header (`user-agent`, `te`, `referer`,
  /// `host`, `connection`, `cookie`) entirely
  #[must_use]
  pub fn suppress_header(mut self, name: impl AsRef<str>) -> Self {
    self.suppressed.push(name.as_ref().to_ascii_lowercase());
    self
  }

  /// Request body bytes
  #[must_use]
  pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  /// Inactivity timeout override for this request
  #[must_use]
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Redirect budget override
  #[must_use]
  pub fn recurse(mut self, budget: u32) -> Self {
    self.recurse = Some(budget);
    self
  }

  /// Route through this proxy
  #[must_use]
  pub fn proxy(mut self, proxy: Proxy) -> Self {
    self.proxy = ProxyChoice::Via(proxy);
    self
  }

  /// Never use a proxy, ignoring the engine default
  #[must_use]
  pub fn no_proxy(mut self) -> Self {
    self.proxy = ProxyChoice::Direct;
    self
  }

  /// Attach a shared cookie jar, consulted and updated by this request
  /// and its redirect hops
  #[must_use]
  pub fn cookie_jar(mut self, jar: Arc<Mutex<CookieJar>>) -> Self {
    self.cookie_jar = Some(jar);
    self
  }

  /// TLS profile for https targets
  #[must_use]
  pub fn tls(mut self, profile: TlsProfile) -> Self {
    self.tls = profile;
    self
  }

  /// Opaque tag partitioning the idle pool; requests only reuse
  /// connections from their own session
  #[must_use]
  pub fn session(mut self, tag: impl Into<String>) -> Self {
    self.session = tag.into();
    self
  }

  /// Force the persistence decision. Unset, idempotent requests are
  /// persistent and others are not. An explicit `true` also enables the
  /// one-shot retry on a dead reused connection for any method.
  #[must_use]
  pub fn persistent(mut self, persistent: bool) -> Self {
    self.persistent = Some(persistent);
    self
  }

  /// Allow reusing HTTP/1.0 connections that advertised keep-alive
  #[must_use]
  pub fn keepalive(mut self, keepalive: bool) -> Self {
    self.keepalive = keepalive;
    self
  }

  /// Replace the TCP connect step for this request
  #[must_use]
  pub fn connector(mut self, connector: Arc<dyn Connect>) -> Self {
    self.connector = Some(connector);
    self
  }

  /// Inspect the raw socket right after connect
  #[must_use]
  pub fn on_prepare(mut self, cb: impl FnMut(&TcpStream) + Send + 'static) -> Self {
    self.on_prepare = Some(Box::new(cb));
    self
  }

  /// Observe the response head before the body; return `false` to abort
  #[must_use]
  pub fn on_header(mut self, cb: impl FnMut(&ResponseHead) -> bool + Send + 'static) -> Self {
    self.on_header = Some(Box::new(cb));
    self
  }

  /// Stream decoded body fragments; return `false` to abort. The
  /// completion callback then receives an empty body.
  #[must_use]
  pub fn on_body(mut self, cb: impl FnMut(&[u8]) -> bool + Send + 'static) -> Self {
    self.on_body = Some(Box::new(cb));
    self
  }

  /// Hand the live stream over after the headers instead of reading the
  /// body; see [`crate::response::BodyHandle`]
  #[must_use]
  pub fn want_body_handle(mut self) -> Self {
    self.want_body_handle = true;
    self
  }

  /// Per-read buffer hint override
  #[must_use]
  pub fn max_read_size(mut self, n: usize) -> Self {
    self.max_read_size = Some(n);
    self
  }
}

impl Default for RequestOptions {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Debug for RequestOptions {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RequestOptions")
      .field("headers", &self.headers)
      .field("body_len", &self.body.len())
      .field("timeout", &self.timeout)
      .field("recurse", &self.recurse)
      .field("proxy", &self.proxy)
      .field("session", &self.session)
      .field("persistent", &self.persistent)
      .field("keepalive", &self.keepalive)
      .field("want_body_handle", &self.want_body_handle)
      .finish_non_exhaustive()
  }
}
