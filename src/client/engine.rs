use crate::client::executor::{run, RequestJob};
use crate::client::options::{ProxyChoice, RequestOptions};
use crate::config::{proxy_from_env, Config, Proxy};
use crate::dns::{Resolve, SystemResolver};
use crate::method::Method;
use crate::response::Response;
use crate::transport::connector::{Connect, TcpConnector};
use crate::transport::pool::Registry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// The process-scoped request engine.
///
/// Owns the connection registry, the configured defaults, and the default
/// proxy. Cloning is cheap and shares all of it; the free functions at the
/// crate root bind to a lazily-created default instance, while tests and
/// embedders build their own.
#[derive(Clone)]
pub struct Engine {
  inner: Arc<EngineInner>,
}

struct EngineInner {
  registry: Registry,
  config: Config,
  resolver: Arc<dyn Resolve>,
  connector: Arc<dyn Connect>,
  default_proxy: Mutex<Option<Proxy>>,
}

impl Engine {
  /// Engine with default configuration and OS adapters. The default proxy
  /// is seeded once from the lowercase `http_proxy` environment variable.
  #[must_use]
  pub fn new() -> Self {
    Self::with_config(Config::default())
  }

  /// Engine with custom configuration and OS adapters
  #[must_use]
  pub fn with_config(config: Config) -> Self {
    Self::with_adapters(config, Arc::new(SystemResolver), Arc::new(TcpConnector))
  }

  /// Engine with custom resolver and connector seams
  #[must_use]
  pub fn with_adapters(config: Config, resolver: Arc<dyn Resolve>, connector: Arc<dyn Connect>) -> Self {
    Self {
      inner: Arc::new(EngineInner {
        registry: Registry::new(config.max_per_host, config.persistent_timeout),
        default_proxy: Mutex::new(proxy_from_env()),
        resolver,
        connector,
        config,
      }),
    }
  }

  /// Replace the default proxy used by requests that don't choose their
  /// own
  pub fn set_default_proxy(&self, proxy: Option<Proxy>) {
    *self
      .inner
      .default_proxy
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner) = proxy;
  }

  /// The current default proxy
  #[must_use]
  pub fn default_proxy(&self) -> Option<Proxy> {
    self
      .inner
      .default_proxy
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
      .clone()
  }

  /// Connections currently attached to requests; idle pooled connections
  /// are not counted
  #[must_use]
  pub fn active(&self) -> usize {
    self.inner.registry.active()
  }

  /// The engine's configuration
  #[must_use]
  pub fn config(&self) -> &Config {
    &self.inner.config
  }

  /// Issue a request and await its response in place.
  ///
  /// Dropping the returned future cancels the request and releases every
  /// held resource; the response is simply never produced.
  pub async fn fetch(&self, method: Method, url: &str, opts: RequestOptions) -> Response {
    run(self.job(method, url, opts)).await
  }

  /// Issue a request as a background task; `on_done` receives the
  /// response exactly once.
  ///
  /// The returned handle cancels the request when dropped before
  /// completion: the in-flight connection is torn down, any queue position
  /// is given up, and `on_done` never fires. Call
  /// [`detach`](RequestHandle::detach) to let the request finish on its
  /// own.
  pub fn dispatch(
    &self,
    method: Method,
    url: &str,
    opts: RequestOptions,
    on_done: impl FnOnce(Response) + Send + 'static,
  ) -> RequestHandle {
    let job = self.job(method, url, opts);
    let done = Arc::new(AtomicBool::new(false));
    let done_flag = Arc::clone(&done);
    let task = tokio::spawn(async move {
      let response = run(job).await;
      done_flag.store(true, Ordering::SeqCst);
      on_done(response);
    });
    RequestHandle {
      task,
      done,
      detached: false,
    }
  }

  fn job(&self, method: Method, url: &str, mut opts: RequestOptions) -> RequestJob {
    let proxy = match std::mem::take(&mut opts.proxy) {
      ProxyChoice::Default => self.default_proxy(),
      ProxyChoice::Direct => None,
      ProxyChoice::Via(proxy) => Some(proxy),
    };
    RequestJob {
      method,
      url: String::from(url),
      opts,
      config: self.inner.config.clone(),
      registry: self.inner.registry.clone(),
      resolver: Arc::clone(&self.inner.resolver),
      connector: Arc::clone(&self.inner.connector),
      proxy,
    }
  }
}

impl Default for Engine {
  fn default() -> Self {
    Self::new()
  }
}

/// Cancellation handle for a dispatched request.
///
/// Dropping it before the completion callback has fired aborts the request
/// and suppresses the callback. [`detach`](Self::detach) relinquishes
/// that: the request runs to completion unobserved.
pub struct RequestHandle {
  task: JoinHandle<()>,
  done: Arc<AtomicBool>,
  detached: bool,
}

impl RequestHandle {
  /// Let the request run to completion; the handle no longer cancels
  pub fn detach(mut self) {
    self.detached = true;
  }

  /// True once the completion callback has been entered
  #[must_use]
  pub fn is_finished(&self) -> bool {
    self.done.load(Ordering::SeqCst)
  }

  /// Cancel explicitly (same as dropping the handle)
  pub fn cancel(self) {}
}

impl Drop for RequestHandle {
  fn drop(&mut self) {
    if !self.detached && !self.done.load(Ordering::SeqCst) {
      self.task.abort();
    }
  }
}

impl std::fmt::Debug for RequestHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RequestHandle")
      .field("finished", &self.is_finished())
      .field("detached", &self.detached)
      .finish()
  }
}
