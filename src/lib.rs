//! # evhttp
//!
//! **A non-blocking HTTP/1.x client engine**
//!
//! evhttp issues individual HTTP requests concurrently against arbitrary
//! hosts, over plain TCP or TLS, optionally through a forward proxy, while
//! enforcing a per-host connection cap with FIFO admission and reusing
//! idle persistent connections.
//!
//! It is a *library engine*, not a batteries-included client: DNS, socket
//! establishment, and TLS policy are seams you can replace per engine or
//! per request, bodies can stream through callbacks with mid-flight
//! cancellation, and every outcome (connect failures, timeouts, user aborts
//! included) arrives through one completion path as a response
//! carrying a pseudo status in the 595..=599 range.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn demo() {
//! let response = evhttp::get("http://example.com/").await;
//! println!("{} {}", response.status, response.text());
//! # }
//! ```
//!
//! ## Using an [`Engine`]
//!
//! The free functions bind to a process-default engine. Build your own for
//! custom limits, adapters, or isolation:
//!
//! ```no_run
//! use evhttp::{ConfigBuilder, Engine, Method, RequestOptions};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let engine = Engine::with_config(
//!   ConfigBuilder::new()
//!     .timeout(Duration::from_secs(30))
//!     .max_per_host(8)
//!     .build(),
//! );
//!
//! let response = engine
//!   .fetch(
//!     Method::Get,
//!     "http://example.com/",
//!     RequestOptions::new().header("accept", "text/html"),
//!   )
//!   .await;
//! assert!(response.is_success());
//! # }
//! ```
//!
//! ## Streaming and cancellation
//!
//! `on_header` and `on_body` observe the response as it arrives; returning
//! `false` from either aborts the request (status 598). A dispatched
//! request returns a [`RequestHandle`] whose drop cancels it outright:
//!
//! ```no_run
//! use evhttp::{Method, RequestOptions};
//!
//! # async fn demo(engine: evhttp::Engine) {
//! let handle = engine.dispatch(
//!   Method::Get,
//!   "http://example.com/big",
//!   RequestOptions::new().on_body(|chunk| chunk.len() < 1_000_000),
//!   |response| println!("finished: {}", response.status),
//! );
//! drop(handle); // cancelled, completion never fires
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs, clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Engine configuration and proxy definitions
pub mod config;
/// Cookie storage with Netscape-style matching
pub mod cookie_jar;
/// HTTP and cookie date parsing/formatting
pub mod httpdate;
/// Response values and the body-handle hand-off
pub mod response;

mod client;
mod dns;
mod error;
mod headers;
mod method;
pub(crate) mod parser;
mod transport;

pub use client::engine::{Engine, RequestHandle};
pub use client::options::{BodyCallback, HeaderCallback, PrepareCallback, ProxyChoice, RequestOptions};
pub use config::{Config, ConfigBuilder, Proxy};
pub use cookie_jar::CookieJar;
pub use dns::{Resolve, SystemResolver};
pub use error::Error;
pub use headers::Headers;
pub use method::Method;
pub use parser::uri::Scheme;
pub use response::{BodyHandle, Response, ResponseHead};
pub use transport::connector::{Connect, TcpConnector};
pub use transport::tls::TlsProfile;
pub use transport::Phase;

use once_cell::sync::Lazy;

static DEFAULT_ENGINE: Lazy<Engine> = Lazy::new(Engine::new);

/// The engine behind the crate-level convenience functions
#[must_use]
pub fn default_engine() -> &'static Engine {
  &DEFAULT_ENGINE
}

/// Issue a request with explicit method and options on the default engine
pub async fn request(method: Method, url: &str, opts: RequestOptions) -> Response {
  DEFAULT_ENGINE.fetch(method, url, opts).await
}

/// GET a URL with default options
pub async fn get(url: &str) -> Response {
  DEFAULT_ENGINE.fetch(Method::Get, url, RequestOptions::new()).await
}

/// HEAD a URL with default options
pub async fn head(url: &str) -> Response {
  DEFAULT_ENGINE.fetch(Method::Head, url, RequestOptions::new()).await
}

/// POST a body to a URL with default options
pub async fn post(url: &str, body: impl Into<Vec<u8>>) -> Response {
  DEFAULT_ENGINE
    .fetch(Method::Post, url, RequestOptions::new().body(body))
    .await
}

/// PUT a body to a URL with default options
pub async fn put(url: &str, body: impl Into<Vec<u8>>) -> Response {
  DEFAULT_ENGINE
    .fetch(Method::Put, url, RequestOptions::new().body(body))
    .await
}

/// DELETE a URL with default options
pub async fn delete(url: &str) -> Response {
  DEFAULT_ENGINE.fetch(Method::Delete, url, RequestOptions::new()).await
}

/// Replace the default engine's proxy (seeded at startup from the
/// lowercase `http_proxy` environment variable)
pub fn set_default_proxy(proxy: Option<Proxy>) {
  DEFAULT_ENGINE.set_default_proxy(proxy);
}

/// Connections of the default engine currently attached to requests
#[must_use]
pub fn active() -> usize {
  DEFAULT_ENGINE.active()
}
