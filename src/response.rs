use crate::error::Error;
use crate::headers::Headers;
use crate::transport::connection::Connection;
use crate::transport::pool::Lease;

/// The header portion of a response, handed to `on_header` before any body
/// bytes move
#[derive(Debug, Clone)]
pub struct ResponseHead {
  /// Status code; local failures use the 595..=599 pseudo range
  pub status: u16,
  /// Reason phrase (possibly empty)
  pub reason: String,
  /// Protocol version from the status line, e.g. `1.1`
  pub http_version: String,
  /// Absolute URL this response answers (final URL after redirects)
  pub url: String,
  /// Response headers, trailers merged in
  pub headers: Headers,
}

/// What the completion callback receives, exactly once per request.
///
/// Local failures are responses too: `status` carries the pseudo code,
/// `reason` the explanation, and `body` is `None`. After a user abort the
/// body is present but empty. When a failure or abort happens after the
/// header block was already delivered, `orig_status`/`orig_reason`
/// preserve what the server actually said.
#[derive(Debug)]
pub struct Response {
  /// Status code, or pseudo status on local failure
  pub status: u16,
  /// Reason phrase
  pub reason: String,
  /// Protocol version, empty for locally generated responses
  pub http_version: String,
  /// Absolute URL (the final one when redirects were followed)
  pub url: String,
  /// Response headers
  pub headers: Headers,
  /// Body bytes; `None` when a local failure preceded any body
  pub body: Option<Vec<u8>>,
  /// On a response that followed a redirect, the prior hop's response
  pub redirect: Option<Box<Response>>,
  /// Server status preserved across a late failure or abort
  pub orig_status: Option<u16>,
  /// Server reason preserved across a late failure or abort
  pub orig_reason: Option<String>,
  /// Live stream hand-off when `want_body_handle` was requested
  pub body_handle: Option<BodyHandle>,
}

impl Response {
  /// True for 2xx statuses
  #[must_use]
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Body decoded as UTF-8, lossily; empty string when there is none
  #[must_use]
  pub fn text(&self) -> String {
    match &self.body {
      Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
      None => String::new(),
    }
  }

  /// Length of the redirect chain hanging off this response
  #[must_use]
  pub fn redirect_hops(&self) -> usize {
    let mut hops = 0;
    let mut cursor = self.redirect.as_deref();
    while let Some(prior) = cursor {
      hops += 1;
      cursor = prior.redirect.as_deref();
    }
    hops
  }

  /// Synthesize the failure response for `err`.
  pub(crate) fn from_error(err: &Error, url: &str) -> Self {
    let status = err.status();
    Self {
      status,
      reason: err.to_string(),
      http_version: String::new(),
      url: String::from(url),
      headers: Headers::new(),
      // A user abort still delivers an (empty) body; real failures none.
      body: (status == 598).then(Vec::new),
      redirect: None,
      orig_status: None,
      orig_reason: None,
      body_handle: None,
    }
  }
}

/// Ownership transfer of a live response body stream.
///
/// Returned instead of a decoded body when `want_body_handle` is set: the
/// engine stops touching the connection (no timers, no framing, no pool
/// return) and the caller reads raw bytes at will. The pool slot stays
/// occupied ("active but untracked") until the handle is released or
/// dropped, at which point the connection is destroyed and the slot freed.
pub struct BodyHandle {
  conn: Connection,
  _lease: Lease,
}

impl BodyHandle {
  pub(crate) fn new(conn: Connection, lease: Lease) -> Self {
    Self { conn, _lease: lease }
  }

  /// Read raw stream bytes, buffered remainder first. EOF is `Ok(0)`.
  ///
  /// # Errors
  /// Propagates socket errors verbatim; no timeout applies.
  pub async fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
    self.conn.raw_read(out).await
  }

  /// Destroy the connection and give the pool slot back.
  pub fn release(self) {}
}

impl std::fmt::Debug for BodyHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("BodyHandle { .. }")
  }
}
