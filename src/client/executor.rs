//! The per-request state machine.
//!
//! A request moves Validate -> Wait -> Connect/Reuse -> Send ->
//! RecvStatus -> RecvHeaders -> (Redirect loop | RecvBody) -> Finish. Each
//! await is a suspension point; the connection's phase tags timeouts and
//! transport failures with the right pseudo status. All outcomes, success
//! or failure, leave through a single `Response` value.

use crate::client::options::RequestOptions;
use crate::client::policy::redirect_action;
use crate::config::{Config, Proxy};
use crate::dns::Resolve;
use crate::error::Error;
use crate::headers::Headers;
use crate::method::Method;
use crate::parser::body::{body_mode, BodyMode};
use crate::parser::chunked::ChunkedDecoder;
use crate::parser::headers::parse_header_block;
use crate::parser::status::parse_status_line;
use crate::parser::uri::{Scheme, Target};
use crate::response::{BodyHandle, Response, ResponseHead};
use crate::transport::connection::{ConnError, Connection, Phase};
use crate::transport::connector::Connect;
use crate::transport::pool::{ConnKey, Lease, Registry};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, trace};

/// Everything a request run needs, snapshotted at dispatch
pub(crate) struct RequestJob {
  pub method: Method,
  pub url: String,
  pub opts: RequestOptions,
  pub config: Config,
  pub registry: Registry,
  pub resolver: Arc<dyn Resolve>,
  pub connector: Arc<dyn Connect>,
  /// Proxy after resolving the per-request choice against the default
  pub proxy: Option<Proxy>,
}

/// Drive a request chain to its final response. Redirect hops loop here;
/// each prior hop's response is threaded onto the next via `redirect`.
pub(crate) async fn run(mut job: RequestJob) -> Response {
  let mut budget = job.opts.recurse.unwrap_or(job.config.max_recurse);
  let mut method = job.method;
  let mut url = job.url.clone();
  let mut body = std::mem::take(&mut job.opts.body);
  let mut referer: Option<String> = None;
  let mut prior: Option<Box<Response>> = None;

  loop {
    if budget == 0 {
      let mut resp = Response::from_error(&Error::TooManyRedirects, &url);
      resp.redirect = prior;
      return resp;
    }
    match single(&mut job, method, &url, &body, referer.as_deref()).await {
      Single::Done(mut resp) => {
        resp.redirect = prior;
        return resp;
      },
      Single::Redirect {
        mut hop,
        location,
        next_method,
        drop_body,
      } => {
        debug!(status = hop.status, to = %location, "following redirect");
        hop.redirect = prior.take();
        prior = Some(Box::new(hop));
        referer = Some(url);
        url = location;
        method = next_method;
        if drop_body {
          body.clear();
          job.opts.headers.remove("content-type");
          job.opts.headers.remove("content-length");
        }
        budget -= 1;
      },
    }
  }
}

enum Single {
  Done(Response),
  Redirect {
    hop: Response,
    location: String,
    next_method: Method,
    drop_body: bool,
  },
}

async fn single(job: &mut RequestJob, method: Method, url: &str, body: &[u8], referer: Option<&str>) -> Single {
  // Validate
  let target = match Target::split(url) {
    Ok(t) => t,
    Err(e) => return Single::Done(Response::from_error(&e, url)),
  };
  let https = target.scheme == Scheme::Https;
  let key = ConnKey {
    scheme: target.scheme,
    host: target.host.clone(),
    port: target.port,
    session: job.opts.session.clone(),
    proxy: job.proxy.as_ref().map(Proxy::identity),
  };
  let timeout = job.opts.timeout.unwrap_or(job.config.timeout);
  let max_read = job.opts.max_read_size.unwrap_or(job.config.max_read_size);
  let persistent = job.opts.persistent.unwrap_or(method.is_idempotent());
  let retriable = method.is_idempotent() || job.opts.persistent == Some(true);

  let mut retried = false;
  loop {
    // Wait: admission against the per-host cap
    let mut lease = job.registry.lease(&key).await;
    let reused = lease.is_reused();

    // Connect, ProxyIfNeeded, TLSIfNeeded -- or Reuse
    if lease.conn().is_none() {
      match establish(job, &target, https, timeout, max_read).await {
        Ok(conn) => lease.attach(conn),
        Err(e) => {
          lease.destroy();
          return Single::Done(Response::from_error(&e, url));
        },
      }
    } else if let Some(conn) = lease.conn() {
      conn.adopt(timeout, max_read);
    }

    // Send / RecvStatus / RecvHeaders
    let head_bytes = build_head(job, method, &target, body, referer, https, persistent);
    let (status_line, headers) = match exchange(&mut lease, &head_bytes, body).await {
      Ok(parts) => parts,
      Err(e) => {
        lease.destroy();
        // One-shot revalidation: a reused idle connection that died under
        // its first use is replaced, once, when re-sending is safe.
        if reused && !retried && retriable && e.is_transport() {
          debug!(host = %key.host, error = %e, "reused connection failed, revalidating once");
          retried = true;
          continue;
        }
        return Single::Done(Response::from_error(&e, url));
      },
    };

    // Cookies are applied before anything can abort or redirect.
    if let Some(jar) = &job.opts.cookie_jar {
      let lines: Vec<String> = headers.get_all("set-cookie").into_iter().map(String::from).collect();
      if !lines.is_empty() {
        let now = unix_now();
        let mut jar = jar.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for line in &lines {
          jar.set_cookie(&target.host, target.path(), line, now);
        }
      }
    }

    let mut head = ResponseHead {
      status: status_line.status,
      reason: status_line.reason,
      http_version: status_line.version,
      url: target.absolute(),
      headers,
    };

    // on_header fires exactly once, before any body movement.
    if let Some(cb) = job.opts.on_header.as_mut()
      && !cb(&head)
    {
      lease.destroy();
      return Single::Done(late_failure(&head, &Error::Aborted));
    }

    // Redirect? The hop body is never read: the connection survives only
    // when the hop provably has none, and the chain records an empty body
    // for the hop either way.
    if (300..400).contains(&head.status)
      && let Some(location) = head.headers.get("location")
      && let Some(action) = redirect_action(head.status, method)
    {
      let location = match target.resolve(&location) {
        Ok(next) => next,
        Err(e) => {
          lease.destroy();
          return Single::Done(Response::from_error(&e, url));
        },
      };
      let bodyless = matches!(
        body_mode(method, head.status, &head.headers),
        BodyMode::None | BodyMode::Length(0)
      );
      if bodyless && reuse_allowed(persistent, job.opts.keepalive, &head) {
        lease.park();
      } else {
        lease.destroy();
      }
      let hop = finished(head, Some(Vec::new()));
      return Single::Redirect {
        hop,
        location,
        next_method: action.method,
        drop_body: action.drop_body,
      };
    }

    // Hand-off: the engine stops touching the stream, its timers, and the
    // pool slot; the caller owns pacing from here.
    if job.opts.want_body_handle {
      if let Some((conn, lease)) = lease.into_handle_parts() {
        let mut resp = finished(head, None);
        resp.body_handle = Some(BodyHandle::new(conn, lease));
        return Single::Done(resp);
      }
      return Single::Done(late_failure(&head, &Error::EarlyClose));
    }

    // RecvBody
    let mode = body_mode(method, head.status, &head.headers);
    let mut collected = Vec::new();
    let streaming = job.opts.on_body.is_some();
    let mut on_body = job.opts.on_body.as_mut();
    let result = {
      // With on_body set, fragments stream out and nothing accumulates.
      let mut sink = |frag: &[u8]| -> bool {
        match on_body {
          Some(ref mut cb) => cb(frag),
          None => {
            collected.extend_from_slice(frag);
            true
          },
        }
      };
      read_body(&mut lease, mode, &mut head.headers, &mut sink).await
    };
    let fully = match result {
      Ok(fully) => fully,
      Err(e) => {
        lease.destroy();
        return Single::Done(late_failure(&head, &e));
      },
    };

    // Finish
    if fully && reuse_allowed(persistent, job.opts.keepalive, &head) {
      lease.park();
    } else {
      lease.destroy();
    }
    let body = if streaming { Vec::new() } else { collected };
    return Single::Done(finished(head, Some(body)));
  }
}

/// DNS, TCP connect (possibly to the proxy), CONNECT tunnel, TLS.
async fn establish(
  job: &mut RequestJob,
  target: &Target,
  https: bool,
  timeout: Duration,
  max_read: usize,
) -> Result<Connection, Error> {
  let (connect_host, connect_port) = match &job.proxy {
    Some(p) => (p.host.clone(), p.port),
    None => (target.host.clone(), target.port),
  };

  let addrs = tokio::time::timeout(timeout, job.resolver.resolve(&connect_host, connect_port))
    .await
    .map_err(|_| Error::Timeout(Phase::Connecting))?
    .map_err(Error::Dns)?;

  let connector = job.opts.connector.as_ref().unwrap_or(&job.connector);
  let tcp = tokio::time::timeout(timeout, connector.connect(&addrs))
    .await
    .map_err(|_| Error::Timeout(Phase::Connecting))?
    .map_err(Error::Connect)?;
  trace!(host = %connect_host, port = connect_port, "connected");

  if let Some(prepare) = job.opts.on_prepare.as_mut() {
    prepare(&tcp);
  }

  let mut conn = Connection::new(tcp, timeout, max_read);

  if job.proxy.is_some() && https {
    conn
      .proxy_connect(&format!("{}:{}", target.host, target.port))
      .await?;
  }
  if https {
    let config = job.opts.tls.client_config();
    conn = conn.into_tls(&target.host, config).await?;
  }
  Ok(conn)
}

/// Write the request and parse status line plus header block.
async fn exchange(
  lease: &mut Lease,
  head_bytes: &[u8],
  body: &[u8],
) -> Result<(crate::parser::status::StatusLine, Headers), Error> {
  lease.mark_wrote();
  let Some(conn) = lease.conn() else {
    return Err(Error::Send(std::io::Error::other("connection detached")));
  };

  conn.set_phase(Phase::Writing);
  let mut wire = Vec::with_capacity(head_bytes.len() + body.len());
  wire.extend_from_slice(head_bytes);
  wire.extend_from_slice(body);
  conn.write_all(&wire).await.map_err(|e| wire_error(e, Phase::Writing))?;

  conn.set_phase(Phase::ReadingStatus);
  let line = conn
    .read_line()
    .await
    .map_err(|e| wire_error(e, Phase::ReadingStatus))?;
  let status_line = parse_status_line(&line).map_err(Error::Header)?;

  conn.set_phase(Phase::ReadingHeaders);
  let text = conn
    .read_header_text()
    .await
    .map_err(|e| wire_error(e, Phase::ReadingHeaders))?;
  let mut headers = Headers::new();
  parse_header_block(&text, &mut headers).map_err(Error::Header)?;

  Ok((status_line, headers))
}

/// Consume the body per `mode`, delivering each decoded fragment to
/// `sink`. Returns whether the framing completed (an until-close body
/// "completes" at EOF but leaves nothing to reuse). Chunked trailers merge
/// into `headers`.
async fn read_body(
  lease: &mut Lease,
  mode: BodyMode,
  headers: &mut Headers,
  mut sink: impl FnMut(&[u8]) -> bool,
) -> Result<bool, Error> {
  let Some(conn) = lease.conn() else {
    return Err(Error::Body(std::io::Error::other("connection detached")));
  };
  conn.set_phase(Phase::ReadingBody);

  match mode {
    BodyMode::None => Ok(true),
    BodyMode::Length(len) => {
      let mut remaining = usize::try_from(len).unwrap_or(usize::MAX);
      while remaining > 0 {
        if conn.buffer().is_empty() {
          let n = conn.fill().await.map_err(|e| wire_error(e, Phase::ReadingBody))?;
          if n == 0 {
            return Err(Error::TruncatedBody);
          }
        }
        let take = remaining.min(conn.buffer().len());
        let frag = conn.buffer().split_to(take);
        remaining -= take;
        if !sink(&frag) {
          return Err(Error::Aborted);
        }
      }
      Ok(true)
    },
    BodyMode::Chunked => {
      let mut decoder = ChunkedDecoder::new();
      loop {
        let mut out = Vec::new();
        let done = decoder.advance(conn.buffer(), &mut out).map_err(Error::Chunk)?;
        if !out.is_empty() && !sink(&out) {
          return Err(Error::Aborted);
        }
        if done {
          headers.extend(decoder.trailers());
          return Ok(true);
        }
        let n = conn.fill().await.map_err(|e| wire_error(e, Phase::ReadingBody))?;
        if n == 0 {
          return Err(Error::TruncatedBody);
        }
      }
    },
    BodyMode::UntilClose => loop {
      if !conn.buffer().is_empty() {
        let len = conn.buffer().len();
        let frag = conn.buffer().split_to(len);
        if !sink(&frag) {
          return Err(Error::Aborted);
        }
      }
      let n = conn.fill().await.map_err(|e| wire_error(e, Phase::ReadingBody))?;
      if n == 0 {
        // Clean EOF ends the body; the connection is spent.
        return Ok(false);
      }
    },
  }
}

/// Serialize the request line and header block.
pub(crate) fn build_head(
  job: &RequestJob,
  method: Method,
  target: &Target,
  body: &[u8],
  referer: Option<&str>,
  https: bool,
  persistent: bool,
) -> Vec<u8> {
  // A plain forward proxy sees the absolute URL; everything else gets
  // origin-form.
  let request_target = if job.proxy.is_some() && !https {
    target.absolute()
  } else {
    target.path_and_query.clone()
  };

  let user = &job.opts.headers;
  let suppressed = |name: &str| job.opts.suppressed.iter().any(|s| s == name);
  let defaulted = |name: &str| !user.contains(name) && !suppressed(name);

  let mut head = format!("{} {} HTTP/1.1\r\n", method.as_str(), request_target);
  if defaulted("host") {
    head.push_str(&format!("Host: {}\r\n", target.authority()));
  }
  if defaulted("connection") {
    head.push_str(if persistent {
      "Connection: keep-alive\r\n"
    } else {
      "Connection: close\r\n"
    });
  }
  if (!body.is_empty() || method.implies_length()) && !user.contains("content-length") {
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
  }
  if defaulted("cookie")
    && let Some(jar) = &job.opts.cookie_jar
  {
    let mut jar = jar.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(cookies) = jar.cookie_header(&target.host, target.path(), https, unix_now()) {
      head.push_str(&format!("Cookie: {cookies}\r\n"));
    }
  }
  if defaulted("user-agent") {
    head.push_str(&format!("User-Agent: {}\r\n", job.config.user_agent));
  }
  if defaulted("te") {
    head.push_str("TE: trailers\r\n");
  }
  if let Some(referer) = referer
    && defaulted("referer")
  {
    head.push_str(&format!("Referer: {referer}\r\n"));
  }
  for (name, value) in user.iter() {
    head.push_str(&format!("{name}: {value}\r\n"));
  }
  head.push_str("\r\n");
  head.into_bytes()
}

/// Reuse verdict for a fully-consumed response on this connection.
pub(crate) fn reuse_allowed(persistent: bool, keepalive: bool, head: &ResponseHead) -> bool {
  if !persistent {
    return false;
  }
  let connection = head
    .headers
    .get("connection")
    .unwrap_or_default()
    .to_ascii_lowercase();
  let has_token = |token: &str| connection.split(',').any(|t| t.trim() == token);
  if head.http_version == "1.0" {
    keepalive && has_token("keep-alive")
  } else {
    !has_token("close")
  }
}

fn wire_error(e: ConnError, phase: Phase) -> Error {
  match (e, phase) {
    (ConnError::Timeout, p) => Error::Timeout(p),
    (ConnError::Io(e), Phase::Writing) => Error::Send(e),
    (ConnError::Closed, Phase::Writing) => Error::Send(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
    (ConnError::Closed, Phase::ReadingStatus) => Error::EarlyClose,
    (ConnError::Io(e), Phase::ReadingBody) => Error::Body(e),
    (ConnError::Closed, Phase::ReadingBody) => Error::TruncatedBody,
    (ConnError::Io(e), _) => Error::Recv(e),
    (ConnError::Closed, _) => Error::Recv(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)),
  }
}

/// Successful completion value from a parsed head and body.
fn finished(head: ResponseHead, body: Option<Vec<u8>>) -> Response {
  Response {
    status: head.status,
    reason: head.reason,
    http_version: head.http_version,
    url: head.url,
    headers: head.headers,
    body,
    redirect: None,
    orig_status: None,
    orig_reason: None,
    body_handle: None,
  }
}

/// Failure after the header block was already delivered: the pseudo status
/// replaces the server's, which moves to `orig_status`/`orig_reason`, and
/// the received headers stay visible.
fn late_failure(head: &ResponseHead, err: &Error) -> Response {
  let mut resp = Response::from_error(err, &head.url);
  resp.http_version = head.http_version.clone();
  resp.headers = head.headers.clone();
  resp.orig_status = Some(head.status);
  resp.orig_reason = Some(head.reason.clone());
  resp
}

fn unix_now() -> i64 {
  SystemTime::now()
    .duration_since(SystemTime::UNIX_EPOCH)
    .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    .unwrap_or(0)
}
