//! End-to-end request/response behavior against scripted mock servers.

mod support;

use evhttp::{ConfigBuilder, Engine, Method, RequestOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn engine() -> Engine {
  let e = Engine::with_config(ConfigBuilder::new().timeout(Duration::from_secs(5)).build());
  // Keep the suite hermetic even when the environment names a proxy.
  e.set_default_proxy(None);
  e
}

#[tokio::test]
async fn simple_get() {
  let mut server = support::serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;
  let url = server.url("/");

  let response = engine().fetch(Method::Get, &url, RequestOptions::new()).await;

  assert_eq!(response.status, 200);
  assert_eq!(response.reason, "OK");
  assert_eq!(response.http_version, "1.1");
  assert_eq!(response.url, url);
  assert_eq!(response.headers.get("content-length").as_deref(), Some("5"));
  assert_eq!(response.body.as_deref(), Some(&b"hello"[..]));
  assert!(response.redirect.is_none());
  assert!(response.orig_status.is_none());

  let request = server.requests.recv().await.unwrap();
  assert!(request.starts_with("GET / HTTP/1.1\r\n"), "{request}");
  assert!(request.contains(&format!("Host: {}\r\n", server.addr)), "{request}");
}

#[tokio::test]
async fn chunked_body() {
  let mut server =
    support::serve_once(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n").await;

  let response = engine().fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.status, 200);
  assert_eq!(response.body.as_deref(), Some(&b"hello"[..]));
  let _ = server.requests.recv().await.unwrap();
}

#[tokio::test]
async fn chunked_trailers_merge_into_headers() {
  let server = support::serve_once(
    b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\nX-Checksum: abc\r\n\r\n",
  )
  .await;

  let response = engine().fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.body.as_deref(), Some(&b"hello"[..]));
  assert_eq!(response.headers.get("x-checksum").as_deref(), Some("abc"));
}

#[tokio::test]
async fn duplicate_headers_join_in_order() {
  let server = support::serve_once(b"HTTP/1.1 200 OK\r\nX-Multi: a\r\nX-Multi: b\r\nContent-Length: 0\r\n\r\n").await;

  let response = engine().fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.headers.get("x-multi").as_deref(), Some("a,b"));
}

#[tokio::test]
async fn head_request_reads_no_body() {
  let mut server = support::serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n").await;

  let response = engine().fetch(Method::Head, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.status, 200);
  assert_eq!(response.body.as_deref(), Some(&b""[..]));
  let request = server.requests.recv().await.unwrap();
  assert!(request.starts_with("HEAD / HTTP/1.1\r\n"));
}

#[tokio::test]
async fn reason_may_be_missing() {
  let server = support::serve_once(b"HTTP/1.1 204\r\n\r\n").await;

  let response = engine().fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.status, 204);
  assert_eq!(response.reason, "");
  assert_eq!(response.body.as_deref(), Some(&b""[..]));
}

#[tokio::test]
async fn until_close_body_runs_to_eof() {
  let server = support::serve_once(b"HTTP/1.0 200 OK\r\n\r\nraw until close").await;

  let response = engine().fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.status, 200);
  assert_eq!(response.http_version, "1.0");
  assert_eq!(response.body.as_deref(), Some(&b"raw until close"[..]));
}

#[tokio::test]
async fn on_header_abort_is_598_with_orig_status() {
  let server = support::serve_once(
    b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 100\r\n\r\nxxxxxxxxxx",
  )
  .await;
  let e = engine();

  let seen = Arc::new(Mutex::new(Vec::new()));
  let seen_cb = Arc::clone(&seen);
  let response = e
    .fetch(
      Method::Get,
      &server.url("/"),
      RequestOptions::new().on_header(move |head| {
        seen_cb.lock().unwrap().push(head.status);
        false
      }),
    )
    .await;

  assert_eq!(response.status, 598);
  assert_eq!(response.reason, "user abort");
  assert_eq!(response.orig_status, Some(200));
  assert_eq!(response.orig_reason.as_deref(), Some("OK"));
  assert_eq!(response.headers.get("content-type").as_deref(), Some("image/png"));
  assert_eq!(response.body.as_deref(), Some(&b""[..]), "abort delivers an empty body");
  assert_eq!(*seen.lock().unwrap(), vec![200]);
  assert_eq!(e.active(), 0, "aborted connection must be destroyed");
}

#[tokio::test]
async fn on_body_abort_is_598_and_kills_the_connection() {
  let server = support::serve_scripted(
    vec![
      vec![support::ok_response("0123456789")],
      vec![support::ok_response("again")],
    ],
    0,
  )
  .await;
  let e = engine();

  let response = e
    .fetch(
      Method::Get,
      &server.url("/"),
      RequestOptions::new().on_body(|_| false),
    )
    .await;
  assert_eq!(response.status, 598);
  assert_eq!(response.orig_status, Some(200));
  assert_eq!(e.active(), 0);

  // The aborted connection was not parked: a follow-up opens a new one.
  let follow_up = e.fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;
  assert_eq!(follow_up.status, 200);
  assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn on_body_streams_fragments_and_completion_gets_empty_body() {
  let server = support::serve_once(
    b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
  )
  .await;

  let streamed = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&streamed);
  let response = engine()
    .fetch(
      Method::Get,
      &server.url("/"),
      RequestOptions::new().on_body(move |frag| {
        sink.lock().unwrap().extend_from_slice(frag);
        true
      }),
    )
    .await;

  assert_eq!(response.status, 200);
  assert_eq!(response.body.as_deref(), Some(&b""[..]));
  assert_eq!(streamed.lock().unwrap().as_slice(), b"hello world");
}

#[tokio::test]
async fn callbacks_fire_in_order_header_then_body() {
  let server = support::serve_once(&support::ok_response("data")).await;

  let order = Arc::new(Mutex::new(Vec::new()));
  let o1 = Arc::clone(&order);
  let o2 = Arc::clone(&order);
  let response = engine()
    .fetch(
      Method::Get,
      &server.url("/"),
      RequestOptions::new()
        .on_header(move |_| {
          o1.lock().unwrap().push("header");
          true
        })
        .on_body(move |_| {
          o2.lock().unwrap().push("body");
          true
        }),
    )
    .await;

  assert_eq!(response.status, 200);
  let order = order.lock().unwrap();
  assert_eq!(order.first().copied(), Some("header"));
  assert!(order[1..].iter().all(|&s| s == "body"));
}

#[tokio::test]
async fn malformed_status_line_is_596() {
  let server = support::serve_once(b"BANANA 200 OK\r\n\r\n").await;

  let response = engine().fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.status, 596);
  assert!(response.body.is_none());
}

#[tokio::test]
async fn bad_url_is_599() {
  let response = engine().fetch(Method::Get, "not a url", RequestOptions::new()).await;
  assert_eq!(response.status, 599);
  assert!(response.body.is_none());
}

#[tokio::test]
async fn unsupported_scheme_is_599() {
  let response = engine()
    .fetch(Method::Get, "ftp://example.com/file", RequestOptions::new())
    .await;
  assert_eq!(response.status, 599);
}

#[tokio::test]
async fn dns_failure_is_595() {
  let response = engine()
    .fetch(Method::Get, "http://no-such-host.invalid/", RequestOptions::new())
    .await;
  assert_eq!(response.status, 595);
  assert!(response.body.is_none());
}

#[tokio::test]
async fn connect_refused_is_595() {
  // Bind a port and drop the listener so nothing is accepting there.
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);

  let response = engine()
    .fetch(Method::Get, &format!("http://{addr}/"), RequestOptions::new())
    .await;
  assert_eq!(response.status, 595);
}

#[tokio::test]
async fn timeout_waiting_for_status_is_596() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let (mut sock, _) = listener.accept().await.unwrap();
    let _ = support::read_request(&mut sock).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
  });

  let response = engine()
    .fetch(
      Method::Get,
      &format!("http://{addr}/"),
      RequestOptions::new().timeout(Duration::from_millis(200)),
    )
    .await;
  assert_eq!(response.status, 596);
}

#[tokio::test]
async fn timeout_during_body_is_597_with_orig_status() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let (mut sock, _) = listener.accept().await.unwrap();
    let _ = support::read_request(&mut sock).await;
    sock
      .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc")
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
  });

  let response = engine()
    .fetch(
      Method::Get,
      &format!("http://{addr}/"),
      RequestOptions::new().timeout(Duration::from_millis(200)),
    )
    .await;
  assert_eq!(response.status, 597);
  assert_eq!(response.orig_status, Some(200));
}

#[tokio::test]
async fn truncated_length_body_is_597() {
  let server = support::serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").await;

  let response = engine().fetch(Method::Get, &server.url("/"), RequestOptions::new()).await;

  assert_eq!(response.status, 597);
  assert_eq!(response.orig_status, Some(200));
}

#[tokio::test]
async fn dropping_the_handle_cancels_and_suppresses_completion() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let (mut sock, _) = listener.accept().await.unwrap();
    let _ = support::read_request(&mut sock).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
  });

  let e = engine();
  let fired = Arc::new(AtomicBool::new(false));
  let fired_cb = Arc::clone(&fired);
  let handle = e.dispatch(
    Method::Get,
    &format!("http://{addr}/"),
    RequestOptions::new(),
    move |_| fired_cb.store(true, Ordering::SeqCst),
  );
  tokio::time::sleep(Duration::from_millis(100)).await;
  drop(handle);
  tokio::time::sleep(Duration::from_millis(100)).await;

  assert!(!fired.load(Ordering::SeqCst), "completion must never fire");
  assert_eq!(e.active(), 0, "cancellation releases the slot");
}

#[tokio::test]
async fn dispatch_completes_once_when_detached() {
  let server = support::serve_once(&support::ok_response("done")).await;
  let e = engine();

  let (tx, rx) = tokio::sync::oneshot::channel();
  let handle = e.dispatch(Method::Get, &server.url("/"), RequestOptions::new(), move |resp| {
    tx.send(resp.status).ok();
  });
  handle.detach();

  assert_eq!(rx.await.unwrap(), 200);
}

#[tokio::test]
async fn body_handle_hands_over_the_live_stream() {
  let server = support::serve_once(&support::ok_response("hello")).await;
  let e = engine();

  let mut response = e
    .fetch(Method::Get, &server.url("/"), RequestOptions::new().want_body_handle())
    .await;

  assert_eq!(response.status, 200);
  assert!(response.body.is_none(), "engine must not consume the body");
  assert_eq!(e.active(), 1, "slot stays held while the handle lives");

  let mut handle = response.body_handle.take().unwrap();
  let mut collected = Vec::new();
  let mut buf = [0u8; 1024];
  while collected.len() < 5 {
    let n = handle.read(&mut buf).await.unwrap();
    if n == 0 {
      break;
    }
    collected.extend_from_slice(&buf[..n]);
  }
  assert_eq!(collected, b"hello");

  handle.release();
  assert_eq!(e.active(), 0, "release returns the slot");
}
