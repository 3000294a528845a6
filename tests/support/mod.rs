//! Scripted mock servers for the end-to-end suites.

#![allow(dead_code)]

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

/// Read one full HTTP request (head plus `Content-Length` body) off the
/// socket, which may be plain TCP or a server-side TLS stream. `None` when
/// the peer closes first.
pub async fn read_request<S: AsyncRead + Unpin>(sock: &mut S) -> Option<String> {
  let mut buf: Vec<u8> = Vec::new();
  let mut tmp = [0u8; 4096];
  loop {
    if let Some(pos) = find(&buf, b"\r\n\r\n") {
      let head_end = pos + 4;
      let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
      let body_len = content_length(&head);
      while buf.len() < head_end + body_len {
        let n = sock.read(&mut tmp).await.ok()?;
        if n == 0 {
          return None;
        }
        buf.extend_from_slice(&tmp[..n]);
      }
      return Some(String::from_utf8_lossy(&buf[..head_end + body_len]).into_owned());
    }
    let n = sock.read(&mut tmp).await.ok()?;
    if n == 0 {
      return None;
    }
    buf.extend_from_slice(&tmp[..n]);
  }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> usize {
  head
    .lines()
    .find_map(|l| {
      let (name, value) = l.split_once(':')?;
      name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse().ok())?
    })
    .unwrap_or(0)
}

/// A scripted server plus everything the tests want to observe.
pub struct MockServer {
  pub addr: SocketAddr,
  /// Every request the server saw, in arrival order
  pub requests: mpsc::UnboundedReceiver<String>,
  /// Number of TCP connections accepted so far
  pub accepted: Arc<AtomicUsize>,
}

impl MockServer {
  pub fn url(&self, path: &str) -> String {
    format!("http://{}{}", self.addr, path)
  }

  pub fn accepted(&self) -> usize {
    self.accepted.load(Ordering::SeqCst)
  }
}

/// Serve scripted responses: one inner list per accepted connection, one
/// response per request on that connection. After a connection's script is
/// exhausted the socket is closed; after the last scripted connection the
/// listener stops accepting.
///
/// `hold_ms` delays each response, which the pool tests use to force
/// overlap.
pub async fn serve_scripted(scripts: Vec<Vec<Vec<u8>>>, hold_ms: u64) -> MockServer {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let (tx, rx) = mpsc::unbounded_channel();
  let accepted = Arc::new(AtomicUsize::new(0));
  let accepted_inner = Arc::clone(&accepted);

  tokio::spawn(async move {
    for script in scripts {
      let Ok((mut sock, _)) = listener.accept().await else {
        return;
      };
      accepted_inner.fetch_add(1, Ordering::SeqCst);
      let tx = tx.clone();
      tokio::spawn(async move {
        for response in script {
          let Some(request) = read_request(&mut sock).await else {
            return;
          };
          tx.send(request).ok();
          if hold_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(hold_ms)).await;
          }
          if sock.write_all(&response).await.is_err() {
            return;
          }
        }
        // Linger briefly so the client, not the server, drives the close
        // observed by in-flight reads.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      });
    }
  });

  MockServer {
    addr,
    requests: rx,
    accepted,
  }
}

/// One connection, one canned response.
pub async fn serve_once(response: &[u8]) -> MockServer {
  serve_scripted(vec![vec![response.to_vec()]], 0).await
}

pub fn ok_response(body: &str) -> Vec<u8> {
  format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
}

/// Self-signed certificate and key for a TLS test server answering as
/// `host`.
pub fn self_signed(host: &str) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
  let certified = rcgen::generate_simple_self_signed(vec![String::from(host)]).unwrap();
  let cert = certified.cert.der().clone();
  let key = PrivateKeyDer::Pkcs8(certified.key_pair.serialize_der().into());
  (cert, key)
}

/// Acceptor serving the given certificate.
pub fn tls_acceptor(cert: CertificateDer<'static>, key: PrivateKeyDer<'static>) -> TlsAcceptor {
  let config = rustls::ServerConfig::builder()
    .with_no_client_auth()
    .with_single_cert(vec![cert], key)
    .unwrap();
  TlsAcceptor::from(Arc::new(config))
}
