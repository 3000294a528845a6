//! Connection registry: idle reuse and per-host admission.
//!
//! A connection is identified by (scheme, host, port, session, proxy); two
//! connections with equal identity are interchangeable. Per host, at most
//! `max_per_host` connections exist at once, counting both idle and in-use
//! links. Requests over the cap wait in strict FIFO order and are granted a
//! slot directly when one frees up, so a release can never race a new
//! arrival past the queue.

use crate::parser::uri::Scheme;
use crate::transport::connection::{Connection, Phase};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Pool identity. Two connections are interchangeable iff all five parts
/// match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnKey {
  /// http or https
  pub scheme: Scheme,
  /// Lowercased target host
  pub host: String,
  /// Target port
  pub port: u16,
  /// Caller-supplied pool partition tag
  pub session: String,
  /// `host:port` of the proxy in use, if any
  pub proxy: Option<String>,
}

/// What a released slot hands to the next FIFO waiter.
enum Slot {
  /// A parked connection with matching identity, ready for reuse
  Idle(Connection),
  /// Permission to open a fresh connection
  Fresh,
}

struct Waiter {
  key: ConnKey,
  tx: oneshot::Sender<Slot>,
}

struct IdleEntry {
  conn: Connection,
  serial: u64,
  reaper: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct PoolInner {
  /// MRU at the back of each list
  idle: HashMap<ConnKey, Vec<IdleEntry>>,
  /// Idle and in-use connections per host
  per_host: HashMap<String, usize>,
  waiters: HashMap<String, VecDeque<Waiter>>,
  serial: u64,
}

/// Process-wide connection registry shared by every request of an engine
#[derive(Clone)]
pub struct Registry {
  inner: Arc<Mutex<PoolInner>>,
  active: Arc<AtomicUsize>,
  max_per_host: usize,
  persistent_timeout: Duration,
}

impl Registry {
  pub(crate) fn new(max_per_host: usize, persistent_timeout: Duration) -> Self {
    Self {
      inner: Arc::new(Mutex::new(PoolInner::default())),
      active: Arc::new(AtomicUsize::new(0)),
      max_per_host: max_per_host.max(1),
      persistent_timeout,
    }
  }

  /// Connections currently attached to requests (idle ones excluded)
  pub(crate) fn active(&self) -> usize {
    self.active.load(Ordering::SeqCst)
  }

  #[cfg(test)]
  pub(crate) fn idle_count(&self, key: &ConnKey) -> usize {
    let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    inner.idle.get(key).map_or(0, Vec::len)
  }

  /// Admit a request for `key`: reuse the MRU idle connection, open a slot
  /// for a fresh one, or queue behind the host cap until a slot is handed
  /// over. Cancellation-safe: an abandoned waiter is skipped when its
  /// grant arrives.
  pub(crate) async fn lease(&self, key: &ConnKey) -> Lease {
    loop {
      let wait = {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(list) = inner.idle.get_mut(key)
          && let Some(entry) = list.pop()
        {
          if list.is_empty() {
            inner.idle.remove(key);
          }
          entry.reaper.abort();
          self.active.fetch_add(1, Ordering::SeqCst);
          trace!(host = %key.host, "reusing idle connection");
          return Lease::attached(self.clone(), key.clone(), entry.conn, true);
        }
        let count = inner.per_host.entry(key.host.clone()).or_insert(0);
        if *count < self.max_per_host {
          *count += 1;
          self.active.fetch_add(1, Ordering::SeqCst);
          return Lease::fresh(self.clone(), key.clone());
        }
        let (tx, rx) = oneshot::channel();
        inner
          .waiters
          .entry(key.host.clone())
          .or_default()
          .push_back(Waiter { key: key.clone(), tx });
        trace!(host = %key.host, "host cap reached, queueing");
        rx
      };
      match wait.await {
        Ok(Slot::Idle(conn)) => {
          self.active.fetch_add(1, Ordering::SeqCst);
          return Lease::attached(self.clone(), key.clone(), conn, true);
        },
        Ok(Slot::Fresh) => {
          self.active.fetch_add(1, Ordering::SeqCst);
          return Lease::fresh(self.clone(), key.clone());
        },
        // Registry dropped mid-wait (engine shutdown); fall through and
        // re-run admission against whatever is left.
        Err(_) => {},
      }
    }
  }

  /// Park a clean connection for `key`. Hands it straight to the head
  /// waiter when identities match; otherwise it idles with a reaper
  /// scheduled at the persistent timeout.
  fn park(&self, key: &ConnKey, mut conn: Connection) {
    let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    self.active.fetch_sub(1, Ordering::SeqCst);
    conn.set_phase(Phase::Idle);

    if let Some(queue) = inner.waiters.get_mut(&key.host)
      && queue.front().is_some_and(|w| w.key == *key)
      && let Some(waiter) = queue.pop_front()
    {
      if queue.is_empty() {
        inner.waiters.remove(&key.host);
      }
      match waiter.tx.send(Slot::Idle(conn)) {
        Ok(()) => {
          trace!(host = %key.host, "idle connection handed to waiter");
          return;
        },
        // Waiter cancelled in the meantime; fall through and park.
        Err(Slot::Idle(given_back)) => conn = given_back,
        Err(Slot::Fresh) => return,
      }
    }

    inner.serial += 1;
    let serial = inner.serial;
    let reaper = tokio::spawn(expire_idle(self.clone(), key.clone(), serial, self.persistent_timeout));
    inner
      .idle
      .entry(key.clone())
      .or_default()
      .push(IdleEntry { conn, serial, reaper });
    trace!(host = %key.host, "connection parked idle");
  }

  /// Drop a connection (or an unused slot) for `key`, waking the head
  /// waiter with a fresh-slot grant when one is queued.
  fn destroy(&self, key: &ConnKey, conn: Option<Connection>) {
    drop(conn);
    let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    self.active.fetch_sub(1, Ordering::SeqCst);
    Self::release_slot_locked(&mut inner, &key.host);
  }

  /// Hand the freed slot to the next live waiter, or decrement the host
  /// count when nobody is queued. Caller holds the lock.
  fn release_slot_locked(inner: &mut PoolInner, host: &str) {
    if let Some(queue) = inner.waiters.get_mut(host) {
      while let Some(waiter) = queue.pop_front() {
        if waiter.tx.send(Slot::Fresh).is_ok() {
          if queue.is_empty() {
            inner.waiters.remove(host);
          }
          trace!(host, "slot handed to waiter");
          return;
        }
      }
      inner.waiters.remove(host);
    }
    if let Some(count) = inner.per_host.get_mut(host) {
      *count = count.saturating_sub(1);
      if *count == 0 {
        inner.per_host.remove(host);
      }
    }
  }
}

/// Idle expiry task: closes the parked connection once the persistent
/// timeout elapses. Aborted when the entry is taken for reuse; removal is
/// idempotent either way.
async fn expire_idle(registry: Registry, key: ConnKey, serial: u64, after: Duration) {
  tokio::time::sleep(after).await;
  let mut inner = registry
    .inner
    .lock()
    .unwrap_or_else(std::sync::PoisonError::into_inner);
  let Some(list) = inner.idle.get_mut(&key) else {
    return;
  };
  let Some(pos) = list.iter().position(|e| e.serial == serial) else {
    return;
  };
  let entry = list.remove(pos);
  if list.is_empty() {
    inner.idle.remove(&key);
  }
  drop(entry.conn);
  debug!(host = %key.host, "idle connection expired");
  Registry::release_slot_locked(&mut inner, &key.host);
}

/// A held admission slot, RAII-style.
///
/// Exactly one of [`park`](Lease::park) or [`destroy`](Lease::destroy)
/// ends the lease; dropping it mid-flight (cancellation) parks a reused
/// connection that never saw a request byte and destroys anything else.
pub struct Lease {
  registry: Registry,
  key: ConnKey,
  conn: Option<Connection>,
  reused: bool,
  wrote: bool,
  done: bool,
}

impl Lease {
  fn attached(registry: Registry, key: ConnKey, conn: Connection, reused: bool) -> Self {
    Self {
      registry,
      key,
      conn: Some(conn),
      reused,
      wrote: false,
      done: false,
    }
  }

  fn fresh(registry: Registry, key: ConnKey) -> Self {
    Self {
      registry,
      key,
      conn: None,
      reused: false,
      wrote: false,
      done: false,
    }
  }

  /// True when this lease started from an idle pool hit
  pub(crate) fn is_reused(&self) -> bool {
    self.reused
  }

  pub(crate) fn attach(&mut self, conn: Connection) {
    self.conn = Some(conn);
  }

  pub(crate) fn conn(&mut self) -> Option<&mut Connection> {
    self.conn.as_mut()
  }

  /// Record that request bytes hit the wire; from here on cancellation
  /// must destroy rather than park.
  pub(crate) fn mark_wrote(&mut self) {
    self.wrote = true;
  }

  /// Return the connection to the idle pool.
  pub(crate) fn park(mut self) {
    self.done = true;
    if let Some(conn) = self.conn.take() {
      if conn.is_dirty() {
        self.registry.destroy(&self.key, Some(conn));
      } else {
        self.registry.park(&self.key, conn);
      }
    } else {
      self.registry.destroy(&self.key, None);
    }
  }

  /// Close the connection (if any) and free the slot.
  pub(crate) fn destroy(mut self) {
    self.done = true;
    let conn = self.conn.take();
    self.registry.destroy(&self.key, conn);
  }

  /// Detach for the body-handle hand-off: the caller takes the connection
  /// and the slot stays occupied until the returned lease is dropped.
  pub(crate) fn into_handle_parts(mut self) -> Option<(Connection, Self)> {
    let conn = self.conn.take()?;
    self.wrote = true;
    Some((conn, self))
  }
}

impl Drop for Lease {
  fn drop(&mut self) {
    if self.done {
      return;
    }
    self.done = true;
    match self.conn.take() {
      Some(conn) if !self.wrote && !conn.is_dirty() => {
        // Cancelled before any request byte went out; the connection is
        // still clean and may serve someone else.
        self.registry.park(&self.key, conn);
      },
      conn => self.registry.destroy(&self.key, conn),
    }
  }
}

impl std::fmt::Debug for Lease {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Lease")
      .field("key", &self.key)
      .field("reused", &self.reused)
      .field("attached", &self.conn.is_some())
      .finish()
  }
}
