//! Netscape-style cookie jar.
//!
//! The jar is a `host -> path -> name -> cookie` map guarded by a
//! `version` field. Matching is deliberately loose (suffix domains,
//! prefix paths); full RFC 6265 compliance is out of scope. The shape
//! serializes through serde so callers can persist it with whatever
//! format they like; expiry times live in `_expires` as POSIX seconds and
//! session cookies simply omit the field.

use crate::httpdate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Jar format version this engine writes and understands
const JAR_VERSION: u32 = 1;

/// One stored cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
  /// Cookie value, verbatim
  pub value: String,
  /// Absolute expiry in POSIX seconds; absent for session cookies
  #[serde(rename = "_expires", default, skip_serializing_if = "Option::is_none")]
  pub expires: Option<i64>,
  /// Only sent over https
  #[serde(default, skip_serializing_if = "core::ops::Not::not")]
  pub secure: bool,
  /// Marked HttpOnly by the server (stored, not enforced)
  #[serde(default, skip_serializing_if = "core::ops::Not::not")]
  pub httponly: bool,
}

/// Cookie storage shared between requests that name the same jar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieJar {
  version: u32,
  #[serde(default)]
  hosts: BTreeMap<String, BTreeMap<String, BTreeMap<String, Cookie>>>,
}

impl CookieJar {
  /// Empty jar at the current format version
  #[must_use]
  pub fn new() -> Self {
    Self {
      version: JAR_VERSION,
      hosts: BTreeMap::new(),
    }
  }

  /// A jar deserialized with any other version is emptied on first use.
  fn check_version(&mut self) {
    if self.version != JAR_VERSION {
      self.hosts.clear();
      self.version = JAR_VERSION;
    }
  }

  /// Apply one `Set-Cookie` line received for a request to
  /// `request_host`/`request_path`.
  ///
  /// An explicit `domain` attribute must be a suffix of the request host
  /// (leading dot tolerated) or the cookie is ignored. `max-age` wins over
  /// `expires`; neither makes a session cookie. A value that is already
  /// expired removes any stored entry instead of storing.
  pub fn set_cookie(&mut self, request_host: &str, request_path: &str, line: &str, now: i64) {
    self.check_version();

    let (pair, attrs) = match line.split_once(';') {
      Some((pair, attrs)) => (pair, attrs),
      None => (line, ""),
    };
    let Some((name, value)) = pair.split_once('=') else {
      return;
    };
    let name = name.trim_matches([' ', '\t']);
    let value = value.trim_matches([' ', '\t']);
    if name.is_empty() {
      return;
    }

    let mut domain: Option<String> = None;
    let mut path: Option<String> = None;
    let mut max_age: Option<i64> = None;
    let mut expires_at: Option<i64> = None;
    let mut secure = false;
    let mut httponly = false;

    for attr in attrs.split(';') {
      let (key, val) = match attr.split_once('=') {
        Some((k, v)) => (k.trim_matches([' ', '\t']), v.trim_matches([' ', '\t'])),
        None => (attr.trim_matches([' ', '\t']), ""),
      };
      if key.eq_ignore_ascii_case("domain") {
        domain = Some(val.trim_start_matches('.').to_ascii_lowercase());
      } else if key.eq_ignore_ascii_case("path") {
        path = Some(String::from(val));
      } else if key.eq_ignore_ascii_case("max-age") {
        max_age = val.parse().ok();
      } else if key.eq_ignore_ascii_case("expires") {
        expires_at = httpdate::parse(val);
      } else if key.eq_ignore_ascii_case("secure") {
        secure = true;
      } else if key.eq_ignore_ascii_case("httponly") {
        httponly = true;
      }
    }

    let domain = match domain {
      Some(d) => {
        if !domain_matches(request_host, &d) {
          return;
        }
        d
      },
      None => request_host.to_ascii_lowercase(),
    };
    let path = path.unwrap_or_else(|| default_path(request_path));
    let expires = max_age.map(|age| now.saturating_add(age)).or(expires_at);

    if let Some(t) = expires
      && t <= now
    {
      // The server is deleting the cookie.
      if let Some(paths) = self.hosts.get_mut(&domain) {
        if let Some(names) = paths.get_mut(&path) {
          names.remove(name);
          if names.is_empty() {
            paths.remove(&path);
          }
        }
        if paths.is_empty() {
          self.hosts.remove(&domain);
        }
      }
      return;
    }

    self
      .hosts
      .entry(domain)
      .or_default()
      .entry(path)
      .or_default()
      .insert(
        String::from(name),
        Cookie {
          value: String::from(value),
          expires,
          secure,
          httponly,
        },
      );
  }

  /// Build the `Cookie` header value for an outbound request, or `None`
  /// when nothing matches.
  ///
  /// A cookie matches when its domain is a suffix of the request host, its
  /// path is a `/`-segment prefix of the request path, `secure` implies an
  /// https request, and it has not expired.
  #[must_use]
  pub fn cookie_header(&mut self, host: &str, path: &str, https: bool, now: i64) -> Option<String> {
    self.check_version();

    let mut pairs: Vec<(usize, String)> = Vec::new();
    for (domain, paths) in &self.hosts {
      if !domain_matches(host, domain) {
        continue;
      }
      for (cpath, names) in paths {
        if !path_matches(path, cpath) {
          continue;
        }
        for (name, cookie) in names {
          if cookie.secure && !https {
            continue;
          }
          if let Some(t) = cookie.expires
            && t <= now
          {
            continue;
          }
          pairs.push((cpath.len(), format!("{name}={}", cookie.value)));
        }
      }
    }
    if pairs.is_empty() {
      return None;
    }
    // Longest path first, the conventional ordering.
    pairs.sort_by(|a, b| b.0.cmp(&a.0));
    Some(
      pairs
        .into_iter()
        .map(|(_, pair)| pair)
        .collect::<Vec<_>>()
        .join("; "),
    )
  }

  /// Drop expired cookies; with `drop_session` also drop cookies that have
  /// no expiry at all.
  pub fn expire(&mut self, drop_session: bool, now: i64) {
    self.check_version();
    for paths in self.hosts.values_mut() {
      for names in paths.values_mut() {
        names.retain(|_, c| match c.expires {
          Some(t) => t > now,
          None => !drop_session,
        });
      }
      paths.retain(|_, names| !names.is_empty());
    }
    self.hosts.retain(|_, paths| !paths.is_empty());
  }

  /// Remove every cookie
  pub fn clear(&mut self) {
    self.hosts.clear();
    self.version = JAR_VERSION;
  }

  /// Number of stored cookies
  #[must_use]
  pub fn len(&self) -> usize {
    self.hosts.values().flat_map(|p| p.values()).map(BTreeMap::len).sum()
  }

  /// True when the jar holds nothing
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for CookieJar {
  fn default() -> Self {
    Self::new()
  }
}

/// Suffix relation with leading-dot tolerance: `www.example.com` matches
/// the stored domain `example.com` (or `.example.com`).
fn domain_matches(request_host: &str, domain: &str) -> bool {
  let domain = domain.trim_start_matches('.');
  request_host == domain || request_host.ends_with(domain) && request_host.as_bytes()[request_host.len() - domain.len() - 1] == b'.'
}

/// Prefix relation on `/`-segmented paths: `/a` matches `/a` and `/a/b`
/// but not `/ab`.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
  if !request_path.starts_with(cookie_path) {
    return false;
  }
  request_path.len() == cookie_path.len()
    || cookie_path.ends_with('/')
    || request_path.as_bytes()[cookie_path.len()] == b'/'
}

/// Request path up to and including the last `/`.
fn default_path(request_path: &str) -> String {
  match request_path.rfind('/') {
    Some(idx) => String::from(&request_path[..=idx]),
    None => String::from("/"),
  }
}

#[cfg(test)]
mod tests {
  use super::CookieJar;

  #[test]
  fn stores_and_matches_basic_cookie() {
    let mut jar = CookieJar::new();
    jar.set_cookie("example.com", "/", "sid=abc123", 1000);
    assert_eq!(
      jar.cookie_header("example.com", "/", false, 1000).as_deref(),
      Some("sid=abc123")
    );
  }

  #[test]
  fn domain_suffix_match_with_leading_dot() {
    let mut jar = CookieJar::new();
    jar.set_cookie("www.example.com", "/", "a=1; Domain=.example.com", 0);
    assert!(jar.cookie_header("www.example.com", "/", false, 0).is_some());
    assert!(jar.cookie_header("example.com", "/", false, 0).is_some());
    assert!(jar.cookie_header("other.com", "/", false, 0).is_none());
    // No partial-label matches.
    assert!(jar.cookie_header("notexample.com", "/", false, 0).is_none());
  }

  #[test]
  fn foreign_domain_attribute_is_rejected() {
    let mut jar = CookieJar::new();
    jar.set_cookie("example.com", "/", "a=1; Domain=evil.com", 0);
    assert!(jar.is_empty());
  }

  #[test]
  fn path_prefix_is_segment_aware() {
    let mut jar = CookieJar::new();
    jar.set_cookie("h", "/", "a=1; Path=/docs", 0);
    assert!(jar.cookie_header("h", "/docs", false, 0).is_some());
    assert!(jar.cookie_header("h", "/docs/x", false, 0).is_some());
    assert!(jar.cookie_header("h", "/docsx", false, 0).is_none());
    assert!(jar.cookie_header("h", "/", false, 0).is_none());
  }

  #[test]
  fn default_path_is_request_dir() {
    let mut jar = CookieJar::new();
    jar.set_cookie("h", "/a/b/page", "a=1", 0);
    assert!(jar.cookie_header("h", "/a/b/other", false, 0).is_some());
    assert!(jar.cookie_header("h", "/a", false, 0).is_none());
  }

  #[test]
  fn secure_requires_https() {
    let mut jar = CookieJar::new();
    jar.set_cookie("h", "/", "a=1; Secure", 0);
    assert!(jar.cookie_header("h", "/", false, 0).is_none());
    assert!(jar.cookie_header("h", "/", true, 0).is_some());
  }

  #[test]
  fn max_age_wins_over_expires() {
    let mut jar = CookieJar::new();
    jar.set_cookie(
      "h",
      "/",
      "a=1; Max-Age=60; Expires=Sun, 06 Nov 1994 08:49:37 GMT",
      1000,
    );
    assert!(jar.cookie_header("h", "/", false, 1050).is_some());
    assert!(jar.cookie_header("h", "/", false, 1061).is_none());
  }

  #[test]
  fn expired_set_cookie_deletes_entry() {
    let mut jar = CookieJar::new();
    jar.set_cookie("h", "/", "a=1", 0);
    assert_eq!(jar.len(), 1);
    jar.set_cookie("h", "/", "a=gone; Max-Age=0", 10);
    assert!(jar.is_empty());
  }

  #[test]
  fn reset_replaces_same_key() {
    let mut jar = CookieJar::new();
    jar.set_cookie("h", "/", "a=old", 0);
    jar.set_cookie("h", "/", "a=new", 0);
    assert_eq!(jar.cookie_header("h", "/", false, 0).as_deref(), Some("a=new"));
  }

  #[test]
  fn multiple_cookies_join_with_semicolon() {
    let mut jar = CookieJar::new();
    jar.set_cookie("h", "/", "a=1", 0);
    jar.set_cookie("h", "/", "b=2; Path=/deep", 0);
    let header = jar.cookie_header("h", "/deep/x", false, 0).unwrap();
    // Longer path sorts first.
    assert_eq!(header, "b=2; a=1");
  }

  #[test]
  fn expire_drops_expired_and_optionally_session() {
    let mut jar = CookieJar::new();
    jar.set_cookie("h", "/", "session=1", 0);
    jar.set_cookie("h", "/", "timed=1; Max-Age=100", 0);
    jar.expire(false, 50);
    assert_eq!(jar.len(), 2);
    jar.expire(false, 150);
    assert_eq!(jar.len(), 1);
    jar.expire(true, 150);
    assert!(jar.is_empty());
  }

  #[test]
  fn wrong_version_empties_on_first_use() {
    let mut jar: CookieJar = serde_json::from_str(
      r#"{"version":2,"hosts":{"h":{"/":{"a":{"value":"1"}}}}}"#,
    )
    .unwrap();
    assert!(jar.cookie_header("h", "/", false, 0).is_none());
    assert!(jar.is_empty());
  }

  #[test]
  fn serialized_shape_is_stable() {
    let mut jar = CookieJar::new();
    jar.set_cookie("example.com", "/", "sid=abc; Max-Age=100; Secure", 0);
    let json = serde_json::to_value(&jar).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["hosts"]["example.com"]["/"]["sid"]["value"], "abc");
    assert_eq!(json["hosts"]["example.com"]["/"]["sid"]["_expires"], 100);
    assert_eq!(json["hosts"]["example.com"]["/"]["sid"]["secure"], true);
    // Session cookies omit _expires entirely.
    let mut jar = CookieJar::new();
    jar.set_cookie("example.com", "/", "sid=abc", 0);
    let json = serde_json::to_value(&jar).unwrap();
    assert!(json["hosts"]["example.com"]["/"]["sid"].get("_expires").is_none());
  }
}
