use crate::error::Error;
use url::Url;

/// URL scheme accepted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
  /// Plain-text HTTP
  Http,
  /// HTTP over TLS
  Https,
}

impl Scheme {
  /// Port implied when the URL carries none
  #[must_use]
  pub const fn default_port(self) -> u16 {
    match self {
      Self::Http => 80,
      Self::Https => 443,
    }
  }

  /// Scheme name as it appears in a URL
  #[must_use]
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Http => "http",
      Self::Https => "https",
    }
  }
}

/// The pieces of an absolute http(s) URL the engine works with.
///
/// The host is lowercased here once; the connection registry keys on it and
/// the `Host` header is built from it.
#[derive(Debug, Clone)]
pub struct Target {
  /// http or https
  pub scheme: Scheme,
  /// `user:pass` portion, when present
  pub userinfo: Option<String>,
  /// Hostname, lowercased, verbatim otherwise (no IDN mapping)
  pub host: String,
  /// Explicit port or the scheme default
  pub port: u16,
  /// Path plus query, never empty (`/` minimum)
  pub path_and_query: String,
  url: Url,
}

impl Target {
  /// Split an absolute URL.
  ///
  /// # Errors
  /// `Error::BadUrl` when the URL does not parse or lacks a host,
  /// `Error::UnsupportedScheme` for anything but http/https.
  pub fn split(raw: &str) -> Result<Self, Error> {
    let url = Url::parse(raw).map_err(|e| Error::BadUrl(e.to_string()))?;
    let scheme = match url.scheme() {
      "http" => Scheme::Http,
      "https" => Scheme::Https,
      _ => return Err(Error::UnsupportedScheme),
    };
    let host = url
      .host_str()
      .ok_or_else(|| Error::BadUrl(String::from("missing host")))?
      .to_ascii_lowercase();
    let port = url.port().unwrap_or(scheme.default_port());

    let userinfo = if url.username().is_empty() && url.password().is_none() {
      None
    } else {
      let mut info = String::from(url.username());
      if let Some(pass) = url.password() {
        info.push(':');
        info.push_str(pass);
      }
      Some(info)
    };

    let mut path_and_query = String::from(url.path());
    if path_and_query.is_empty() {
      path_and_query.push('/');
    }
    if let Some(q) = url.query() {
      path_and_query.push('?');
      path_and_query.push_str(q);
    }

    Ok(Self {
      scheme,
      userinfo,
      host,
      port,
      path_and_query,
      url,
    })
  }

  /// `host` or `host:port` when the port is non-default, suitable for the
  /// `Host` header and the CONNECT request line
  #[must_use]
  pub fn authority(&self) -> String {
    let host = if self.host.contains(':') && !self.host.starts_with('[') {
      format!("[{}]", self.host)
    } else {
      self.host.clone()
    };
    if self.port == self.scheme.default_port() {
      host
    } else {
      format!("{host}:{}", self.port)
    }
  }

  /// The normalized absolute form of this URL
  #[must_use]
  pub fn absolute(&self) -> String {
    String::from(self.url.as_str())
  }

  /// Resolve a `Location` header value against this URL.
  ///
  /// # Errors
  /// `Error::BadRedirect` when the target cannot be resolved.
  pub fn resolve(&self, location: &str) -> Result<String, Error> {
    self
      .url
      .join(location)
      .map(|u| String::from(u.as_str()))
      .map_err(|e| Error::BadRedirect(format!("{location}: {e}")))
  }

  /// Path portion only, used for cookie path matching
  #[must_use]
  pub fn path(&self) -> &str {
    self.url.path()
  }
}
