/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  /// GET method - retrieve resource
  Get,
  /// POST method - submit data
  Post,
  /// PUT method - replace resource
  Put,
  /// DELETE method - remove resource
  Delete,
  /// HEAD method - retrieve headers only
  Head,
  /// OPTIONS method - query supported methods
  Options,
  /// PATCH method - partial modification
  Patch,
  /// TRACE method - diagnostic loopback
  Trace,
}

impl Method {
  /// Returns the method as its uppercase wire token
  #[must_use]
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Delete => "DELETE",
      Self::Head => "HEAD",
      Self::Options => "OPTIONS",
      Self::Patch => "PATCH",
      Self::Trace => "TRACE",
    }
  }

  /// Idempotent methods are eligible for the one-shot reuse retry and keep
  /// their method across 301/302 redirects.
  #[must_use]
  pub const fn is_idempotent(self) -> bool {
    matches!(
      self,
      Self::Get | Self::Head | Self::Options | Self::Delete | Self::Put | Self::Trace
    )
  }

  /// `Content-Length` is emitted for these even when the body is empty
  #[must_use]
  pub const fn implies_length(self) -> bool {
    matches!(self, Self::Post | Self::Put | Self::Patch)
  }
}

impl core::fmt::Display for Method {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_str(self.as_str())
  }
}
