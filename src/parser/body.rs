use crate::headers::Headers;
use crate::method::Method;

/// How the response body is framed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
  /// No body follows the header block
  None,
  /// Chunked transfer coding
  Chunked,
  /// Exactly this many bytes
  Length(u64),
  /// Body runs to connection close
  UntilClose,
}

/// Select the framing mode for a response.
///
/// HEAD requests and 1xx/204/304 statuses never carry a body. Chunked wins
/// when `Transfer-Encoding`'s final coding is `chunked`, even if a
/// `Content-Length` is also present (the length is then meaningless and
/// ignored). A parseable `Content-Length` selects identity framing.
/// Everything else is read until the server closes.
#[must_use]
pub fn body_mode(method: Method, status: u16, headers: &Headers) -> BodyMode {
  if method == Method::Head || (100..200).contains(&status) || status == 204 || status == 304 {
    return BodyMode::None;
  }

  if let Some(te) = headers.get("transfer-encoding")
    && te
      .rsplit(',')
      .next()
      .is_some_and(|last| last.trim_matches([' ', '\t']).eq_ignore_ascii_case("chunked"))
  {
    return BodyMode::Chunked;
  }

  if let Some(len) = headers.get("content-length")
    && let Ok(len) = len.trim().parse::<u64>()
  {
    return BodyMode::Length(len);
  }

  BodyMode::UntilClose
}
