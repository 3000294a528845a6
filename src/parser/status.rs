use crate::parser::ParseError;

/// Parsed response status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
  /// Protocol version, e.g. `1.1`
  pub version: String,
  /// Three-digit status code
  pub status: u16,
  /// Reason phrase, possibly empty
  pub reason: String,
}

/// Parse `HTTP/<version> <status> <reason>`.
///
/// The version must match `\d+.\d+`; the reason phrase is optional and may
/// be empty.
///
/// # Errors
/// `ParseError::InvalidStatusLine` on any deviation.
pub fn parse_status_line(line: &str) -> Result<StatusLine, ParseError> {
  let rest = line.strip_prefix("HTTP/").ok_or(ParseError::InvalidStatusLine)?;
  let (version, rest) = rest.split_once(' ').ok_or(ParseError::InvalidStatusLine)?;

  let (major, minor) = version.split_once('.').ok_or(ParseError::InvalidStatusLine)?;
  let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
  if !digits(major) || !digits(minor) {
    return Err(ParseError::InvalidStatusLine);
  }

  let (code, reason) = match rest.split_once(' ') {
    Some((code, reason)) => (code, reason),
    None => (rest, ""),
  };
  if code.len() != 3 || !digits(code) {
    return Err(ParseError::InvalidStatusLine);
  }
  let status: u16 = code.parse().map_err(|_| ParseError::InvalidStatusLine)?;

  Ok(StatusLine {
    version: String::from(version),
    status,
    reason: String::from(reason),
  })
}
