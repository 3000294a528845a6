use crate::headers::Headers;
use crate::parser::ParseError;

/// Parse a header block (status line excluded, terminating blank line
/// optional) into `headers`.
///
/// Handles obs-fold: a line starting with space or tab continues the prior
/// field value, joined by a single space. Field names are validated as
/// tokens and lowercased by [`Headers::insert`]; duplicate names keep their
/// individual entries and join with `,` on single-value reads. Trailer
/// blocks after a chunked body go through the same routine.
///
/// # Errors
/// `ParseError::InvalidHeaderName` for empty/non-token names,
/// `ParseError::OrphanContinuation` for a fold with no preceding field.
pub fn parse_header_block(block: &str, headers: &mut Headers) -> Result<(), ParseError> {
  let mut pending: Option<(String, String)> = None;

  for line in block.split('\n') {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
      continue;
    }

    if line.starts_with(' ') || line.starts_with('\t') {
      let Some((_, value)) = pending.as_mut() else {
        return Err(ParseError::OrphanContinuation);
      };
      value.push(' ');
      value.push_str(line.trim_matches([' ', '\t']));
      continue;
    }

    if let Some((name, value)) = pending.take() {
      headers.insert(name, value);
    }

    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeaderName)?;
    if name.is_empty() || !name.bytes().all(is_token_byte) {
      return Err(ParseError::InvalidHeaderName);
    }
    pending = Some((String::from(name), String::from(value.trim_matches([' ', '\t']))));
  }

  if let Some((name, value)) = pending {
    headers.insert(name, value);
  }
  Ok(())
}

const fn is_token_byte(b: u8) -> bool {
  matches!(b,
    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
    b'0'..=b'9' | b'A'..=b'Z' | b'^' | b'_' | b'`' | b'a'..=b'z' | b'|' | b'~'
  )
}
