use crate::headers::Headers;
use crate::parser::headers::parse_header_block;
use crate::parser::ParseError;
use bytes::BytesMut;

/// Resumable chunked-transfer decoder.
///
/// Input arrives in whatever pieces the socket delivers; [`advance`]
/// consumes as much as it can, appends decoded bytes to the caller's
/// output, and reports completion once the zero chunk and trailer section
/// have been seen. A partial chunk simply suspends until more input is
/// buffered.
///
/// [`advance`]: ChunkedDecoder::advance
#[derive(Debug)]
pub struct ChunkedDecoder {
  state: DecodeState,
  trailer_text: String,
  trailers: Headers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
  ChunkSize,
  ChunkData(usize),
  ChunkDataCrlf,
  TrailerSection,
  Complete,
}

impl ChunkedDecoder {
  /// Decoder positioned before the first chunk-size line
  #[must_use]
  pub fn new() -> Self {
    Self {
      state: DecodeState::ChunkSize,
      trailer_text: String::new(),
      trailers: Headers::new(),
    }
  }

  /// Trailer fields seen after the zero chunk, parsed with the same
  /// duplicate-joining policy as the header block
  #[must_use]
  pub fn trailers(&self) -> &Headers {
    &self.trailers
  }

  /// Consume as much of `buf` as possible, appending decoded body bytes to
  /// `out`. Returns `true` once the terminating chunk and trailers are
  /// fully consumed; `false` means more input is needed.
  ///
  /// # Errors
  /// Malformed size lines or missing chunk delimiters.
  pub fn advance(&mut self, buf: &mut BytesMut, out: &mut Vec<u8>) -> Result<bool, ParseError> {
    loop {
      match self.state {
        DecodeState::ChunkSize => {
          let Some(line) = take_line(buf) else {
            return Ok(false);
          };
          let size = parse_chunk_size(&line)?;
          self.state = if size == 0 {
            DecodeState::TrailerSection
          } else {
            DecodeState::ChunkData(size)
          };
        },
        DecodeState::ChunkData(remaining) => {
          if buf.is_empty() {
            return Ok(false);
          }
          let n = remaining.min(buf.len());
          out.extend_from_slice(&buf.split_to(n));
          self.state = if n == remaining {
            DecodeState::ChunkDataCrlf
          } else {
            DecodeState::ChunkData(remaining - n)
          };
        },
        DecodeState::ChunkDataCrlf => {
          let Some(line) = take_line(buf) else {
            return Ok(false);
          };
          if !line.is_empty() {
            return Err(ParseError::MissingChunkCrlf);
          }
          self.state = DecodeState::ChunkSize;
        },
        DecodeState::TrailerSection => {
          let Some(line) = take_line(buf) else {
            return Ok(false);
          };
          if line.is_empty() {
            if !self.trailer_text.is_empty() {
              parse_header_block(&self.trailer_text, &mut self.trailers)?;
            }
            self.state = DecodeState::Complete;
          } else {
            self.trailer_text.push_str(&line);
            self.trailer_text.push('\n');
          }
        },
        DecodeState::Complete => return Ok(true),
      }
    }
  }
}

impl Default for ChunkedDecoder {
  fn default() -> Self {
    Self::new()
  }
}

/// Take one line (up to `\n`, `\r` stripped) out of `buf`, or `None` when
/// no full line is buffered yet.
pub(crate) fn take_line(buf: &mut BytesMut) -> Option<String> {
  let nl = buf.iter().position(|&b| b == b'\n')?;
  let line = buf.split_to(nl + 1);
  let mut line = &line[..nl];
  if line.last() == Some(&b'\r') {
    line = &line[..line.len() - 1];
  }
  Some(String::from_utf8_lossy(line).into_owned())
}

/// Hex chunk size with optional `;extension` ignored to end of line.
fn parse_chunk_size(line: &str) -> Result<usize, ParseError> {
  let size_part = line.split(';').next().unwrap_or("").trim_matches([' ', '\t']);
  if size_part.is_empty() {
    return Err(ParseError::InvalidChunkSize);
  }
  let mut size = 0usize;
  for b in size_part.bytes() {
    let digit = match b {
      b'0'..=b'9' => b - b'0',
      b'a'..=b'f' => b - b'a' + 10,
      b'A'..=b'F' => b - b'A' + 10,
      _ => return Err(ParseError::InvalidChunkSize),
    };
    size = size
      .checked_mul(16)
      .and_then(|s| s.checked_add(usize::from(digit)))
      .ok_or(ParseError::InvalidChunkSize)?;
  }
  Ok(size)
}
