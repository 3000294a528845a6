//! Incremental wire-format codecs: status line, header block, chunked
//! framing, and URL splitting. Everything here is pure; sockets live in
//! [`crate::transport`].

pub mod body;
pub mod chunked;
pub mod headers;
pub mod status;
pub mod uri;

#[cfg(test)]
mod tests;

/// Errors raised while decoding response framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
  /// Status line did not match `HTTP/<major>.<minor> <3-digit> [reason]`
  #[error("invalid status line")]
  InvalidStatusLine,
  /// Header field name empty or containing non-token bytes
  #[error("invalid header name")]
  InvalidHeaderName,
  /// Continuation line arrived before any header field
  #[error("continuation without a preceding field")]
  OrphanContinuation,
  /// Chunk size line empty, non-hex, or overflowing
  #[error("invalid chunk size")]
  InvalidChunkSize,
  /// Chunk data was not followed by CRLF
  #[error("missing chunk delimiter")]
  MissingChunkCrlf,
}
