//! Forward-only input handed to extractors.
//!
//! Reads consume bytes and advance [`position`](ExtractorInput::position).
//! Peeks advance a separate cursor that starts at the read position and can
//! be reset to it, so an extractor can look ahead without consuming.

use bytes::Bytes;
use td_core::{Error, Result};

/// Byte input positioned somewhere inside a stream of known or unknown length.
pub trait ExtractorInput {
    /// Read up to `buf.len()` bytes. Returns 0 at end of input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Skip `len` bytes.
    fn skip_fully(&mut self, len: u64) -> Result<()>;

    /// Copy up to `buf.len()` bytes from the peek cursor and advance it.
    /// Returns fewer bytes only at end of input.
    fn peek(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the peek cursor back to the read position.
    fn reset_peek_position(&mut self);

    /// Absolute offset of the next byte to be read.
    fn position(&self) -> u64;

    /// Absolute offset of the next byte to be peeked.
    fn peek_position(&self) -> u64;

    /// Total stream length, if known.
    fn length(&self) -> Option<u64>;

    /// Fill `buf` completely. Returns `Ok(false)` if the input ended before
    /// the first byte, and an error if it ended part way.
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(false);
                }
                return Err(Error::Io {
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("input ended after {filled} of {} bytes", buf.len()),
                    ),
                });
            }
            filled += n;
        }
        Ok(true)
    }
}

/// In-memory input over a slice of a stream that starts at `start_position`.
#[derive(Debug, Clone)]
pub struct BytesInput {
    data: Bytes,
    start_position: u64,
    read_offset: usize,
    peek_offset: usize,
    length: Option<u64>,
}

impl BytesInput {
    /// Input over `data`, which holds the stream bytes from `start_position`
    /// onward. `length` is the full stream length when known.
    pub fn new(data: Bytes, start_position: u64, length: Option<u64>) -> Self {
        Self {
            data,
            start_position,
            read_offset: 0,
            peek_offset: 0,
            length,
        }
    }

    /// Input over a complete stream.
    pub fn from_stream(data: Bytes) -> Self {
        let length = data.len() as u64;
        Self::new(data, 0, Some(length))
    }

    fn remaining_from(&self, offset: usize) -> &[u8] {
        &self.data[offset.min(self.data.len())..]
    }
}

impl ExtractorInput for BytesInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = self.remaining_from(self.read_offset);
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_offset += n;
        self.peek_offset = self.read_offset;
        Ok(n)
    }

    fn skip_fully(&mut self, len: u64) -> Result<()> {
        let available = (self.data.len() - self.read_offset) as u64;
        if len > available {
            return Err(Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("cannot skip {len} bytes, {available} available"),
                ),
            });
        }
        self.read_offset += len as usize;
        self.peek_offset = self.read_offset;
        Ok(())
    }

    fn peek(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = self.remaining_from(self.peek_offset);
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.peek_offset += n;
        Ok(n)
    }

    fn reset_peek_position(&mut self) {
        self.peek_offset = self.read_offset;
    }

    fn position(&self) -> u64 {
        self.start_position + self.read_offset as u64
    }

    fn peek_position(&self) -> u64 {
        self.start_position + self.peek_offset as u64
    }

    fn length(&self) -> Option<u64> {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_consume() {
        let mut input = BytesInput::new(Bytes::from_static(b"abcdef"), 100, Some(106));
        let mut buf = [0u8; 3];
        assert_eq!(input.peek(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(input.peek_position(), 103);
        assert_eq!(input.position(), 100);

        input.reset_peek_position();
        assert!(input.read_fully(&mut buf).unwrap());
        assert_eq!(&buf, b"abc");
        assert_eq!(input.position(), 103);
    }

    #[test]
    fn short_peek_at_end() {
        let mut input = BytesInput::from_stream(Bytes::from_static(b"xy"));
        let mut buf = [0u8; 8];
        assert_eq!(input.peek(&mut buf).unwrap(), 2);
    }

    #[test]
    fn read_fully_reports_clean_and_partial_end() {
        let mut input = BytesInput::from_stream(Bytes::from_static(b"abc"));
        let mut buf = [0u8; 2];
        assert!(input.read_fully(&mut buf).unwrap());
        assert!(input.read_fully(&mut buf).is_err());

        let mut empty = BytesInput::from_stream(Bytes::new());
        assert!(!empty.read_fully(&mut buf).unwrap());
    }

    #[test]
    fn skip_past_end_is_error() {
        let mut input = BytesInput::from_stream(Bytes::from_static(b"abc"));
        input.skip_fully(2).unwrap();
        assert_eq!(input.position(), 2);
        assert!(input.skip_fully(5).is_err());
    }
}
