//! Byte sources that loaders open at a position.

use bytes::Bytes;
use td_core::{Error, Result};
use td_seek::{BytesInput, ExtractorInput};

/// Something a loader can open as an [`ExtractorInput`].
pub trait DataSource: Send + Sync {
    /// Name used in logs and load errors.
    fn name(&self) -> &str;

    /// Open an input whose first byte is at absolute `position`.
    ///
    /// Failures are reported as [`Error::Load`] or [`Error::Io`] and may be
    /// retried by the caller.
    fn open(&self, position: u64) -> Result<Box<dyn ExtractorInput + Send>>;
}

/// A data source over bytes already in memory.
#[derive(Debug, Clone)]
pub struct BytesDataSource {
    name: String,
    data: Bytes,
}

impl BytesDataSource {
    pub fn new(name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl DataSource for BytesDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, position: u64) -> Result<Box<dyn ExtractorInput + Send>> {
        if position > self.len() {
            return Err(Error::load(
                &self.name,
                format!("position {position} beyond length {}", self.len()),
            ));
        }
        Ok(Box::new(BytesInput::new(
            self.data.slice(position as usize..),
            position,
            Some(self.len()),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_at_absolute_position() {
        let source = BytesDataSource::new("mem", Bytes::from_static(b"0123456789"));
        let mut input = source.open(4).unwrap();
        assert_eq!(input.position(), 4);
        assert_eq!(input.length(), Some(10));
        let mut buf = [0u8; 3];
        assert!(input.read_fully(&mut buf).unwrap());
        assert_eq!(&buf, b"456");
    }

    #[test]
    fn opening_past_end_is_a_load_error() {
        let source = BytesDataSource::new("mem", Bytes::from_static(b"01"));
        let err = source.open(3).err().unwrap();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("mem"));
    }
}
