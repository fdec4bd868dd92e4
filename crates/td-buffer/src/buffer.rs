//! Consumer-side holder for one read sample.

use bytes::BytesMut;
use td_core::SampleFlags;

use crate::crypto::CryptoInfo;

/// Payload and metadata of the most recently read sample.
///
/// Reused across reads; [`SampleQueue::read`](crate::SampleQueue::read)
/// overwrites every field.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    pub data: BytesMut,
    pub time_us: i64,
    pub flags: SampleFlags,
    pub crypto: Option<CryptoInfo>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.time_us = 0;
        self.flags = SampleFlags::empty();
        self.crypto = None;
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.is_end_of_stream()
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags.is_key_frame()
    }

    pub fn is_decode_only(&self) -> bool {
        self.flags.contains(SampleFlags::DECODE_ONLY)
    }

    /// Resize the payload to `len` bytes and return it for writing.
    pub(crate) fn payload_mut(&mut self, len: usize) -> &mut [u8] {
        self.data.clear();
        self.data.resize(len, 0);
        &mut self.data[..]
    }
}
