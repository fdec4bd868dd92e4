//! Synthetic sync-framed stream used by the CLI, the end-to-end tests and the
//! playback benches.
//!
//! # Layout
//!
//! A 16-byte stream header (`b"TDSY"`, frame duration `u32`, total duration
//! `i64`, big-endian) is followed by frames. Every frame starts with a 20-byte
//! header:
//!
//! | bytes | field |
//! |---|---|
//! | 0..2 | sync `0x0F 0xF0` |
//! | 2 | sample flags |
//! | 3 | version (1) |
//! | 4..8 | total frame size `u32` |
//! | 8..16 | timestamp `i64` in microseconds |
//! | 16..20 | header check `u32` |
//!
//! Payload sizes vary from frame to frame so that byte offsets are not a
//! linear function of time, which is what makes the stream worth searching.

mod extractor;
mod parser;

pub use extractor::{factory, resolve_seek, SeekResolution, SyntheticExtractor};
pub use parser::{header_check, SyncFrameParser};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use td_core::SampleFlags;

pub const STREAM_MAGIC: [u8; 4] = *b"TDSY";
pub const STREAM_HEADER_LEN: usize = 16;
pub const FRAME_SYNC: [u8; 2] = [0x0F, 0xF0];
pub const FRAME_HEADER_LEN: usize = 20;
pub const FRAME_VERSION: u8 = 1;
pub const MIME_TYPE: &str = "audio/x-tapedeck-sync";

/// Header at the start of every synthetic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub frame_us: u32,
    pub duration_us: i64,
}

impl StreamHeader {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < STREAM_HEADER_LEN || bytes[..4] != STREAM_MAGIC {
            return None;
        }
        let frame_us = u32::from_be_bytes(bytes[4..8].try_into().ok()?);
        let duration_us = i64::from_be_bytes(bytes[8..16].try_into().ok()?);
        (frame_us > 0 && duration_us >= 0).then_some(Self {
            frame_us,
            duration_us,
        })
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_slice(&STREAM_MAGIC);
        out.put_u32(self.frame_us);
        out.put_i64(self.duration_us);
    }
}

/// Parameters of a generated stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticStream {
    pub frames: u32,
    pub frame_us: u32,
    /// Smallest payload in bytes.
    pub min_payload: u32,
    /// Payloads are `min_payload + [0, payload_spread)` bytes.
    pub payload_spread: u32,
    pub seed: u64,
}

impl Default for SyntheticStream {
    fn default() -> Self {
        Self {
            frames: 500,
            frame_us: 23_220,
            min_payload: 120,
            payload_spread: 300,
            seed: 1,
        }
    }
}

impl SyntheticStream {
    pub fn with_frames(frames: u32) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn duration_us(&self) -> i64 {
        self.frames as i64 * self.frame_us as i64
    }

    pub fn timestamp_us(&self, frame: u32) -> i64 {
        frame as i64 * self.frame_us as i64
    }

    /// Payload size of every frame, in order.
    pub fn payload_sizes(&self) -> Vec<u32> {
        let mut state = self.seed;
        (0..self.frames)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                let spread = self.payload_spread.max(1) as u64;
                self.min_payload.max(1) + ((state >> 33) % spread) as u32
            })
            .collect()
    }

    /// Byte offset of every frame header.
    pub fn frame_offsets(&self) -> Vec<u64> {
        let mut offset = STREAM_HEADER_LEN as u64;
        self.payload_sizes()
            .into_iter()
            .map(|payload| {
                let start = offset;
                offset += FRAME_HEADER_LEN as u64 + payload as u64;
                start
            })
            .collect()
    }

    /// Index of the frame playing at `time_us`.
    pub fn frame_at(&self, time_us: i64) -> Option<u32> {
        if self.frames == 0 || time_us < 0 {
            return None;
        }
        let frame = (time_us / self.frame_us.max(1) as i64).min(self.frames as i64 - 1);
        Some(frame as u32)
    }

    pub fn encode(&self) -> Bytes {
        let sizes = self.payload_sizes();
        let total: usize = sizes
            .iter()
            .map(|&payload| FRAME_HEADER_LEN + payload as usize)
            .sum();
        let mut out = BytesMut::with_capacity(STREAM_HEADER_LEN + total);
        StreamHeader {
            frame_us: self.frame_us,
            duration_us: self.duration_us(),
        }
        .write(&mut out);

        let flags = SampleFlags::KEY_FRAME.bits() as u8;
        for (frame, payload) in sizes.into_iter().enumerate() {
            let timestamp_us = self.timestamp_us(frame as u32);
            let size = FRAME_HEADER_LEN as u32 + payload;
            out.put_slice(&FRAME_SYNC);
            out.put_u8(flags);
            out.put_u8(FRAME_VERSION);
            out.put_u32(size);
            out.put_i64(timestamp_us);
            out.put_u32(header_check(size, timestamp_us, flags));
            out.put_bytes(0xA5 ^ (frame as u8 & 0x3F), payload as usize);
        }
        out.freeze()
    }
}
