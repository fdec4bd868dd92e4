use td_seek::{FrameHeader, FrameParser};

use super::{FRAME_HEADER_LEN, FRAME_SYNC, FRAME_VERSION};

/// Check word stored in every frame header.
pub fn header_check(size: u32, timestamp_us: i64, flags: u8) -> u32 {
    let mixed = size ^ timestamp_us as u32 ^ (timestamp_us >> 32) as u32 ^ flags as u32;
    mixed.wrapping_mul(0x9E37_79B1) ^ 0x5A5A_5A5A
}

/// Recognizes synthetic frame headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncFrameParser;

impl SyncFrameParser {
    /// Sample flags byte of a header that already passed [`FrameParser::parse`].
    pub fn flags(header: &[u8]) -> u8 {
        header[2]
    }
}

impl FrameParser for SyncFrameParser {
    fn header_len(&self) -> usize {
        FRAME_HEADER_LEN
    }

    fn is_sync(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&FRAME_SYNC)
    }

    fn parse(&self, header: &[u8]) -> Option<FrameHeader> {
        if header.len() < FRAME_HEADER_LEN || !self.is_sync(header) || header[3] != FRAME_VERSION {
            return None;
        }
        let flags = header[2];
        let size = u32::from_be_bytes(header[4..8].try_into().ok()?);
        let timestamp_us = i64::from_be_bytes(header[8..16].try_into().ok()?);
        let check = u32::from_be_bytes(header[16..20].try_into().ok()?);
        if size < FRAME_HEADER_LEN as u32 || check != header_check(size, timestamp_us, flags) {
            return None;
        }
        Some(FrameHeader { timestamp_us, size })
    }
}
