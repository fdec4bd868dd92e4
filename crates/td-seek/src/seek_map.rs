//! Time-to-byte mappings published by extractors once they know the layout
//! of their stream.

use std::fmt::Debug;

/// A position to resume loading from for a requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    pub time_us: i64,
    pub position: u64,
}

/// Maps playback times to byte positions.
pub trait SeekMap: Debug + Send + Sync {
    fn is_seekable(&self) -> bool;

    /// Stream duration, if known.
    fn duration_us(&self) -> Option<i64>;

    /// Byte position to start loading from for `time_us`. The extractor is
    /// told the exact time separately and may refine the position itself.
    fn seek_point(&self, time_us: i64) -> SeekPoint;
}

/// Seek map of a stream that can only be played from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unseekable {
    duration_us: Option<i64>,
    start_position: u64,
}

impl Unseekable {
    pub fn new(duration_us: Option<i64>, start_position: u64) -> Self {
        Self {
            duration_us,
            start_position,
        }
    }
}

impl SeekMap for Unseekable {
    fn is_seekable(&self) -> bool {
        false
    }

    fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    fn seek_point(&self, _time_us: i64) -> SeekPoint {
        SeekPoint {
            time_us: 0,
            position: self.start_position,
        }
    }
}

/// Bounds of a stream searched by bisection.
///
/// Every seek starts loading at the floor byte position; the extractor's
/// [`BinarySearchSeeker`](crate::BinarySearchSeeker) then repositions to the
/// sample that contains the target time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinarySearchSeekMap {
    pub duration_us: i64,
    pub floor_time_us: i64,
    pub ceiling_time_us: i64,
    pub floor_byte_position: u64,
    pub ceiling_byte_position: u64,
    pub approx_bytes_per_frame: u64,
}

impl BinarySearchSeekMap {
    pub fn new(
        duration_us: i64,
        floor_byte_position: u64,
        ceiling_byte_position: u64,
        approx_bytes_per_frame: u64,
    ) -> Self {
        Self {
            duration_us,
            floor_time_us: 0,
            ceiling_time_us: duration_us,
            floor_byte_position,
            ceiling_byte_position,
            approx_bytes_per_frame,
        }
    }
}

impl SeekMap for BinarySearchSeekMap {
    fn is_seekable(&self) -> bool {
        true
    }

    fn duration_us(&self) -> Option<i64> {
        Some(self.duration_us)
    }

    fn seek_point(&self, time_us: i64) -> SeekPoint {
        SeekPoint {
            time_us,
            position: self.floor_byte_position,
        }
    }
}
