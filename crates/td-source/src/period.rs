//! The [`MediaPeriod`] trait: the playback consumer's view of one period.

use std::any::Any;

use td_buffer::{ReadResult, SampleBuffer};
use td_core::{Format, Result};
use td_timeline::Uid;

/// Identifies a period to create, in the uid space of the source asked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeriodId {
    pub uid: Uid,
    /// Distinguishes repeated plays of the same period.
    pub window_sequence_number: u64,
}

impl PeriodId {
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            window_sequence_number: 0,
        }
    }

    /// The same id with the uid replaced, as passed down to a child source.
    pub fn with_uid(&self, uid: Uid) -> Self {
        Self {
            uid,
            window_sequence_number: self.window_sequence_number,
        }
    }
}

/// Loads and serves the samples of one period.
///
/// All calls come from the task that owns the period. Loading is cooperative:
/// nothing is buffered except inside [`prepare`](MediaPeriod::prepare) and
/// [`continue_loading`](MediaPeriod::continue_loading). Times are in period
/// time.
pub trait MediaPeriod: Send {
    /// Load until the tracks and seek map are known.
    fn prepare(&mut self, position_us: i64) -> Result<()>;

    fn is_prepared(&self) -> bool;

    /// Format of each track, indexed by track.
    fn track_groups(&self) -> Vec<Format>;

    /// Enable the tracks flagged in `enabled` and return the position playback
    /// actually starts from, which may differ from `position_us` if a seek
    /// was needed.
    fn select_tracks(&mut self, enabled: &[bool], position_us: i64) -> i64;

    /// Read the next format change or sample of `track`.
    fn read(
        &mut self,
        track: usize,
        buffer: &mut SampleBuffer,
        format_required: bool,
    ) -> Result<ReadResult>;

    /// Seek to `position_us` and return the position actually reached.
    /// Seeking twice to the same position reaches the same place.
    fn seek_to(&mut self, position_us: i64) -> i64;

    /// Drop buffered samples that are no longer needed at `position_us`.
    fn discard_buffer(&mut self, position_us: i64);

    /// Largest position buffered on every enabled track. `None` once the
    /// period is loaded to its end.
    fn buffered_position_us(&self) -> Option<i64>;

    /// Position the next load starts from. `None` when nothing remains.
    fn next_load_position_us(&self) -> Option<i64>;

    /// Load a bounded amount of data. Returns whether anything was loaded.
    fn continue_loading(&mut self, position_us: i64) -> bool;

    /// Surface a load failure that stopped loading.
    fn maybe_throw_error(&mut self) -> Result<()>;

    /// Lets a wrapping source recover its own period type on release.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}
