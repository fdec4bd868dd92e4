//! Bisection over a byte-addressable, time-stamped stream without a seek index.
//!
//! The driver keeps a `[floor, ceiling]` byte window with matching time
//! bounds. Each probe positions the input at the next search position and
//! asks a [`TimestampSeeker`] whether the target lies there, before it, or
//! after it. Once the window is no wider than the minimum search range a
//! final probe is made from the floor; if that does not find the target the
//! floor is accepted.
//!
//! The driver never blocks on I/O it cannot perform with the current input:
//! when the next probe lies behind the read position, or too far ahead to
//! skip, it returns [`SeekStep::Reposition`] and expects to be called again
//! with an input opened at that position.

use td_core::config::SeekConfig;
use td_core::{Error, Result};

use crate::input::ExtractorInput;
use crate::seek_map::BinarySearchSeekMap;

/// Result of probing the stream at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSearchResult {
    /// No frame could be located at the probe position.
    NoTimestamp,
    /// The first frame at the probe is already past the target. `byte_position`
    /// becomes the new ceiling.
    Overestimated { timestamp_us: i64, byte_position: u64 },
    /// Every frame seen is at or before the target. `byte_position` (a frame
    /// start) becomes the new floor.
    Underestimated { timestamp_us: i64, byte_position: u64 },
    /// The frame starting at `byte_position` contains the target.
    TargetFound { byte_position: u64 },
}

/// Locates the target time relative to the input's current position.
pub trait TimestampSeeker {
    /// Probe from `input.position()` using only peeks.
    fn search_for_timestamp(
        &mut self,
        input: &mut dyn ExtractorInput,
        target_time_us: i64,
    ) -> Result<TimestampSearchResult>;

    /// Called once a seek operation completes.
    fn on_seek_finished(&mut self) {}
}

/// What the caller must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStep {
    /// Reopen the input at this absolute position and call again.
    Reposition(u64),
    /// The search finished with the input positioned at `byte_position`.
    /// `found` is false when the floor was accepted without confirming the
    /// target.
    Resolved { byte_position: u64, found: bool },
}

/// State of one in-progress seek.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekOperationParams {
    pub seek_time_us: i64,
    pub floor_time_us: i64,
    pub ceiling_time_us: i64,
    pub floor_byte_position: u64,
    pub ceiling_byte_position: u64,
    pub approx_bytes_per_frame: u64,
    pub next_search_position: u64,
    final_probe: bool,
    resolved: Option<(u64, bool)>,
}

impl SeekOperationParams {
    fn new(seek_time_us: i64, bounds: &BinarySearchSeekMap) -> Self {
        let mut params = Self {
            seek_time_us,
            floor_time_us: bounds.floor_time_us,
            ceiling_time_us: bounds.ceiling_time_us,
            floor_byte_position: bounds.floor_byte_position,
            ceiling_byte_position: bounds.ceiling_byte_position,
            approx_bytes_per_frame: bounds.approx_bytes_per_frame,
            next_search_position: bounds.floor_byte_position,
            final_probe: false,
            resolved: None,
        };
        params.update_next_search_position();
        params
    }

    fn update_floor(&mut self, time_us: i64, byte_position: u64) {
        self.floor_time_us = time_us;
        self.floor_byte_position = byte_position;
        self.update_next_search_position();
    }

    fn update_ceiling(&mut self, time_us: i64, byte_position: u64) {
        self.ceiling_time_us = time_us;
        self.ceiling_byte_position = byte_position;
        self.update_next_search_position();
    }

    fn resolve(&mut self, byte_position: u64, found: bool) {
        self.resolved = Some((byte_position, found));
    }

    /// Midpoint of the window, pulled back by one frame so the probe lands
    /// before the frame straddling the midpoint, clamped into the window.
    fn update_next_search_position(&mut self) {
        let floor = self.floor_byte_position;
        let ceiling = self.ceiling_byte_position;
        if floor + 1 >= ceiling {
            self.next_search_position = floor;
            return;
        }
        let midpoint = floor + (ceiling - floor) / 2;
        self.next_search_position = midpoint
            .saturating_sub(self.approx_bytes_per_frame)
            .clamp(floor, ceiling - 1);
    }
}

/// Bisection driver, generic over the stream-specific probe.
#[derive(Debug)]
pub struct BinarySearchSeeker<T> {
    timestamp_seeker: T,
    bounds: BinarySearchSeekMap,
    minimum_search_range: u64,
    max_skip_bytes: u64,
    operation: Option<SeekOperationParams>,
    probe_count: u32,
}

impl<T: TimestampSeeker> BinarySearchSeeker<T> {
    pub fn new(timestamp_seeker: T, bounds: BinarySearchSeekMap, config: &SeekConfig) -> Self {
        Self {
            timestamp_seeker,
            bounds,
            minimum_search_range: config.minimum_search_range,
            max_skip_bytes: config.max_skip_bytes,
            operation: None,
            probe_count: 0,
        }
    }

    /// Seek map describing the searched stream.
    pub fn seek_map(&self) -> BinarySearchSeekMap {
        self.bounds
    }

    /// Start a search for `time_us`. A search already running for a different
    /// time is abandoned and its progress discarded.
    pub fn set_seek_target_us(&mut self, time_us: i64) {
        if let Some(operation) = &self.operation {
            if operation.seek_time_us == time_us {
                return;
            }
            tracing::debug!(
                previous = operation.seek_time_us,
                time_us,
                "superseding in-progress seek"
            );
        }
        self.operation = Some(SeekOperationParams::new(time_us, &self.bounds));
        self.probe_count = 0;
    }

    /// Abandon any in-progress search.
    pub fn cancel(&mut self) {
        self.operation = None;
    }

    pub fn is_seeking(&self) -> bool {
        self.operation.is_some()
    }

    /// Current search state, if a search is running.
    pub fn operation(&self) -> Option<&SeekOperationParams> {
        self.operation.as_ref()
    }

    /// Probes made by the current or most recent search.
    pub fn probe_count(&self) -> u32 {
        self.probe_count
    }

    /// Advance the search as far as the current input allows.
    pub fn handle_pending_seek(&mut self, input: &mut dyn ExtractorInput) -> Result<SeekStep> {
        loop {
            let Some(operation) = self.operation.as_mut() else {
                return Err(Error::Internal("no seek operation pending".into()));
            };

            if let Some((byte_position, found)) = operation.resolved {
                if !skip_input_until(input, byte_position, self.max_skip_bytes)? {
                    return Ok(SeekStep::Reposition(byte_position));
                }
                tracing::debug!(
                    time_us = operation.seek_time_us,
                    byte_position,
                    found,
                    probes = self.probe_count,
                    "binary search finished"
                );
                self.operation = None;
                self.timestamp_seeker.on_seek_finished();
                return Ok(SeekStep::Resolved {
                    byte_position,
                    found,
                });
            }

            let floor = operation.floor_byte_position;
            if operation.ceiling_byte_position - floor <= self.minimum_search_range {
                if operation.final_probe {
                    operation.resolve(floor, false);
                    continue;
                }
                operation.final_probe = true;
                operation.next_search_position = floor;
            }

            let search_position = operation.next_search_position;
            if !skip_input_until(input, search_position, self.max_skip_bytes)? {
                return Ok(SeekStep::Reposition(search_position));
            }
            input.reset_peek_position();
            self.probe_count += 1;

            let result = self
                .timestamp_seeker
                .search_for_timestamp(input, operation.seek_time_us)?;
            match result {
                TimestampSearchResult::TargetFound { byte_position } => {
                    operation.resolve(byte_position, true);
                }
                TimestampSearchResult::NoTimestamp => operation.resolve(floor, false),
                _ if operation.final_probe => operation.resolve(floor, false),
                TimestampSearchResult::Overestimated {
                    timestamp_us,
                    byte_position,
                } => operation.update_ceiling(timestamp_us, byte_position),
                TimestampSearchResult::Underestimated {
                    timestamp_us,
                    byte_position,
                } => {
                    if byte_position <= floor {
                        // The window cannot shrink from this side.
                        operation.resolve(floor, false);
                    } else {
                        let byte_position = byte_position.min(operation.ceiling_byte_position);
                        operation.update_floor(timestamp_us, byte_position);
                    }
                }
            }
        }
    }
}

/// Skip forward to `position` if it is ahead of the input and within reach.
fn skip_input_until(
    input: &mut dyn ExtractorInput,
    position: u64,
    max_skip_bytes: u64,
) -> Result<bool> {
    let current = input.position();
    if position < current || position - current > max_skip_bytes {
        return Ok(false);
    }
    input.skip_fully(position - current)?;
    Ok(true)
}
