//! Plays `[start, end)` of a single-period child.

use std::any::Any;
use std::sync::Arc;

use td_buffer::{ReadResult, SampleBuffer};
use td_core::{Error, Format, Result, SampleFlags, SourceId};
use td_timeline::{ClippedTimeline, SharedTimeline, Timeline};

use crate::period::{MediaPeriod, PeriodId};
use crate::source::{publish, ChildSource, MediaSource, SourceEventSender};

pub struct ClippingSource {
    child: ChildSource,
    start_us: i64,
    end_us: Option<i64>,
    listener: Option<SourceEventSender>,
    timeline: Option<ClippedTimeline>,
}

impl ClippingSource {
    /// Clip `source` to `[start_us, end_us)` of its window. `None` for the
    /// end plays to the child's end.
    pub fn new(source: Box<dyn MediaSource>, start_us: i64, end_us: Option<i64>) -> Self {
        Self {
            child: ChildSource::new(source),
            start_us,
            end_us,
            listener: None,
            timeline: None,
        }
    }

    pub fn timeline(&self) -> Option<SharedTimeline> {
        self.timeline
            .as_ref()
            .map(|clipped| Arc::new(clipped.clone().into()))
    }

    /// Rebuild the clipped timeline from the child's latest one.
    fn absorb_child_timeline(&mut self) -> Result<bool> {
        if !self.child.refresh()? {
            return Ok(false);
        }
        let Some(child_timeline) = self.child.timeline.clone() else {
            return Ok(false);
        };
        let clipped = ClippedTimeline::new(child_timeline, self.start_us, self.end_us)
            .inspect_err(|failure| {
                tracing::warn!(
                    source = %self.id(),
                    start_us = self.start_us,
                    end_us = ?self.end_us,
                    %failure,
                    "clipping rejected"
                );
            })
            .map_err(Error::IllegalClipping)?;
        let timeline: Timeline = clipped.clone().into();
        self.timeline = Some(clipped);
        publish(
            self.listener.as_ref(),
            Arc::new(timeline),
            self.child.manifest.clone(),
        );
        Ok(true)
    }
}

impl MediaSource for ClippingSource {
    fn id(&self) -> SourceId {
        self.child.source.id()
    }

    fn prepare(&mut self, listener: SourceEventSender) -> Result<()> {
        self.listener = Some(listener);
        self.child.prepare()?;
        self.absorb_child_timeline()?;
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        self.absorb_child_timeline()
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        let Some(clipped) = &self.timeline else {
            return Err(Error::Internal(format!(
                "period {} requested before source {} published a timeline",
                id.uid,
                self.id()
            )));
        };
        let start_us = clipped.period_offset_us();
        let end_us = clipped.duration_us().map(|duration| start_us + duration);
        let inner = self.child.source.create_period(id)?;
        Ok(Box::new(ClippingPeriod::new(inner, start_us, end_us)))
    }

    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>) {
        match period.into_any().downcast::<ClippingPeriod>() {
            Ok(clipping) => self.child.source.release_period(id, clipping.inner),
            Err(_) => tracing::warn!(period = %id.uid, "released period was not created here"),
        }
    }

    fn release(&mut self) {
        self.child.release();
        self.timeline = None;
        self.listener = None;
    }
}

/// Wraps a child period, exposing `[start_us, end_us)` of child period time
/// as `[0, end_us - start_us)`.
///
/// Sample timestamps are shifted by `start_us` on read. The first sample at
/// or past `end_us` is replaced by end of stream, as is an empty read once
/// the child has buffered everything up to the end.
pub struct ClippingPeriod {
    inner: Box<dyn MediaPeriod>,
    start_us: i64,
    end_us: Option<i64>,
    /// Tracks that have already signalled end of stream.
    ended: Vec<bool>,
}

impl ClippingPeriod {
    pub fn new(inner: Box<dyn MediaPeriod>, start_us: i64, end_us: Option<i64>) -> Self {
        Self {
            inner,
            start_us,
            end_us,
            ended: Vec::new(),
        }
    }

    fn to_child_us(&self, position_us: i64) -> i64 {
        let child_us = position_us.max(0) + self.start_us;
        match self.end_us {
            Some(end) => child_us.min(end),
            None => child_us,
        }
    }

    /// Child buffered position mapped back, or `None` once the child is
    /// buffered to the clip end.
    fn clip_position(&self, child_us: Option<i64>) -> Option<i64> {
        let child_us = child_us?;
        if self.end_us.is_some_and(|end| child_us >= end) {
            return None;
        }
        Some((child_us - self.start_us).max(0))
    }

    fn signal_end(&mut self, track: usize, buffer: &mut SampleBuffer) -> ReadResult {
        self.ended[track] = true;
        buffer.clear();
        buffer.flags = SampleFlags::END_OF_STREAM;
        ReadResult::SampleRead
    }
}

impl MediaPeriod for ClippingPeriod {
    fn prepare(&mut self, position_us: i64) -> Result<()> {
        let child_us = self.to_child_us(position_us);
        self.inner.prepare(child_us)
    }

    fn is_prepared(&self) -> bool {
        self.inner.is_prepared()
    }

    fn track_groups(&self) -> Vec<Format> {
        self.inner.track_groups()
    }

    fn select_tracks(&mut self, enabled: &[bool], position_us: i64) -> i64 {
        self.ended = vec![false; enabled.len()];
        let child_us = self.to_child_us(position_us);
        let enabled_us = self.inner.select_tracks(enabled, child_us);
        (enabled_us - self.start_us).max(0)
    }

    fn read(
        &mut self,
        track: usize,
        buffer: &mut SampleBuffer,
        format_required: bool,
    ) -> Result<ReadResult> {
        if self.ended[track] {
            return Ok(self.signal_end(track, buffer));
        }
        let result = self.inner.read(track, buffer, format_required)?;
        match result {
            ReadResult::SampleRead if buffer.is_end_of_stream() => {
                self.ended[track] = true;
                Ok(result)
            }
            ReadResult::SampleRead => {
                if self.end_us.is_some_and(|end| buffer.time_us >= end) {
                    return Ok(self.signal_end(track, buffer));
                }
                buffer.time_us -= self.start_us;
                Ok(result)
            }
            ReadResult::NothingRead
                if self.end_us.is_some() && self.buffered_position_us().is_none() =>
            {
                Ok(self.signal_end(track, buffer))
            }
            other => Ok(other),
        }
    }

    fn seek_to(&mut self, position_us: i64) -> i64 {
        self.ended.iter_mut().for_each(|ended| *ended = false);
        let child_us = self.to_child_us(position_us);
        let reached_us = self.inner.seek_to(child_us);
        (reached_us - self.start_us).max(0)
    }

    fn discard_buffer(&mut self, position_us: i64) {
        let child_us = self.to_child_us(position_us);
        self.inner.discard_buffer(child_us);
    }

    fn buffered_position_us(&self) -> Option<i64> {
        self.clip_position(self.inner.buffered_position_us())
    }

    fn next_load_position_us(&self) -> Option<i64> {
        self.clip_position(self.inner.next_load_position_us())
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        let child_us = self.to_child_us(position_us);
        self.inner.continue_loading(child_us)
    }

    fn maybe_throw_error(&mut self) -> Result<()> {
        self.inner.maybe_throw_error()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use td_core::TrackType;

    /// One track of keyframes at fixed timestamps, served in order.
    struct ScriptedPeriod {
        pending: VecDeque<i64>,
        all: Vec<i64>,
        finished: bool,
        last_seek_us: Option<i64>,
    }

    impl ScriptedPeriod {
        fn new(times: &[i64], finished: bool) -> Self {
            Self {
                pending: times.iter().copied().collect(),
                all: times.to_vec(),
                finished,
                last_seek_us: None,
            }
        }
    }

    impl MediaPeriod for ScriptedPeriod {
        fn prepare(&mut self, _position_us: i64) -> Result<()> {
            Ok(())
        }

        fn is_prepared(&self) -> bool {
            true
        }

        fn track_groups(&self) -> Vec<Format> {
            vec![Format::new("audio/test", TrackType::Audio)]
        }

        fn select_tracks(&mut self, _enabled: &[bool], position_us: i64) -> i64 {
            self.seek_to(position_us)
        }

        fn read(
            &mut self,
            _track: usize,
            buffer: &mut SampleBuffer,
            _format_required: bool,
        ) -> Result<ReadResult> {
            match self.pending.pop_front() {
                Some(time_us) => {
                    buffer.clear();
                    buffer.time_us = time_us;
                    buffer.flags = SampleFlags::KEY_FRAME;
                    Ok(ReadResult::SampleRead)
                }
                None if self.finished => {
                    buffer.clear();
                    buffer.flags = SampleFlags::END_OF_STREAM;
                    Ok(ReadResult::SampleRead)
                }
                None => Ok(ReadResult::NothingRead),
            }
        }

        fn seek_to(&mut self, position_us: i64) -> i64 {
            self.last_seek_us = Some(position_us);
            self.pending = self.all.iter().copied().filter(|&t| t >= position_us).collect();
            position_us
        }

        fn discard_buffer(&mut self, _position_us: i64) {}

        fn buffered_position_us(&self) -> Option<i64> {
            if self.finished {
                None
            } else {
                self.all.last().copied()
            }
        }

        fn next_load_position_us(&self) -> Option<i64> {
            self.buffered_position_us()
        }

        fn continue_loading(&mut self, _position_us: i64) -> bool {
            false
        }

        fn maybe_throw_error(&mut self) -> Result<()> {
            Ok(())
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
            self
        }
    }

    fn read_times(period: &mut ClippingPeriod) -> (Vec<i64>, bool) {
        let mut buffer = SampleBuffer::new();
        let mut times = Vec::new();
        for _ in 0..32 {
            match period.read(0, &mut buffer, false).unwrap() {
                ReadResult::SampleRead if buffer.is_end_of_stream() => return (times, true),
                ReadResult::SampleRead => times.push(buffer.time_us),
                ReadResult::NothingRead => return (times, false),
                ReadResult::FormatRead(_) => {}
            }
        }
        (times, false)
    }

    #[test]
    fn timestamps_start_at_zero_and_stop_before_clip_end() {
        let times: Vec<i64> = (0..10).map(|i| i * 1_000).collect();
        let inner = Box::new(ScriptedPeriod::new(&times, true));
        let mut period = ClippingPeriod::new(inner, 2_000, Some(5_000));
        assert_eq!(period.select_tracks(&[true], 0), 0);

        let (read, ended) = read_times(&mut period);
        assert_eq!(read, vec![0, 1_000, 2_000]);
        assert!(ended);
        // End of stream is sticky until the next seek.
        let (again, ended) = read_times(&mut period);
        assert!(again.is_empty());
        assert!(ended);
    }

    #[test]
    fn seek_is_offset_into_child_time() {
        let times: Vec<i64> = (0..10).map(|i| i * 1_000).collect();
        let mut period =
            ClippingPeriod::new(Box::new(ScriptedPeriod::new(&times, true)), 2_000, None);
        period.select_tracks(&[true], 0);
        assert_eq!(period.seek_to(3_000), 3_000);
        let (read, ended) = read_times(&mut period);
        assert_eq!(read.first(), Some(&3_000));
        assert_eq!(read.last(), Some(&7_000));
        assert!(ended);
    }

    #[test]
    fn seek_past_clip_end_is_clamped() {
        let times: Vec<i64> = (0..10).map(|i| i * 1_000).collect();
        let mut period =
            ClippingPeriod::new(Box::new(ScriptedPeriod::new(&times, true)), 2_000, Some(5_000));
        period.select_tracks(&[true], 0);
        assert_eq!(period.seek_to(60_000), 3_000);
    }

    #[test]
    fn empty_read_past_buffered_end_ends_stream() {
        // Child has buffered everything up to 6s but has not finished loading.
        let mut period = ClippingPeriod::new(
            Box::new(ScriptedPeriod::new(&[0, 2_000, 6_000], false)),
            0,
            Some(4_000),
        );
        period.select_tracks(&[true], 0);
        let (read, ended) = read_times(&mut period);
        assert_eq!(read, vec![0, 2_000]);
        assert!(ended);
        assert_eq!(period.buffered_position_us(), None);
    }

    #[test]
    fn buffered_position_is_in_clip_time() {
        let period = ClippingPeriod::new(
            Box::new(ScriptedPeriod::new(&[0, 3_000], false)),
            1_000,
            Some(8_000),
        );
        assert_eq!(period.buffered_position_us(), Some(2_000));
    }
}
