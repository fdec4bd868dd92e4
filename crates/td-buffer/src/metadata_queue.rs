//! Per-sample records for one track, keyed by a monotonically increasing
//! absolute sample index.
//!
//! Records are kept in commit (decode) order. Timestamps need not be
//! monotonic; timestamp lookups bisect the keyframe list and then scan
//! forward from the chosen keyframe, taking the last sample whose timestamp
//! does not exceed the target.

use std::collections::VecDeque;
use std::sync::Arc;

use td_core::{CryptoData, Format, SampleFlags};

/// One committed sample.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub time_us: i64,
    pub flags: SampleFlags,
    pub offset: u64,
    pub size: usize,
    pub crypto: Option<CryptoData>,
    pub format: Arc<Format>,
}

impl SampleRecord {
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }
}

/// Outcome of [`SampleMetadataQueue::read`].
#[derive(Debug)]
pub enum MetadataRead<'a> {
    /// No sample is available yet.
    Nothing,
    /// The consumer must switch to this format before reading further.
    Format(Arc<Format>),
    /// The stream has ended.
    EndOfStream,
    /// The record at the read position; the read position has advanced past it.
    Sample(&'a SampleRecord),
}

/// Circular index of sample records.
#[derive(Debug)]
pub struct SampleMetadataQueue {
    records: VecDeque<SampleRecord>,
    /// Absolute indices of keyframe records, ascending.
    keyframes: VecDeque<u64>,
    absolute_first_index: u64,
    /// Read position relative to the first retained record.
    read_position: usize,
    largest_discarded_timestamp_us: Option<i64>,
    largest_queued_timestamp_us: Option<i64>,
    /// End offset of the most recent record discarded from the front.
    discarded_end_offset: u64,
    is_last_sample_queued: bool,
    upstream_keyframe_required: bool,
    upstream_format_required: bool,
    upstream_format: Option<Arc<Format>>,
}

impl SampleMetadataQueue {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(initial_capacity.max(1)),
            keyframes: VecDeque::new(),
            absolute_first_index: 0,
            read_position: 0,
            largest_discarded_timestamp_us: None,
            largest_queued_timestamp_us: None,
            discarded_end_offset: 0,
            is_last_sample_queued: false,
            upstream_keyframe_required: true,
            upstream_format_required: true,
            upstream_format: None,
        }
    }

    /// Drop every record. With `reset_upstream_format` the upstream format is
    /// forgotten too and must be pushed again before the next commit.
    pub fn reset(&mut self, reset_upstream_format: bool) {
        self.records.clear();
        self.keyframes.clear();
        self.absolute_first_index = 0;
        self.read_position = 0;
        self.largest_discarded_timestamp_us = None;
        self.largest_queued_timestamp_us = None;
        self.discarded_end_offset = 0;
        self.is_last_sample_queued = false;
        self.upstream_keyframe_required = true;
        if reset_upstream_format {
            self.upstream_format = None;
            self.upstream_format_required = true;
        }
    }

    // -- Indices ------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_index(&self) -> u64 {
        self.absolute_first_index
    }

    pub fn read_index(&self) -> u64 {
        self.absolute_first_index + self.read_position as u64
    }

    pub fn write_index(&self) -> u64 {
        self.absolute_first_index + self.records.len() as u64
    }

    pub fn has_next_sample(&self) -> bool {
        self.read_position != self.records.len()
    }

    // -- Timestamps ---------------------------------------------------------

    pub fn largest_queued_timestamp_us(&self) -> Option<i64> {
        self.largest_queued_timestamp_us
    }

    pub fn largest_discarded_timestamp_us(&self) -> Option<i64> {
        self.largest_discarded_timestamp_us
    }

    pub fn first_timestamp_us(&self) -> Option<i64> {
        self.records.front().map(|r| r.time_us)
    }

    pub fn is_last_sample_queued(&self) -> bool {
        self.is_last_sample_queued
    }

    pub fn upstream_format(&self) -> Option<&Arc<Format>> {
        self.upstream_format.as_ref()
    }

    // -- Producer side ------------------------------------------------------

    /// Record the format for subsequently committed samples. Returns whether
    /// it differs from the previous upstream format.
    pub fn set_upstream_format(&mut self, format: Format) -> bool {
        self.upstream_format_required = false;
        if self.upstream_format.as_deref() == Some(&format) {
            return false;
        }
        self.upstream_format = Some(Arc::new(format));
        true
    }

    /// Append a record. Samples arriving before the first keyframe after a
    /// reset are dropped.
    ///
    /// # Panics
    ///
    /// Panics if no upstream format has been set, or if the record overlaps
    /// bytes of the previous record.
    pub fn commit_sample(
        &mut self,
        time_us: i64,
        flags: SampleFlags,
        offset: u64,
        size: usize,
        crypto: Option<CryptoData>,
    ) {
        if self.upstream_keyframe_required {
            if !flags.is_key_frame() {
                tracing::debug!(time_us, "dropping leading non-keyframe sample");
                return;
            }
            self.upstream_keyframe_required = false;
        }
        assert!(
            !self.upstream_format_required,
            "sample committed before any format"
        );
        let Some(format) = self.upstream_format.clone() else {
            unreachable!("format presence tracked by upstream_format_required");
        };
        if let Some(last) = self.records.back() {
            assert!(
                offset >= last.end(),
                "sample at {offset} overlaps previous sample ending at {}",
                last.end()
            );
        }

        self.is_last_sample_queued = flags.contains(SampleFlags::LAST_SAMPLE);
        self.largest_queued_timestamp_us = Some(
            self.largest_queued_timestamp_us
                .map_or(time_us, |largest| largest.max(time_us)),
        );
        if flags.is_key_frame() {
            self.keyframes.push_back(self.write_index());
        }
        self.records.push_back(SampleRecord {
            time_us,
            flags,
            offset,
            size,
            crypto,
            format,
        });
    }

    /// Try to accept a spliced keyframe at `time_us`.
    ///
    /// Unread samples at or after `time_us` are discarded first. Fails if a
    /// sample at or after `time_us` has already been read or discarded.
    pub fn attempt_splice(&mut self, time_us: i64) -> bool {
        if self.records.is_empty() {
            return self
                .largest_discarded_timestamp_us
                .map_or(true, |largest| time_us > largest);
        }
        let largest_read = max_option(
            self.largest_discarded_timestamp_us,
            self.largest_timestamp_of_first(self.read_position),
        );
        if largest_read.is_some_and(|largest| largest >= time_us) {
            return false;
        }
        let mut retain_count = self.records.len();
        while retain_count > self.read_position && self.records[retain_count - 1].time_us >= time_us
        {
            retain_count -= 1;
        }
        self.discard_upstream_samples(self.absolute_first_index + retain_count as u64);
        true
    }

    /// Truncate records from absolute index `discard_from_index` onward.
    ///
    /// Returns the byte offset the data queue should roll its write frontier
    /// back to.
    ///
    /// # Panics
    ///
    /// Panics if any record to discard has already been read.
    pub fn discard_upstream_samples(&mut self, discard_from_index: u64) -> u64 {
        let write_index = self.write_index();
        assert!(
            discard_from_index >= self.read_index() && discard_from_index <= write_index,
            "upstream discard from {discard_from_index} outside unread range [{}, {write_index}]",
            self.read_index()
        );
        let keep = (discard_from_index - self.absolute_first_index) as usize;
        let first_discarded_offset = self.records.get(keep).map(|r| r.offset);
        self.records.truncate(keep);
        while self.keyframes.back().is_some_and(|&k| k >= discard_from_index) {
            self.keyframes.pop_back();
        }

        self.largest_queued_timestamp_us = max_option(
            self.largest_discarded_timestamp_us,
            self.largest_timestamp_of_first(self.records.len()),
        );
        if discard_from_index != write_index {
            self.is_last_sample_queued = false;
        }

        match (self.records.back(), first_discarded_offset) {
            (Some(last), _) => last.end(),
            (None, Some(offset)) => offset,
            (None, None) => self.discarded_end_offset,
        }
    }

    // -- Consumer side ------------------------------------------------------

    /// Move the read position back to the oldest retained record.
    pub fn rewind(&mut self) {
        self.read_position = 0;
    }

    /// Read the next record, or the format change that must precede it.
    pub fn read(
        &mut self,
        format_required: bool,
        loading_finished: bool,
        downstream_format: Option<&Arc<Format>>,
    ) -> MetadataRead<'_> {
        if !self.has_next_sample() {
            if loading_finished || self.is_last_sample_queued {
                return MetadataRead::EndOfStream;
            }
            return match &self.upstream_format {
                Some(upstream) if format_required || !same_format(upstream, downstream_format) => {
                    MetadataRead::Format(Arc::clone(upstream))
                }
                _ => MetadataRead::Nothing,
            };
        }

        let index = self.read_position;
        let format = &self.records[index].format;
        if format_required || !same_format(format, downstream_format) {
            return MetadataRead::Format(Arc::clone(format));
        }
        self.read_position += 1;
        MetadataRead::Sample(&self.records[index])
    }

    /// Advance the read position to the last sample at or before `time_us`
    /// (the last keyframe if `to_keyframe`). Returns the number of samples
    /// skipped, or `None` with the read position unchanged.
    pub fn advance_to(
        &mut self,
        time_us: i64,
        to_keyframe: bool,
        allow_time_beyond_buffer: bool,
    ) -> Option<usize> {
        let next = self.records.get(self.read_position)?;
        if time_us < next.time_us {
            return None;
        }
        if !allow_time_beyond_buffer
            && self
                .largest_queued_timestamp_us
                .is_some_and(|largest| time_us > largest)
        {
            return None;
        }
        let start = self.read_position;
        let skipped =
            self.find_sample_before(start, self.records.len() - start, time_us, to_keyframe)?;
        self.read_position += skipped;
        Some(skipped)
    }

    /// Move the read position to the end of the queue.
    pub fn advance_to_end(&mut self) -> usize {
        let skipped = self.records.len() - self.read_position;
        self.read_position = self.records.len();
        skipped
    }

    /// Set the read position to an absolute sample index within the queue.
    pub fn set_read_position(&mut self, sample_index: u64) -> bool {
        if sample_index < self.absolute_first_index || sample_index > self.write_index() {
            return false;
        }
        self.read_position = (sample_index - self.absolute_first_index) as usize;
        true
    }

    /// Discard records before the sample at or before `time_us`. Returns the
    /// byte offset that is now safe to release, if anything was discarded.
    pub fn discard_to(
        &mut self,
        time_us: i64,
        to_keyframe: bool,
        stop_at_read_position: bool,
    ) -> Option<u64> {
        let first = self.records.front()?;
        if time_us < first.time_us {
            return None;
        }
        let search_length = if stop_at_read_position && self.read_position != self.records.len() {
            self.read_position + 1
        } else {
            self.records.len()
        };
        let discard_count = self.find_sample_before(0, search_length, time_us, to_keyframe)?;
        Some(self.discard_samples(discard_count))
    }

    /// Discard every record that has been read.
    pub fn discard_to_read(&mut self) -> Option<u64> {
        if self.read_position == 0 {
            return None;
        }
        Some(self.discard_samples(self.read_position))
    }

    /// Discard every record.
    pub fn discard_to_end(&mut self) -> Option<u64> {
        if self.records.is_empty() {
            return None;
        }
        Some(self.discard_samples(self.records.len()))
    }

    // -- Internals ----------------------------------------------------------

    fn discard_samples(&mut self, count: usize) -> u64 {
        self.largest_discarded_timestamp_us = max_option(
            self.largest_discarded_timestamp_us,
            self.largest_timestamp_of_first(count),
        );
        let mut end = self.discarded_end_offset;
        for record in self.records.drain(..count) {
            end = record.end();
        }
        self.discarded_end_offset = end;
        self.absolute_first_index += count as u64;
        self.read_position = self.read_position.saturating_sub(count);
        while self
            .keyframes
            .front()
            .is_some_and(|&k| k < self.absolute_first_index)
        {
            self.keyframes.pop_front();
        }

        match self.records.front() {
            Some(first) => first.offset,
            None => end,
        }
    }

    /// Largest timestamp among the first `length` records, scanning back from
    /// the last of them until a keyframe.
    fn largest_timestamp_of_first(&self, length: usize) -> Option<i64> {
        let mut largest: Option<i64> = None;
        for record in self.records.range(..length).rev() {
            largest = max_option(largest, Some(record.time_us));
            if record.flags.is_key_frame() {
                break;
            }
        }
        largest
    }

    /// Among the `length` records starting at relative index `start`, find the
    /// last one with timestamp `<= time_us` (and a keyframe if `keyframe`),
    /// stopping at the first record with a larger timestamp. Returns its
    /// distance from `start`.
    fn find_sample_before(
        &self,
        start: usize,
        length: usize,
        time_us: i64,
        keyframe: bool,
    ) -> Option<usize> {
        let end = start + length;
        let origin = match self.last_keyframe_at_or_before(start, end, time_us) {
            Some(index) => index,
            None if keyframe => return None,
            None => start,
        };

        let mut found = None;
        for (index, record) in self.records.range(origin..end).enumerate() {
            if record.time_us > time_us {
                break;
            }
            if !keyframe || record.flags.is_key_frame() {
                found = Some(origin + index - start);
            }
        }
        found
    }

    /// Bisect the keyframes within relative range `[start, end)` for the last
    /// one whose timestamp does not exceed `time_us`.
    fn last_keyframe_at_or_before(&self, start: usize, end: usize, time_us: i64) -> Option<usize> {
        let first = self.absolute_first_index;
        let abs_start = first + start as u64;
        let abs_end = first + end as u64;
        let mut lo = self.keyframes.partition_point(|&k| k < abs_start);
        let mut hi = self.keyframes.partition_point(|&k| k < abs_end);
        let range_start = lo;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let record = &self.records[(self.keyframes[mid] - first) as usize];
            if record.time_us <= time_us {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        (lo > range_start).then(|| (self.keyframes[lo - 1] - first) as usize)
    }
}

fn max_option(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn same_format(format: &Arc<Format>, other: Option<&Arc<Format>>) -> bool {
    other.is_some_and(|other| Arc::ptr_eq(format, other) || **format == **other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_core::TrackType;

    const KEY: SampleFlags = SampleFlags::KEY_FRAME;
    const NONE: SampleFlags = SampleFlags::empty();

    fn queue_with(samples: &[(i64, SampleFlags)]) -> SampleMetadataQueue {
        let mut q = SampleMetadataQueue::new(4);
        q.set_upstream_format(Format::new("video/test", TrackType::Video));
        for (i, &(time, flags)) in samples.iter().enumerate() {
            q.commit_sample(time, flags, i as u64 * 10, 10, None);
        }
        q
    }

    fn read_time(q: &mut SampleMetadataQueue, downstream: &Arc<Format>) -> Option<i64> {
        match q.read(false, false, Some(downstream)) {
            MetadataRead::Sample(record) => Some(record.time_us),
            _ => None,
        }
    }

    #[test]
    fn leading_non_keyframes_are_dropped() {
        let q = queue_with(&[(0, NONE), (10, NONE), (20, KEY), (30, NONE)]);
        assert_eq!(q.len(), 2);
        assert_eq!(q.first_timestamp_us(), Some(20));
    }

    #[test]
    #[should_panic(expected = "before any format")]
    fn commit_without_format_panics() {
        let mut q = SampleMetadataQueue::new(4);
        q.commit_sample(0, KEY, 0, 10, None);
    }

    #[test]
    #[should_panic(expected = "overlaps previous sample")]
    fn overlapping_commit_panics() {
        let mut q = queue_with(&[(0, KEY)]);
        q.commit_sample(10, NONE, 5, 10, None);
    }

    #[test]
    fn format_read_precedes_first_sample() {
        let mut q = queue_with(&[(0, KEY), (10, NONE)]);
        let format = match q.read(false, false, None) {
            MetadataRead::Format(format) => format,
            other => panic!("expected format, got {other:?}"),
        };
        assert_eq!(read_time(&mut q, &format), Some(0));
        assert_eq!(read_time(&mut q, &format), Some(10));
        assert!(matches!(q.read(false, false, Some(&format)), MetadataRead::Nothing));
        assert!(matches!(q.read(false, true, Some(&format)), MetadataRead::EndOfStream));
    }

    #[test]
    fn format_change_mid_stream() {
        let mut q = queue_with(&[(0, KEY)]);
        q.set_upstream_format(Format::new("video/other", TrackType::Video));
        q.commit_sample(10, KEY, 10, 10, None);

        let MetadataRead::Format(first) = q.read(false, false, None) else {
            panic!("expected format");
        };
        assert_eq!(read_time(&mut q, &first), Some(0));
        let MetadataRead::Format(second) = q.read(false, false, Some(&first)) else {
            panic!("expected second format");
        };
        assert_eq!(second.sample_mime_type, "video/other");
        assert_eq!(read_time(&mut q, &second), Some(10));
    }

    #[test]
    fn advance_to_keyframe() {
        let mut q = queue_with(&[(0, KEY), (10, NONE), (20, KEY), (30, NONE), (40, NONE)]);
        assert_eq!(q.advance_to(35, true, false), Some(2));
        assert_eq!(q.read_index(), 2);
        q.rewind();
        assert_eq!(q.advance_to(35, false, false), Some(3));
    }

    #[test]
    fn advance_fails_outside_buffer() {
        let mut q = queue_with(&[(100, KEY), (110, NONE)]);
        assert_eq!(q.advance_to(50, true, false), None);
        assert_eq!(q.advance_to(500, true, false), None);
        assert_eq!(q.read_index(), 0);
        assert_eq!(q.advance_to(500, true, true), Some(0));
    }

    #[test]
    fn advance_with_out_of_order_timestamps() {
        // Decode order I P B B with presentation times 0, 30, 10, 20.
        let mut q = queue_with(&[(0, KEY), (30, NONE), (10, NONE), (20, NONE), (40, KEY)]);
        // The scan stops at the first timestamp past the target.
        assert_eq!(q.advance_to(25, false, false), Some(0));
        q.rewind();
        assert_eq!(q.advance_to(40, false, false), Some(4));
    }

    #[test]
    fn discard_to_returns_first_kept_offset() {
        let mut q = queue_with(&[(0, KEY), (10, NONE), (20, KEY), (30, NONE)]);
        assert_eq!(q.discard_to(25, true, false), Some(20));
        assert_eq!(q.first_index(), 2);
        assert_eq!(q.largest_discarded_timestamp_us(), Some(10));
    }

    #[test]
    fn discard_to_stops_at_read_position() {
        let mut q = queue_with(&[(0, KEY), (10, KEY), (20, KEY), (30, KEY)]);
        let format = Arc::clone(q.upstream_format().unwrap());
        assert_eq!(read_time(&mut q, &format), Some(0));
        // Read position is 1; at most one sample may be discarded.
        assert_eq!(q.discard_to(30, true, true), Some(10));
        assert_eq!(q.first_index(), 1);
        assert_eq!(q.read_index(), 1);
    }

    #[test]
    fn discard_to_end_returns_end_of_last() {
        let mut q = queue_with(&[(0, KEY), (10, NONE)]);
        assert_eq!(q.discard_to_end(), Some(20));
        assert!(q.is_empty());
        assert_eq!(q.discard_to_end(), None);
        assert_eq!(q.first_index(), 2);
    }

    #[test]
    fn discard_upstream_returns_rollback_offset() {
        let mut q = queue_with(&[(0, KEY), (10, NONE), (20, KEY), (30, NONE)]);
        assert_eq!(q.discard_upstream_samples(2), 20);
        assert_eq!(q.write_index(), 2);
        assert_eq!(q.largest_queued_timestamp_us(), Some(10));
        assert_eq!(q.advance_to(25, true, true), Some(0));
    }

    #[test]
    #[should_panic(expected = "outside unread range")]
    fn discard_upstream_of_read_sample_panics() {
        let mut q = queue_with(&[(0, KEY), (10, NONE)]);
        q.advance_to_end();
        q.discard_upstream_samples(1);
    }

    #[test]
    fn splice_discards_unread_later_samples() {
        let mut q = queue_with(&[(0, KEY), (10, NONE), (20, NONE), (30, NONE)]);
        let format = Arc::clone(q.upstream_format().unwrap());
        assert_eq!(read_time(&mut q, &format), Some(0));
        assert!(q.attempt_splice(15));
        assert_eq!(q.write_index(), 2);
    }

    #[test]
    fn splice_rejected_behind_read_position() {
        let mut q = queue_with(&[(0, KEY), (10, NONE), (20, NONE)]);
        let format = Arc::clone(q.upstream_format().unwrap());
        read_time(&mut q, &format);
        read_time(&mut q, &format);
        assert!(!q.attempt_splice(5));
        assert_eq!(q.write_index(), 3);
    }

    #[test]
    fn splice_into_empty_queue_checks_discarded() {
        let mut q = queue_with(&[(0, KEY), (10, NONE)]);
        q.discard_to_end();
        assert!(!q.attempt_splice(10));
        assert!(q.attempt_splice(11));
    }

    #[test]
    fn reset_requires_keyframe_again() {
        let mut q = queue_with(&[(0, KEY)]);
        q.reset(false);
        q.commit_sample(10, NONE, 0, 10, None);
        assert!(q.is_empty());
        q.commit_sample(20, KEY, 10, 10, None);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn set_read_position_bounds() {
        let mut q = queue_with(&[(0, KEY), (10, NONE)]);
        assert!(q.set_read_position(2));
        assert!(!q.has_next_sample());
        assert!(!q.set_read_position(3));
    }
}
