//! Per-track sample queue: the producer pushes formats, bytes, and sample
//! metadata; the consumer reads, seeks, and discards.
//!
//! One producer and one consumer use a queue. Both run on the task that owns
//! it, so discards are always serialized with the reads that justify them.

use std::sync::Arc;

use td_core::config::BufferConfig;
use td_core::{CryptoData, Format, Result, SampleFlags};

use crate::allocator::Allocator;
use crate::buffer::SampleBuffer;
use crate::crypto::read_encryption_header;
use crate::data_queue::SampleDataQueue;
use crate::metadata_queue::{MetadataRead, SampleMetadataQueue};

/// Outcome of [`SampleQueue::read`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// Nothing is available yet.
    NothingRead,
    /// The consumer must reconfigure for this format before reading on.
    FormatRead(Arc<Format>),
    /// The buffer holds a sample, or the end-of-stream marker.
    SampleRead,
}

/// Buffered samples of one track.
#[derive(Debug)]
pub struct SampleQueue {
    track_id: u32,
    data: SampleDataQueue,
    metadata: SampleMetadataQueue,
    downstream_format: Option<Arc<Format>>,
    last_unadjusted_format: Option<Format>,
    pending_format_adjustment: bool,
    sample_offset_us: i64,
    pending_splice: bool,
    decode_only_until_us: Option<i64>,
}

impl SampleQueue {
    pub fn new(track_id: u32, allocator: Arc<Allocator>, initial_metadata_capacity: usize) -> Self {
        Self {
            track_id,
            data: SampleDataQueue::new(allocator),
            metadata: SampleMetadataQueue::new(initial_metadata_capacity),
            downstream_format: None,
            last_unadjusted_format: None,
            pending_format_adjustment: false,
            sample_offset_us: 0,
            pending_splice: false,
            decode_only_until_us: None,
        }
    }

    pub fn with_config(track_id: u32, allocator: Arc<Allocator>, config: &BufferConfig) -> Self {
        Self::new(track_id, allocator, config.initial_metadata_capacity)
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// Clear all buffered samples and bytes.
    pub fn reset(&mut self, reset_upstream_format: bool) {
        self.metadata.reset(reset_upstream_format);
        self.data.reset();
        self.pending_splice = false;
    }

    // -- Queries ------------------------------------------------------------

    pub fn first_index(&self) -> u64 {
        self.metadata.first_index()
    }

    pub fn read_index(&self) -> u64 {
        self.metadata.read_index()
    }

    pub fn write_index(&self) -> u64 {
        self.metadata.write_index()
    }

    pub fn has_next_sample(&self) -> bool {
        self.metadata.has_next_sample()
    }

    /// Whether a read would return something other than `NothingRead`.
    pub fn is_ready(&self, loading_finished: bool) -> bool {
        loading_finished || self.metadata.is_last_sample_queued() || self.has_next_sample()
    }

    pub fn upstream_format(&self) -> Option<&Arc<Format>> {
        self.metadata.upstream_format()
    }

    pub fn largest_queued_timestamp_us(&self) -> Option<i64> {
        self.metadata.largest_queued_timestamp_us()
    }

    pub fn first_timestamp_us(&self) -> Option<i64> {
        self.metadata.first_timestamp_us()
    }

    pub fn is_last_sample_queued(&self) -> bool {
        self.metadata.is_last_sample_queued()
    }

    /// Bytes currently held by this queue's allocation blocks.
    pub fn retained_bytes(&self) -> u64 {
        self.data.retained_bytes()
    }

    // -- Producer side ------------------------------------------------------

    /// Set the format of subsequently committed samples. Returns whether the
    /// upstream format changed.
    pub fn format(&mut self, format: Format) -> bool {
        let adjusted = adjust_sample_format(&format, self.sample_offset_us);
        let changed = self.metadata.set_upstream_format(adjusted);
        self.last_unadjusted_format = Some(format);
        self.pending_format_adjustment = false;
        if changed {
            tracing::debug!(track = self.track_id, "upstream format changed");
        }
        changed
    }

    /// Append sample payload bytes at the write frontier.
    pub fn push_data(&mut self, data: &[u8]) {
        self.data.append(data);
    }

    /// Commit the sample whose `size` bytes were the last ones pushed.
    pub fn commit_sample(
        &mut self,
        time_us: i64,
        flags: SampleFlags,
        size: usize,
        crypto: Option<CryptoData>,
    ) {
        if self.pending_format_adjustment {
            if let Some(format) = self.last_unadjusted_format.clone() {
                self.format(format);
            }
        }
        let time_us = time_us + self.sample_offset_us;
        if self.pending_splice {
            if !flags.is_key_frame() || !self.metadata.attempt_splice(time_us) {
                tracing::warn!(track = self.track_id, time_us, "rejected spliced sample");
                return;
            }
            self.pending_splice = false;
        }
        let written = self.data.total_bytes_written();
        assert!(
            size as u64 <= written,
            "sample of {size} bytes exceeds the {written} bytes pushed"
        );
        self.metadata
            .commit_sample(time_us, flags, written - size as u64, size, crypto);
    }

    /// The next committed sample joins a discontinuous upstream source; it
    /// must be a keyframe.
    pub fn splice(&mut self) {
        self.pending_splice = true;
    }

    /// Offset added to every subsequently committed timestamp and to the
    /// subsample offset of the next format.
    pub fn set_sample_offset_us(&mut self, sample_offset_us: i64) {
        if self.sample_offset_us != sample_offset_us {
            self.sample_offset_us = sample_offset_us;
            self.pending_format_adjustment = true;
        }
    }

    /// Drop unread samples from absolute index `discard_from_index` onward.
    pub fn discard_upstream_samples(&mut self, discard_from_index: u64) {
        let position = self.metadata.discard_upstream_samples(discard_from_index);
        self.data.discard_upstream_sample_bytes(position);
    }

    // -- Consumer side ------------------------------------------------------

    /// Samples with timestamps before `start_time_us` are flagged decode-only on read.
    pub fn set_start_time_us(&mut self, start_time_us: i64) {
        self.decode_only_until_us = Some(start_time_us);
    }

    pub fn rewind(&mut self) {
        self.metadata.rewind();
        self.data.rewind();
    }

    /// Rewind, then advance to the keyframe at or before `time_us`. On failure
    /// the read position is left where it was.
    pub fn seek_to(&mut self, time_us: i64, allow_time_beyond_buffer: bool) -> bool {
        let previous = self.metadata.read_index();
        self.rewind();
        if self
            .metadata
            .advance_to(time_us, true, allow_time_beyond_buffer)
            .is_some()
        {
            return true;
        }
        self.metadata.set_read_position(previous);
        false
    }

    pub fn advance_to(
        &mut self,
        time_us: i64,
        to_keyframe: bool,
        allow_time_beyond_buffer: bool,
    ) -> Option<usize> {
        self.metadata
            .advance_to(time_us, to_keyframe, allow_time_beyond_buffer)
    }

    pub fn advance_to_end(&mut self) -> usize {
        self.metadata.advance_to_end()
    }

    pub fn set_read_position(&mut self, sample_index: u64) -> bool {
        self.metadata.set_read_position(sample_index)
    }

    pub fn discard_to(&mut self, time_us: i64, to_keyframe: bool, stop_at_read_position: bool) {
        if let Some(position) = self
            .metadata
            .discard_to(time_us, to_keyframe, stop_at_read_position)
        {
            self.data.discard_downstream_to(position);
        }
    }

    pub fn discard_to_read(&mut self) {
        if let Some(position) = self.metadata.discard_to_read() {
            self.data.discard_downstream_to(position);
        }
    }

    pub fn discard_to_end(&mut self) {
        if let Some(position) = self.metadata.discard_to_end() {
            self.data.discard_downstream_to(position);
        }
    }

    /// Read the next format change or sample into `buffer`.
    ///
    /// A sample with a malformed encryption header is consumed and reported
    /// as an error; the following read continues with the next sample.
    pub fn read(
        &mut self,
        buffer: &mut SampleBuffer,
        format_required: bool,
        loading_finished: bool,
    ) -> Result<ReadResult> {
        let (offset, size, time_us, flags, crypto) = match self.metadata.read(
            format_required,
            loading_finished,
            self.downstream_format.as_ref(),
        ) {
            MetadataRead::Nothing => return Ok(ReadResult::NothingRead),
            MetadataRead::Format(format) => {
                self.downstream_format = Some(Arc::clone(&format));
                return Ok(ReadResult::FormatRead(format));
            }
            MetadataRead::EndOfStream => {
                buffer.clear();
                buffer.flags = SampleFlags::END_OF_STREAM;
                return Ok(ReadResult::SampleRead);
            }
            MetadataRead::Sample(record) => (
                record.offset,
                record.size,
                record.time_us,
                record.flags,
                record.crypto.clone(),
            ),
        };

        buffer.clear();
        buffer.time_us = time_us;
        buffer.flags = flags;
        if self.decode_only_until_us.is_some_and(|start| time_us < start) {
            buffer.flags |= SampleFlags::DECODE_ONLY;
        }

        let (mut offset, mut size) = (offset, size);
        if flags.is_encrypted() {
            let (info, header_len) = read_encryption_header(
                &mut self.data,
                self.track_id,
                offset,
                size,
                crypto.as_ref(),
            )
            .inspect_err(|e| tracing::warn!(track = self.track_id, time_us, "{e}"))?;
            offset += header_len as u64;
            size -= header_len;
            buffer.crypto = Some(info);
        }
        self.data.read_to_slice(offset, buffer.payload_mut(size));
        Ok(ReadResult::SampleRead)
    }
}

fn adjust_sample_format(format: &Format, sample_offset_us: i64) -> Format {
    if sample_offset_us == 0 {
        return format.clone();
    }
    format.with_subsample_offset_us(format.subsample_offset_us + sample_offset_us)
}
