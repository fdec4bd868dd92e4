//! A single-period source read front to back by one extractor.
//!
//! The period owns one [`SampleQueue`] per track the extractor registers and
//! loads cooperatively: [`MediaPeriod::continue_loading`] runs a bounded
//! number of extractor steps. Seeks inside the buffered range only move the
//! read positions. Any other seek resets the queues and restarts the
//! extractor at the byte position the seek map gives.
//!
//! The period reports its duration and seekability back to the source over a
//! channel; the source republishes its timeline on the next poll.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use td_buffer::{Allocator, ReadResult, SampleBuffer, SampleQueue};
use td_core::config::{BufferConfig, Config, LoadingConfig};
use td_core::{CryptoData, Error, Format, Manifest, Result, SampleFlags, SourceId};
use td_seek::{ExtractorInput, SeekMap};
use td_timeline::{SingleTimeline, Timeline, Uid};

use crate::data_source::DataSource;
use crate::extractor::{Extractor, ExtractorFactory, ExtractorOutput, ExtractorStep};
use crate::period::{MediaPeriod, PeriodId};
use crate::source::{publish, MediaSource, SourceEventSender};

/// Consecutive transient load failures tolerated before loading stops.
const MAX_LOAD_RETRIES: u32 = 3;

/// Uid of the one period of a progressive source.
pub const PROGRESSIVE_PERIOD_UID: Uid = Uid::Index(0);

/// What a prepared period learned about its stream.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SourceInfo {
    duration_us: Option<i64>,
    is_seekable: bool,
}

pub struct ProgressiveSource {
    id: SourceId,
    data_source: Arc<dyn DataSource>,
    extractor_factory: ExtractorFactory,
    config: Config,
    allocator: Arc<Allocator>,
    manifest: Option<Manifest>,
    listener: Option<SourceEventSender>,
    info_sender: mpsc::UnboundedSender<SourceInfo>,
    info_receiver: mpsc::UnboundedReceiver<SourceInfo>,
    info: Option<SourceInfo>,
}

impl ProgressiveSource {
    pub fn new(
        data_source: Arc<dyn DataSource>,
        extractor_factory: ExtractorFactory,
        config: &Config,
    ) -> Self {
        let allocator = Arc::new(Allocator::from_config(&config.buffer));
        Self::with_allocator(data_source, extractor_factory, config, allocator)
    }

    /// Source whose periods draw blocks from a shared pool.
    pub fn with_allocator(
        data_source: Arc<dyn DataSource>,
        extractor_factory: ExtractorFactory,
        config: &Config,
        allocator: Arc<Allocator>,
    ) -> Self {
        let (info_sender, info_receiver) = mpsc::unbounded_channel();
        Self {
            id: SourceId::new(),
            data_source,
            extractor_factory,
            config: config.clone(),
            allocator,
            manifest: None,
            listener: None,
            info_sender,
            info_receiver,
            info: None,
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    fn timeline(&self) -> Timeline {
        let single = match self.info {
            None => SingleTimeline::placeholder(PROGRESSIVE_PERIOD_UID),
            Some(info) if info.is_seekable => SingleTimeline {
                duration_us: info.duration_us,
                ..SingleTimeline::new(0, PROGRESSIVE_PERIOD_UID)
            },
            Some(info) => SingleTimeline::unseekable(info.duration_us, PROGRESSIVE_PERIOD_UID),
        };
        match &self.manifest {
            Some(manifest) => single.with_manifest(Arc::clone(manifest)).into(),
            None => single.into(),
        }
    }

    fn publish_timeline(&self) {
        publish(
            self.listener.as_ref(),
            Arc::new(self.timeline()),
            self.manifest.clone(),
        );
    }
}

impl MediaSource for ProgressiveSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn prepare(&mut self, listener: SourceEventSender) -> Result<()> {
        tracing::debug!(source = self.data_source.name(), "preparing progressive source");
        self.listener = Some(listener);
        self.publish_timeline();
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        let mut latest = None;
        while let Ok(info) = self.info_receiver.try_recv() {
            latest = Some(info);
        }
        match latest {
            Some(info) if self.info != Some(info) => {
                self.info = Some(info);
                tracing::info!(
                    source = self.data_source.name(),
                    duration_us = ?info.duration_us,
                    seekable = info.is_seekable,
                    "source timeline known"
                );
                self.publish_timeline();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        if id.uid != PROGRESSIVE_PERIOD_UID {
            return Err(Error::not_found("period", &id.uid));
        }
        Ok(Box::new(ProgressivePeriod::new(
            Arc::clone(&self.data_source),
            (self.extractor_factory)(),
            Arc::clone(&self.allocator),
            &self.config,
            self.info_sender.clone(),
        )))
    }

    fn release_period(&mut self, _id: &PeriodId, period: Box<dyn MediaPeriod>) {
        tracing::debug!(source = self.data_source.name(), "releasing period");
        drop(period);
    }

    fn release(&mut self) {
        self.listener = None;
        self.info = None;
        while self.info_receiver.try_recv().is_ok() {}
    }
}

/// Sample queues of the tracks an extractor has registered.
struct TrackSet {
    allocator: Arc<Allocator>,
    buffer_config: BufferConfig,
    queues: Vec<SampleQueue>,
    index_by_id: HashMap<u32, usize>,
    enabled: Vec<bool>,
    seek_map: Option<Arc<dyn SeekMap>>,
    ended: bool,
}

impl TrackSet {
    fn new(allocator: Arc<Allocator>, buffer_config: BufferConfig) -> Self {
        Self {
            allocator,
            buffer_config,
            queues: Vec::new(),
            index_by_id: HashMap::new(),
            enabled: Vec::new(),
            seek_map: None,
            ended: false,
        }
    }

    fn queue(&mut self, track_id: u32) -> Option<&mut SampleQueue> {
        match self.index_by_id.get(&track_id) {
            Some(&index) => Some(&mut self.queues[index]),
            None => {
                tracing::warn!(track_id, "sample data for unregistered track");
                None
            }
        }
    }

    fn enabled_queues(&self) -> impl Iterator<Item = &SampleQueue> {
        self.queues
            .iter()
            .zip(&self.enabled)
            .filter_map(|(queue, &enabled)| enabled.then_some(queue))
    }
}

impl ExtractorOutput for TrackSet {
    fn push_format(&mut self, track_id: u32, format: Format) {
        let index = match self.index_by_id.get(&track_id) {
            Some(&index) => index,
            None if self.ended => {
                tracing::warn!(track_id, "track registered after end of tracks");
                return;
            }
            None => {
                let index = self.queues.len();
                self.queues.push(SampleQueue::with_config(
                    track_id,
                    Arc::clone(&self.allocator),
                    &self.buffer_config,
                ));
                self.enabled.push(false);
                self.index_by_id.insert(track_id, index);
                tracing::debug!(
                    track_id,
                    index,
                    mime = %format.sample_mime_type,
                    "track registered"
                );
                index
            }
        };
        self.queues[index].format(format);
    }

    fn push_data(&mut self, track_id: u32, data: &[u8]) {
        if let Some(queue) = self.queue(track_id) {
            queue.push_data(data);
        }
    }

    fn commit_sample(
        &mut self,
        track_id: u32,
        time_us: i64,
        flags: SampleFlags,
        size: usize,
        crypto: Option<CryptoData>,
    ) {
        if let Some(queue) = self.queue(track_id) {
            queue.commit_sample(time_us, flags, size, crypto);
        }
    }

    fn report_seek_map(&mut self, seek_map: Arc<dyn SeekMap>) {
        tracing::debug!(?seek_map, "seek map reported");
        self.seek_map = Some(seek_map);
    }

    fn end_tracks(&mut self) {
        self.ended = true;
    }
}

/// The period of a [`ProgressiveSource`].
pub struct ProgressivePeriod {
    data_source: Arc<dyn DataSource>,
    extractor: Box<dyn Extractor>,
    input: Option<Box<dyn ExtractorInput + Send>>,
    load_position: u64,
    tracks: TrackSet,
    loading: LoadingConfig,
    info_sender: mpsc::UnboundedSender<SourceInfo>,
    prepared: bool,
    tracks_selected: bool,
    loading_finished: bool,
    last_seek_position_us: i64,
    pending_error: Option<Error>,
    retries: u32,
}

impl ProgressivePeriod {
    fn new(
        data_source: Arc<dyn DataSource>,
        extractor: Box<dyn Extractor>,
        allocator: Arc<Allocator>,
        config: &Config,
        info_sender: mpsc::UnboundedSender<SourceInfo>,
    ) -> Self {
        Self {
            data_source,
            extractor,
            input: None,
            load_position: 0,
            tracks: TrackSet::new(allocator, config.buffer.clone()),
            loading: config.loading.clone(),
            info_sender,
            prepared: false,
            tracks_selected: false,
            loading_finished: false,
            last_seek_position_us: 0,
            pending_error: None,
            retries: 0,
        }
    }

    /// Run one extractor step, opening the input first if needed.
    fn load_step(&mut self) -> Result<()> {
        let mut input = match self.input.take() {
            Some(input) => input,
            None => self.data_source.open(self.load_position)?,
        };
        let step = self.extractor.read(input.as_mut(), &mut self.tracks);
        self.load_position = input.position();
        match step? {
            ExtractorStep::Continue => self.input = Some(input),
            ExtractorStep::Reposition(position) => self.load_position = position,
            ExtractorStep::EndOfInput => {
                tracing::debug!(source = self.data_source.name(), "loading finished");
                self.loading_finished = true;
            }
        }
        Ok(())
    }

    /// Run up to `steps` extractor steps. Returns whether loading made
    /// progress or will retry.
    fn run_load_steps(&mut self, steps: usize) -> bool {
        let mut progressed = false;
        for _ in 0..steps {
            if self.loading_finished || self.pending_error.is_some() {
                break;
            }
            match self.load_step() {
                Ok(()) => {
                    progressed = true;
                    self.retries = 0;
                }
                Err(error) if error.is_retryable() && self.retries < MAX_LOAD_RETRIES => {
                    self.retries += 1;
                    tracing::warn!(
                        source = self.data_source.name(),
                        attempt = self.retries,
                        %error,
                        "load failed; retrying"
                    );
                    self.input = None;
                    return true;
                }
                Err(error) => {
                    tracing::warn!(source = self.data_source.name(), %error, "loading stopped");
                    self.input = None;
                    self.loading_finished = true;
                    self.pending_error = Some(error);
                    break;
                }
            }
            self.maybe_finish_preparation();
        }
        self.maybe_finish_preparation();
        progressed
    }

    fn maybe_finish_preparation(&mut self) {
        if self.prepared {
            return;
        }
        let tracks_known = self.tracks.ended && self.tracks.seek_map.is_some();
        let input_ended = self.loading_finished && self.pending_error.is_none();
        if !tracks_known && !input_ended {
            return;
        }
        self.prepared = true;
        let info = match &self.tracks.seek_map {
            Some(seek_map) => SourceInfo {
                duration_us: seek_map.duration_us(),
                is_seekable: seek_map.is_seekable(),
            },
            None => SourceInfo {
                duration_us: None,
                is_seekable: false,
            },
        };
        tracing::debug!(
            source = self.data_source.name(),
            tracks = self.tracks.queues.len(),
            "period prepared"
        );
        // The source may already be released.
        let _ = self.info_sender.send(info);
    }

    fn is_seekable(&self) -> bool {
        self.tracks
            .seek_map
            .as_ref()
            .is_some_and(|seek_map| seek_map.is_seekable())
    }

    fn seek_inside_buffer(&mut self, position_us: i64) -> bool {
        for (queue, &enabled) in self.tracks.queues.iter_mut().zip(&self.tracks.enabled) {
            if enabled && !queue.seek_to(position_us, false) {
                return false;
            }
        }
        true
    }

    /// Drop everything buffered and restart the extractor for `position_us`.
    fn reset_to(&mut self, position_us: i64) {
        for queue in &mut self.tracks.queues {
            queue.reset(false);
        }
        self.input = None;
        self.loading_finished = false;
        self.pending_error = None;
        self.retries = 0;
        self.load_position = match &self.tracks.seek_map {
            Some(seek_map) => seek_map.seek_point(position_us).position,
            None => 0,
        };
        self.extractor.seek(self.load_position, position_us);
        tracing::debug!(
            source = self.data_source.name(),
            position_us,
            byte_position = self.load_position,
            "reset loading"
        );
    }
}

impl MediaPeriod for ProgressivePeriod {
    fn prepare(&mut self, position_us: i64) -> Result<()> {
        self.last_seek_position_us = position_us;
        while !self.prepared {
            self.run_load_steps(self.loading.read_steps_per_continue);
            if self.prepared {
                break;
            }
            if let Some(error) = self.pending_error.take() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn track_groups(&self) -> Vec<Format> {
        self.tracks
            .queues
            .iter()
            .filter_map(|queue| queue.upstream_format().map(|format| (**format).clone()))
            .collect()
    }

    fn select_tracks(&mut self, enabled: &[bool], position_us: i64) -> i64 {
        assert_eq!(
            enabled.len(),
            self.tracks.queues.len(),
            "one selection flag per track"
        );
        let first_selection = !self.tracks_selected;
        self.tracks_selected = true;
        let mut seek_required = first_selection && position_us != 0;
        for (index, &enable) in enabled.iter().enumerate() {
            let was_enabled = self.tracks.enabled[index];
            if was_enabled && !enable {
                self.tracks.queues[index].discard_to_end();
            }
            if !was_enabled && enable && !first_selection {
                seek_required = true;
            }
            self.tracks.enabled[index] = enable;
        }
        if seek_required {
            self.seek_to(position_us)
        } else {
            position_us
        }
    }

    fn read(
        &mut self,
        track: usize,
        buffer: &mut SampleBuffer,
        format_required: bool,
    ) -> Result<ReadResult> {
        if !self.tracks.enabled[track] {
            return Ok(ReadResult::NothingRead);
        }
        self.tracks.queues[track].read(buffer, format_required, self.loading_finished)
    }

    fn seek_to(&mut self, position_us: i64) -> i64 {
        let position_us = if self.is_seekable() { position_us.max(0) } else { 0 };
        self.last_seek_position_us = position_us;
        for queue in &mut self.tracks.queues {
            queue.set_start_time_us(position_us);
        }
        if !self.seek_inside_buffer(position_us) {
            self.reset_to(position_us);
        }
        position_us
    }

    fn discard_buffer(&mut self, position_us: i64) {
        for (queue, &enabled) in self.tracks.queues.iter_mut().zip(&self.tracks.enabled) {
            if enabled {
                queue.discard_to(position_us, false, true);
            } else {
                queue.discard_to_end();
            }
        }
        self.tracks.allocator.trim();
    }

    fn buffered_position_us(&self) -> Option<i64> {
        if self.loading_finished {
            return None;
        }
        let largest = self
            .tracks
            .enabled_queues()
            .filter_map(SampleQueue::largest_queued_timestamp_us)
            .min();
        Some(largest.unwrap_or(self.last_seek_position_us))
    }

    fn next_load_position_us(&self) -> Option<i64> {
        self.buffered_position_us()
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        if self.loading_finished || self.pending_error.is_some() {
            return false;
        }
        if let Some(buffered_us) = self.buffered_position_us() {
            if self.prepared && buffered_us - position_us >= self.loading.max_buffer_us {
                return false;
            }
        }
        self.run_load_steps(self.loading.read_steps_per_continue)
    }

    fn maybe_throw_error(&mut self) -> Result<()> {
        match self.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any + Send> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_core::TrackType;

    fn track_set() -> TrackSet {
        TrackSet::new(Arc::new(Allocator::new(256)), BufferConfig::default())
    }

    #[test]
    fn first_format_registers_track() {
        let mut tracks = track_set();
        tracks.push_format(7, Format::new("audio/test", TrackType::Audio));
        tracks.push_format(3, Format::new("video/test", TrackType::Video));
        tracks.push_format(7, Format::new("audio/test2", TrackType::Audio));
        assert_eq!(tracks.queues.len(), 2);
        assert_eq!(tracks.index_by_id[&3], 1);
        assert_eq!(
            tracks.queues[0].upstream_format().unwrap().sample_mime_type,
            "audio/test2"
        );
    }

    #[test]
    fn tracks_after_end_are_ignored() {
        let mut tracks = track_set();
        tracks.push_format(1, Format::new("audio/test", TrackType::Audio));
        tracks.end_tracks();
        tracks.push_format(2, Format::new("video/test", TrackType::Video));
        tracks.push_data(2, &[1, 2, 3]);
        assert_eq!(tracks.queues.len(), 1);
    }

    #[test]
    fn samples_land_in_their_track() {
        let mut tracks = track_set();
        tracks.push_format(1, Format::new("audio/test", TrackType::Audio));
        tracks.push_data(1, &[9; 10]);
        tracks.commit_sample(1, 0, SampleFlags::KEY_FRAME, 10, None);
        tracks.enabled[0] = true;
        assert_eq!(tracks.enabled_queues().count(), 1);
        assert_eq!(tracks.queues[0].largest_queued_timestamp_us(), Some(0));
        assert_eq!(tracks.queues[0].retained_bytes(), 10);
    }
}
