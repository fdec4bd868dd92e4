//! Shared fixtures for td-source integration tests.
//!
//! Streams use a fixed record layout: every record is 16 bytes
//! `[0xA5, track, flags, 0, time_us: i64 BE, payload: [u8; 4]]`. Tracks are
//! interleaved one record each per frame, and every `key_interval`-th frame
//! is a keyframe.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use td_buffer::{ReadResult, SampleBuffer};
use td_core::config::Config;
use td_core::{Error, Format, Result, SampleFlags, SourceId, TrackType};
use td_seek::{ExtractorInput, SeekMap, SeekPoint, Unseekable};
use td_source::{
    BytesDataSource, DataSource, Extractor, ExtractorFactory, ExtractorOutput, ExtractorStep,
    MediaPeriod, MediaSource, PeriodId, ProgressiveSource, SourceEvent, SourceEventReceiver,
    SourceEventSender,
};
use td_timeline::SharedTimeline;

pub const RECORD_LEN: u64 = 16;
const SYNC: u8 = 0xA5;

#[derive(Debug, Clone)]
pub struct TestStream {
    pub frames: u64,
    pub tracks: u8,
    pub frame_us: i64,
    pub key_interval: u64,
    pub seekable: bool,
    /// Frame whose first record carries a bad sync byte.
    pub corrupt_frame: Option<u64>,
}

impl TestStream {
    pub fn new(frames: u64) -> Self {
        Self {
            frames,
            tracks: 1,
            frame_us: 10_000,
            key_interval: 10,
            seekable: true,
            corrupt_frame: None,
        }
    }

    pub fn tracks(mut self, tracks: u8) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn unseekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    pub fn corrupt_at(mut self, frame: u64) -> Self {
        self.corrupt_frame = Some(frame);
        self
    }

    pub fn duration_us(&self) -> i64 {
        self.frames as i64 * self.frame_us
    }

    pub fn bytes(&self) -> Bytes {
        let capacity = self.frames * self.tracks as u64 * RECORD_LEN;
        let mut out = BytesMut::with_capacity(capacity as usize);
        for frame in 0..self.frames {
            let flags = if frame % self.key_interval == 0 {
                SampleFlags::KEY_FRAME.bits() as u8
            } else {
                0
            };
            for track in 0..self.tracks {
                let sync = if self.corrupt_frame == Some(frame) && track == 0 {
                    0x00
                } else {
                    SYNC
                };
                out.put_u8(sync);
                out.put_u8(track);
                out.put_u8(flags);
                out.put_u8(0);
                out.put_i64(frame as i64 * self.frame_us);
                out.put_u32(frame as u32);
            }
        }
        out.freeze()
    }

    fn seek_map(&self) -> Arc<dyn SeekMap> {
        if self.seekable {
            Arc::new(RecordSeekMap {
                duration_us: self.duration_us(),
                frame_us: self.frame_us,
                key_interval: self.key_interval,
                frame_len: self.tracks as u64 * RECORD_LEN,
            })
        } else {
            Arc::new(Unseekable::new(Some(self.duration_us()), 0))
        }
    }

    pub fn extractor_factory(&self) -> ExtractorFactory {
        let stream = self.clone();
        Arc::new(move || Box::new(RecordExtractor::new(stream.clone())) as Box<dyn Extractor>)
    }

    pub fn data_source(&self, name: &str) -> Arc<dyn DataSource> {
        Arc::new(BytesDataSource::new(name, self.bytes()))
    }

    pub fn source(&self, config: &Config) -> ProgressiveSource {
        ProgressiveSource::new(self.data_source("test"), self.extractor_factory(), config)
    }

    pub fn boxed(&self) -> Box<dyn MediaSource> {
        Box::new(self.source(&Config::default()))
    }
}

#[derive(Debug)]
struct RecordSeekMap {
    duration_us: i64,
    frame_us: i64,
    key_interval: u64,
    frame_len: u64,
}

impl SeekMap for RecordSeekMap {
    fn is_seekable(&self) -> bool {
        true
    }

    fn duration_us(&self) -> Option<i64> {
        Some(self.duration_us)
    }

    fn seek_point(&self, time_us: i64) -> SeekPoint {
        let frame = (time_us.max(0) / self.frame_us) as u64;
        let key_frame = frame / self.key_interval * self.key_interval;
        SeekPoint {
            time_us: key_frame as i64 * self.frame_us,
            position: key_frame * self.frame_len,
        }
    }
}

pub struct RecordExtractor {
    stream: TestStream,
    tracks_reported: bool,
}

impl RecordExtractor {
    fn new(stream: TestStream) -> Self {
        Self {
            stream,
            tracks_reported: false,
        }
    }
}

impl Extractor for RecordExtractor {
    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> Result<ExtractorStep> {
        if !self.tracks_reported {
            for track in 0..self.stream.tracks {
                let track_type = if track == 0 { TrackType::Audio } else { TrackType::Video };
                let format = Format::new(format!("test/track{track}"), track_type);
                output.push_format(track as u32, format);
            }
            output.report_seek_map(self.stream.seek_map());
            output.end_tracks();
            self.tracks_reported = true;
            return Ok(ExtractorStep::Continue);
        }
        let mut record = [0u8; RECORD_LEN as usize];
        if !input.read_fully(&mut record)? {
            return Ok(ExtractorStep::EndOfInput);
        }
        let track = record[1] as u32;
        if record[0] != SYNC {
            return Err(Error::malformed(track, "bad record sync"));
        }
        let flags = SampleFlags::from_bits_truncate(record[2] as u32);
        let mut time = [0u8; 8];
        time.copy_from_slice(&record[4..12]);
        output.push_data(track, &record[12..16]);
        output.commit_sample(track, i64::from_be_bytes(time), flags, 4, None);
        Ok(ExtractorStep::Continue)
    }

    fn seek(&mut self, _position: u64, _time_us: i64) {}
}

/// Data source whose first `failures` opens fail with a load error.
pub struct FlakyDataSource {
    inner: BytesDataSource,
    failures: AtomicU32,
    pub opens: AtomicU32,
}

impl FlakyDataSource {
    pub fn new(data: Bytes, failures: u32) -> Self {
        Self {
            inner: BytesDataSource::new("flaky", data),
            failures: AtomicU32::new(failures),
            opens: AtomicU32::new(0),
        }
    }
}

impl DataSource for FlakyDataSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&self, position: u64) -> Result<Box<dyn ExtractorInput + Send>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::load(self.name(), "connection reset"));
        }
        self.inner.open(position)
    }
}

/// A source that never publishes a timeline.
pub struct SilentSource {
    id: SourceId,
}

impl SilentSource {
    pub fn boxed() -> Box<dyn MediaSource> {
        Box::new(Self { id: SourceId::new() })
    }
}

impl MediaSource for SilentSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn prepare(&mut self, _listener: SourceEventSender) -> Result<()> {
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        Err(Error::not_found("period", &id.uid))
    }

    fn release_period(&mut self, _id: &PeriodId, _period: Box<dyn MediaPeriod>) {}

    fn release(&mut self) {}
}

/// A source that stays silent until its gate opens, then prepares `inner`.
pub struct GatedSource {
    inner: ProgressiveSource,
    gate: Arc<AtomicBool>,
    listener: Option<SourceEventSender>,
    started: bool,
}

impl GatedSource {
    pub fn new(stream: &TestStream) -> (Self, Arc<AtomicBool>) {
        let gate = Arc::new(AtomicBool::new(false));
        let source = Self {
            inner: stream.source(&Config::default()),
            gate: Arc::clone(&gate),
            listener: None,
            started: false,
        };
        (source, gate)
    }
}

impl MediaSource for GatedSource {
    fn id(&self) -> SourceId {
        self.inner.id()
    }

    fn prepare(&mut self, listener: SourceEventSender) -> Result<()> {
        self.listener = Some(listener);
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        if self.started {
            return self.inner.poll();
        }
        let Some(listener) = self.listener.clone() else {
            return Ok(false);
        };
        if !self.gate.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.started = true;
        self.inner.prepare(listener)?;
        Ok(true)
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        self.inner.create_period(id)
    }

    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>) {
        self.inner.release_period(id, period);
    }

    fn release(&mut self) {
        self.inner.release();
        self.listener = None;
        self.started = false;
    }
}

/// Latest timeline sent on `receiver`.
pub fn latest_timeline(receiver: &mut SourceEventReceiver) -> Option<SharedTimeline> {
    let mut latest = None;
    while let Ok(SourceEvent::TimelineRefreshed { timeline, .. }) = receiver.try_recv() {
        latest = Some(timeline);
    }
    latest
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSample {
    pub time_us: i64,
    pub key_frame: bool,
    pub decode_only: bool,
}

/// Prepare `period`, enable every track, and start at `position_us`.
pub fn start(period: &mut dyn MediaPeriod, position_us: i64) -> i64 {
    period.prepare(position_us).unwrap();
    let enabled = vec![true; period.track_groups().len()];
    period.select_tracks(&enabled, position_us)
}

/// Read `track` to end of stream, loading as needed.
pub fn read_track(period: &mut dyn MediaPeriod, track: usize) -> Vec<ReadSample> {
    let mut buffer = SampleBuffer::new();
    let mut samples: Vec<ReadSample> = Vec::new();
    for _ in 0..1_000_000 {
        match period.read(track, &mut buffer, false).unwrap() {
            ReadResult::SampleRead if buffer.is_end_of_stream() => return samples,
            ReadResult::SampleRead => samples.push(ReadSample {
                time_us: buffer.time_us,
                key_frame: buffer.is_key_frame(),
                decode_only: buffer.is_decode_only(),
            }),
            ReadResult::FormatRead(_) => {}
            ReadResult::NothingRead => {
                let position_us = samples.last().map_or(0, |s| s.time_us);
                if !period.continue_loading(position_us) {
                    assert!(period.next_load_position_us().is_none(), "loading stalled");
                }
            }
        }
    }
    panic!("track {track} did not reach end of stream");
}

/// Load until the period reports nothing further to load.
pub fn load_to_end(period: &mut dyn MediaPeriod) {
    while period.continue_loading(0) {}
}
