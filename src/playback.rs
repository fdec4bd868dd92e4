//! Drives a [`MediaSource`] the way a player would and reports what it read.
//!
//! The session prepares the source, then walks the timeline one period at a
//! time: create, prepare, select every track, read all tracks round-robin
//! (loading whenever nothing is buffered), discard behind the read position,
//! release. The source is polled after each step that can change its
//! timeline, and the next period is looked up by uid in the refreshed
//! timeline so that composition changes are followed.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use td_buffer::{ReadResult, SampleBuffer};
use td_core::{ErrorCategory, SessionId};
use td_source::{MediaPeriod, MediaSource, PeriodId, SourceEvent, SourceEventReceiver};
use td_timeline::{RepeatMode, SharedTimeline, Timeline};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub repeat_mode: RepeatMode,
    /// Position in the first window to start from.
    pub start_position_us: i64,
    /// Stop after this many periods, which bounds infinite timelines.
    pub max_periods: usize,
    /// Consecutive rounds without progress before playback gives up.
    pub stall_limit: u32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            repeat_mode: RepeatMode::Off,
            start_position_us: 0,
            max_periods: 1000,
            stall_limit: 64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackReport {
    pub mime_type: Option<String>,
    pub samples: u64,
    pub bytes: u64,
    pub decode_only: u64,
    pub first_time_us: Option<i64>,
    pub last_time_us: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodReport {
    pub index: usize,
    pub uid: String,
    pub window_index: usize,
    pub duration_us: Option<i64>,
    pub start_position_us: i64,
    pub tracks: Vec<TrackReport>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackReport {
    pub session_id: SessionId,
    pub periods: Vec<PeriodReport>,
    pub timeline_refreshes: u32,
    /// Stream errors that ended a track early without stopping playback.
    pub recovered_errors: Vec<String>,
    /// True when playback stopped at `max_periods`.
    pub truncated: bool,
}

impl PlaybackReport {
    pub fn total_samples(&self) -> u64 {
        self.tracks().map(|track| track.samples).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.tracks().map(|track| track.bytes).sum()
    }

    fn tracks(&self) -> impl Iterator<Item = &TrackReport> {
        self.periods.iter().flat_map(|period| period.tracks.iter())
    }
}

pub struct PlaybackSession {
    source: Box<dyn MediaSource>,
    options: PlaybackOptions,
    receiver: Option<SourceEventReceiver>,
    timeline: SharedTimeline,
    report: PlaybackReport,
    sequence: u64,
}

impl PlaybackSession {
    pub fn new(source: Box<dyn MediaSource>, options: PlaybackOptions) -> Self {
        Self {
            source,
            options,
            receiver: None,
            timeline: Arc::new(Timeline::empty()),
            report: PlaybackReport {
                session_id: SessionId::new(),
                ..PlaybackReport::default()
            },
            sequence: 0,
        }
    }

    /// Latest timeline the source published.
    pub fn timeline(&self) -> &SharedTimeline {
        &self.timeline
    }

    pub fn id(&self) -> SessionId {
        self.report.session_id
    }

    /// Play every period in timeline order and release the source.
    pub fn run(mut self) -> Result<PlaybackReport> {
        let span = tracing::info_span!("playback", session = %self.report.session_id);
        let _guard = span.enter();
        let result = self.play_all();
        self.source.release();
        result.map(|()| self.report)
    }

    fn play_all(&mut self) -> Result<()> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.receiver = Some(receiver);
        self.source
            .prepare(sender)
            .context("failed to prepare source")?;
        self.drain_timelines();

        if self.timeline.is_empty() {
            tracing::info!("timeline is empty; nothing to play");
            return Ok(());
        }
        let Some(first_window) = self.timeline.first_window_index() else {
            return Ok(());
        };
        let (mut index, mut position_us) = self
            .timeline
            .period_position(first_window, Some(self.options.start_position_us));

        loop {
            if self.report.periods.len() >= self.options.max_periods {
                tracing::info!(periods = self.report.periods.len(), "period limit reached");
                self.report.truncated = true;
                return Ok(());
            }
            let uid = self.timeline.uid_of_period(index);
            self.play_period(index, position_us)?;

            index = self
                .timeline
                .index_of_period(&uid)
                .with_context(|| format!("period {uid} vanished from the timeline"))?;
            match self.timeline.next_period_index(index, self.options.repeat_mode) {
                Some(next) => {
                    index = next;
                    position_us = 0;
                }
                None => return Ok(()),
            }
        }
    }

    fn play_period(&mut self, index: usize, start_position_us: i64) -> Result<()> {
        let uid = self.timeline.uid_of_period(index);
        let id = PeriodId {
            uid: uid.clone(),
            window_sequence_number: self.sequence,
        };
        self.sequence += 1;
        tracing::info!(period = %uid, index, start_position_us, "starting period");

        let mut period = self
            .source
            .create_period(&id)
            .with_context(|| format!("failed to create period {uid}"))?;
        let outcome = self.drive_period(period.as_mut(), start_position_us);
        if outcome.is_ok() {
            self.record_stream_error(period.as_mut());
        }
        self.source.release_period(&id, period);
        let tracks = outcome.with_context(|| format!("playback of period {uid} failed"))?;
        self.refresh()?;

        let period_index = self.timeline.index_of_period(&uid).unwrap_or(index);
        let info = self.timeline.period(period_index);
        self.report.periods.push(PeriodReport {
            index: period_index,
            uid: uid.to_string(),
            window_index: info.window_index,
            duration_us: info.duration_us,
            start_position_us,
            tracks,
        });
        Ok(())
    }

    fn drive_period(
        &mut self,
        period: &mut dyn MediaPeriod,
        position_us: i64,
    ) -> Result<Vec<TrackReport>> {
        period.prepare(position_us)?;
        // Preparation is what tells a progressive source its duration.
        self.refresh()?;
        let mut waits = 0;
        while !period.is_prepared() {
            period.maybe_throw_error()?;
            if !period.continue_loading(position_us) {
                waits += 1;
                if waits >= self.options.stall_limit {
                    bail!("period not prepared after {waits} rounds");
                }
            }
            self.refresh()?;
        }

        let track_count = period.track_groups().len();
        let position_us = period.select_tracks(&vec![true; track_count], position_us);
        let mut tracks = vec![TrackReport::default(); track_count];
        let mut ended = vec![false; track_count];
        let mut read_position_us = position_us;
        let mut buffer = SampleBuffer::new();
        let mut stalls = 0;

        while ended.iter().any(|ended| !ended) {
            let mut progressed = false;
            for track in 0..track_count {
                if ended[track] {
                    continue;
                }
                let report = &mut tracks[track];
                match period.read(track, &mut buffer, false) {
                    Ok(ReadResult::SampleRead) if buffer.is_end_of_stream() => {
                        ended[track] = true;
                        progressed = true;
                    }
                    Ok(ReadResult::SampleRead) => {
                        report.samples += 1;
                        report.bytes += buffer.data.len() as u64;
                        if buffer.is_decode_only() {
                            report.decode_only += 1;
                        }
                        report.first_time_us.get_or_insert(buffer.time_us);
                        report.last_time_us = Some(buffer.time_us);
                        progressed = true;
                    }
                    Ok(ReadResult::FormatRead(format)) => {
                        report.mime_type = Some(format.sample_mime_type.clone());
                        progressed = true;
                    }
                    Ok(ReadResult::NothingRead) => {}
                    Err(err) if err.category() == ErrorCategory::MalformedStream => {
                        tracing::warn!(track, %err, "stream error while reading");
                        self.report.recovered_errors.push(err.to_string());
                        progressed = true;
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            read_position_us = tracks
                .iter()
                .zip(&ended)
                .filter(|(_, ended)| !**ended)
                .filter_map(|(report, _)| report.last_time_us)
                .min()
                .unwrap_or(read_position_us)
                .max(read_position_us);
            period.discard_buffer(read_position_us);

            if progressed {
                stalls = 0;
                continue;
            }
            if period.continue_loading(read_position_us) {
                continue;
            }
            if let Err(err) = period.maybe_throw_error() {
                if err.category() != ErrorCategory::MalformedStream {
                    return Err(err.into());
                }
                tracing::warn!(%err, "track ended by a stream error");
                self.report.recovered_errors.push(err.to_string());
            }
            stalls += 1;
            if stalls >= self.options.stall_limit {
                bail!(
                    "no progress after {stalls} rounds at {read_position_us}us (next load at {:?})",
                    period.next_load_position_us()
                );
            }
        }
        Ok(tracks)
    }

    fn record_stream_error(&mut self, period: &mut dyn MediaPeriod) {
        if let Err(err) = period.maybe_throw_error() {
            tracing::warn!(%err, "period ended with a stream error");
            self.report.recovered_errors.push(err.to_string());
        }
    }

    /// Pump the source and take any timeline it published.
    fn refresh(&mut self) -> Result<()> {
        self.source
            .poll()
            .context("source rejected its refreshed children")?;
        self.drain_timelines();
        Ok(())
    }

    fn drain_timelines(&mut self) {
        let Some(receiver) = self.receiver.as_mut() else {
            return;
        };
        while let Ok(SourceEvent::TimelineRefreshed { timeline, .. }) = receiver.try_recv() {
            self.timeline = timeline;
            self.report.timeline_refreshes += 1;
        }
    }
}
