//! End-to-end playback of composed synthetic sources.

use std::sync::Arc;

use td_core::config::Config;
use td_core::{ClippingFailure, Error, SourceId};
use td_source::{
    BytesDataSource, ConcatenatingSource, MediaPeriod, MediaSource, PeriodId, ProgressiveSource,
    SourceEventSender,
};
use td_timeline::RepeatMode;

use tapedeck::playback::{PlaybackOptions, PlaybackReport, PlaybackSession};
use tapedeck::playlist::{PlaylistSpec, Repeat, SourceSpec};
use tapedeck::synthetic::{self, SyntheticStream, MIME_TYPE};

const FRAME_US: i64 = 23_220;

fn play(spec: &PlaylistSpec, options: PlaybackOptions) -> anyhow::Result<PlaybackReport> {
    let source = spec.build(&Config::default())?;
    PlaybackSession::new(source, options).run()
}

/// Ignores its first `silent_polls` polls, then prepares `inner`.
struct LateSource {
    inner: Box<dyn MediaSource>,
    silent_polls: u32,
    listener: Option<SourceEventSender>,
}

impl MediaSource for LateSource {
    fn id(&self) -> SourceId {
        self.inner.id()
    }

    fn prepare(&mut self, listener: SourceEventSender) -> td_core::Result<()> {
        self.listener = Some(listener);
        Ok(())
    }

    fn poll(&mut self) -> td_core::Result<bool> {
        if self.silent_polls > 0 {
            self.silent_polls -= 1;
            if self.silent_polls == 0 {
                if let Some(listener) = self.listener.clone() {
                    self.inner.prepare(listener)?;
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        self.inner.poll()
    }

    fn create_period(&mut self, id: &PeriodId) -> td_core::Result<Box<dyn MediaPeriod>> {
        self.inner.create_period(id)
    }

    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>) {
        self.inner.release_period(id, period);
    }

    fn release(&mut self) {
        self.inner.release();
        self.listener = None;
    }
}

fn payload_bytes(stream: &SyntheticStream, frames: std::ops::Range<usize>) -> u64 {
    stream.payload_sizes()[frames].iter().map(|&s| s as u64).sum()
}

#[test]
fn concatenated_sources_play_in_order() {
    let spec = PlaylistSpec::new(vec![
        SourceSpec::new(50),
        SourceSpec::new(30),
        SourceSpec::new(20),
    ]);
    let streams = spec.streams();
    let report = play(&spec, PlaybackOptions::default()).unwrap();

    assert_eq!(report.periods.len(), 3);
    assert!(!report.truncated);
    assert!(report.recovered_errors.is_empty());
    assert!(report.timeline_refreshes >= 4);
    for (index, (period, stream)) in report.periods.iter().zip(&streams).enumerate() {
        let frames = stream.frames as usize;
        assert_eq!(period.index, index);
        assert_eq!(period.window_index, index);
        assert_eq!(period.duration_us, Some(stream.duration_us()));
        assert_eq!(period.tracks.len(), 1);

        let track = &period.tracks[0];
        assert_eq!(track.mime_type.as_deref(), Some(MIME_TYPE));
        assert_eq!(track.samples, frames as u64);
        assert_eq!(track.decode_only, 0);
        assert_eq!(track.first_time_us, Some(0));
        assert_eq!(track.last_time_us, Some((frames as i64 - 1) * FRAME_US));
        assert_eq!(track.bytes, payload_bytes(stream, 0..frames));
    }
    assert_eq!(report.total_samples(), 100);
}

#[test]
fn clipped_source_in_looped_playlist() {
    let spec = PlaylistSpec::new(vec![
        SourceSpec::new(40),
        SourceSpec::new(100).clipped(1_000_000, Some(2_000_000)),
        SourceSpec::new(30),
    ])
    .repeat(Repeat::Times(2));
    let report = play(&spec, PlaybackOptions::default()).unwrap();

    assert_eq!(report.periods.len(), 6);
    let samples: Vec<u64> = report.periods.iter().map(|p| p.tracks[0].samples).collect();
    // Frames 43..=86 of the clipped stream: 43 * 23_220 <= 1s < 44 * 23_220 and
    // 86 * 23_220 < 2s <= 87 * 23_220.
    assert_eq!(samples, vec![40, 44, 30, 40, 44, 30]);

    for clipped in [&report.periods[1], &report.periods[4]] {
        assert_eq!(clipped.duration_us, Some(1_000_000));
        let track = &clipped.tracks[0];
        assert_eq!(track.decode_only, 1);
        assert_eq!(track.first_time_us, Some(43 * FRAME_US - 1_000_000));
        assert_eq!(track.last_time_us, Some(86 * FRAME_US - 1_000_000));
    }
    let indices: Vec<usize> = report.periods.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn start_position_inside_buffer() {
    let spec = PlaylistSpec::new(vec![SourceSpec::new(100)]);
    let options = PlaybackOptions {
        start_position_us: 1_000_000,
        ..PlaybackOptions::default()
    };
    let report = play(&spec, options).unwrap();

    let period = &report.periods[0];
    assert_eq!(period.start_position_us, 1_000_000);
    let track = &period.tracks[0];
    assert_eq!(track.samples, 57);
    assert_eq!(track.decode_only, 1);
    assert_eq!(track.first_time_us, Some(43 * FRAME_US));
    assert_eq!(track.last_time_us, Some(99 * FRAME_US));
}

#[test]
fn start_position_beyond_buffer_uses_binary_search() {
    let spec = PlaylistSpec::new(vec![SourceSpec::new(400)]);
    let options = PlaybackOptions {
        start_position_us: 8_000_000,
        ..PlaybackOptions::default()
    };
    let report = play(&spec, options).unwrap();

    let track = &report.periods[0].tracks[0];
    assert_eq!(track.first_time_us, Some(344 * FRAME_US));
    assert_eq!(track.samples, 56);
    assert_eq!(track.decode_only, 1);
    let stream = &spec.streams()[0];
    assert_eq!(track.bytes, payload_bytes(stream, 344..400));
}

#[test]
fn repeat_one_stops_at_period_limit() {
    let spec = PlaylistSpec::new(vec![SourceSpec::new(10), SourceSpec::new(10)]);
    let options = PlaybackOptions {
        repeat_mode: RepeatMode::One,
        max_periods: 3,
        ..PlaybackOptions::default()
    };
    let report = play(&spec, options).unwrap();

    assert!(report.truncated);
    assert_eq!(report.periods.len(), 3);
    assert!(report.periods.iter().all(|p| p.index == 0));
    assert!(report.periods.iter().all(|p| p.tracks[0].samples == 10));
}

#[test]
fn infinite_loop_is_bounded_by_period_limit() {
    let spec = PlaylistSpec::new(vec![SourceSpec::new(5)]).repeat(Repeat::Forever);
    let options = PlaybackOptions {
        max_periods: 4,
        ..PlaybackOptions::default()
    };
    let report = play(&spec, options).unwrap();
    assert!(report.truncated);
    assert_eq!(report.total_samples(), 20);
}

#[test]
fn clip_end_past_stream_end_fails_playback() {
    let spec = PlaylistSpec::new(vec![SourceSpec::new(10).clipped(0, Some(5_000_000))]);
    let err = play(&spec, PlaybackOptions::default()).unwrap_err();
    let rejected = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<Error>(),
            Some(Error::IllegalClipping(ClippingFailure::EndExceedsDuration))
        )
    });
    assert!(rejected, "unexpected error: {err:#}");
}

#[test]
fn truncated_stream_ends_track_and_reports_error() {
    let config = Config::default();
    let data = SyntheticStream::with_frames(10).encode();
    let data = data.slice(..data.len() - 5);
    let source = ProgressiveSource::new(
        Arc::new(BytesDataSource::new("cut", data)),
        synthetic::factory(&config.seek),
        &config,
    );
    let report = PlaybackSession::new(Box::new(source), PlaybackOptions::default())
        .run()
        .unwrap();

    assert_eq!(report.periods.len(), 1);
    assert_eq!(report.periods[0].tracks[0].samples, 9);
    assert_eq!(report.recovered_errors.len(), 1);
    assert!(report.recovered_errors[0].contains("truncated"));
}

#[test]
fn source_reporting_after_period_creation_still_plays() {
    let config = Config::default();
    let stream = SyntheticStream::with_frames(30);
    let progressive = ProgressiveSource::new(
        Arc::new(BytesDataSource::new("late", stream.encode())),
        synthetic::factory(&config.seek),
        &config,
    );
    let late = LateSource {
        inner: Box::new(progressive),
        silent_polls: 4,
        listener: None,
    };
    let playlist = ConcatenatingSource::with_sources(vec![Box::new(late) as Box<dyn MediaSource>]);
    let report = PlaybackSession::new(Box::new(playlist), PlaybackOptions::default())
        .run()
        .unwrap();

    assert_eq!(report.periods.len(), 1);
    let period = &report.periods[0];
    assert_eq!(period.duration_us, Some(stream.duration_us()));
    assert_eq!(period.tracks[0].samples, 30);
    assert_eq!(period.tracks[0].first_time_us, Some(0));
    assert!(report.recovered_errors.is_empty());
}
