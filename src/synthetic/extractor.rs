//! Extractor for the synthetic stream, seeking by binary search.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use td_core::config::SeekConfig;
use td_core::{Error, Format, Result, SampleFlags, TrackType};
use td_seek::{
    BinarySearchSeekMap, BinarySearchSeeker, BytesInput, ExtractorInput, FrameParser,
    FrameScanSeeker, SeekMap, SeekStep, Unseekable,
};
use td_source::{Extractor, ExtractorFactory, ExtractorOutput, ExtractorStep};

use super::{SyncFrameParser, StreamHeader, FRAME_HEADER_LEN, MIME_TYPE, STREAM_HEADER_LEN};

const TRACK_ID: u32 = 0;
const MAX_REPOSITIONS: u32 = 1024;

type Seeker = BinarySearchSeeker<FrameScanSeeker<SyncFrameParser>>;

/// Bisection bounds covering every frame of a stream of `length` bytes.
fn seek_bounds(header: StreamHeader, length: u64) -> BinarySearchSeekMap {
    let frames = (header.duration_us / header.frame_us as i64).max(1) as u64;
    let approx_bytes_per_frame = length.saturating_sub(STREAM_HEADER_LEN as u64) / frames;
    BinarySearchSeekMap::new(
        header.duration_us,
        STREAM_HEADER_LEN as u64,
        length,
        approx_bytes_per_frame,
    )
}

/// `read_fully` that reports a stream ending part way through a structure as
/// malformed rather than as a retryable I/O failure.
fn read_structure(input: &mut dyn ExtractorInput, buf: &mut [u8], what: &str) -> Result<bool> {
    match input.read_fully(buf) {
        Err(Error::Io { source }) if source.kind() == std::io::ErrorKind::UnexpectedEof => Err(
            Error::malformed(TRACK_ID, format!("truncated {what} at byte {}", input.position())),
        ),
        other => other,
    }
}

pub struct SyntheticExtractor {
    seek_config: SeekConfig,
    header: Option<StreamHeader>,
    seeker: Option<Seeker>,
    frame_header: [u8; FRAME_HEADER_LEN],
    payload: Vec<u8>,
}

impl SyntheticExtractor {
    pub fn new(seek_config: &SeekConfig) -> Self {
        Self {
            seek_config: seek_config.clone(),
            header: None,
            seeker: None,
            frame_header: [0; FRAME_HEADER_LEN],
            payload: Vec::new(),
        }
    }

    fn read_stream_header(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> Result<ExtractorStep> {
        if input.position() != 0 {
            return Ok(ExtractorStep::Reposition(0));
        }
        let mut bytes = [0u8; STREAM_HEADER_LEN];
        if !read_structure(input, &mut bytes, "stream header")? {
            return Err(Error::malformed(TRACK_ID, "empty stream"));
        }
        let header = StreamHeader::parse(&bytes)
            .ok_or_else(|| Error::malformed(TRACK_ID, "missing stream header"))?;

        let mut format = Format::new(MIME_TYPE, TrackType::Audio);
        format.id = Some(TRACK_ID.to_string());
        format.max_input_size = Some(FRAME_HEADER_LEN as u32 + 4096);
        output.push_format(TRACK_ID, format);

        let seek_map: Arc<dyn SeekMap> = match input.length() {
            Some(length) if header.duration_us > 0 => {
                let bounds = seek_bounds(header, length);
                self.seeker = Some(BinarySearchSeeker::new(
                    FrameScanSeeker::new(SyncFrameParser, &self.seek_config),
                    bounds,
                    &self.seek_config,
                ));
                Arc::new(bounds)
            }
            _ => Arc::new(Unseekable::new(
                Some(header.duration_us),
                STREAM_HEADER_LEN as u64,
            )),
        };
        output.report_seek_map(seek_map);
        output.end_tracks();
        tracing::debug!(
            frame_us = header.frame_us,
            duration_us = header.duration_us,
            seekable = self.seeker.is_some(),
            "synthetic stream header parsed"
        );
        self.header = Some(header);
        Ok(ExtractorStep::Continue)
    }

    fn read_frame(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> Result<ExtractorStep> {
        let position = input.position();
        if !read_structure(input, &mut self.frame_header, "frame header")? {
            return Ok(ExtractorStep::EndOfInput);
        }
        let frame = SyncFrameParser.parse(&self.frame_header).ok_or_else(|| {
            Error::malformed(TRACK_ID, format!("invalid frame header at byte {position}"))
        })?;

        let payload_len = frame.size as usize - FRAME_HEADER_LEN;
        self.payload.resize(payload_len, 0);
        if !read_structure(input, &mut self.payload, "frame payload")? && payload_len > 0 {
            return Err(Error::malformed(
                TRACK_ID,
                format!("frame at byte {position} has no payload"),
            ));
        }

        let key_frame = SampleFlags::KEY_FRAME.bits() as u8;
        let flags = if SyncFrameParser::flags(&self.frame_header) & key_frame != 0 {
            SampleFlags::KEY_FRAME
        } else {
            SampleFlags::empty()
        };
        output.push_data(TRACK_ID, &self.payload);
        output.commit_sample(TRACK_ID, frame.timestamp_us, flags, payload_len, None);
        Ok(ExtractorStep::Continue)
    }
}

impl Extractor for SyntheticExtractor {
    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> Result<ExtractorStep> {
        if self.header.is_none() {
            return self.read_stream_header(input, output);
        }
        if let Some(seeker) = self.seeker.as_mut().filter(|seeker| seeker.is_seeking()) {
            match seeker.handle_pending_seek(input)? {
                SeekStep::Reposition(position) => return Ok(ExtractorStep::Reposition(position)),
                SeekStep::Resolved {
                    byte_position,
                    found,
                } => {
                    tracing::debug!(
                        byte_position,
                        found,
                        probes = seeker.probe_count(),
                        "seek resolved"
                    );
                }
            }
        }
        self.read_frame(input, output)
    }

    fn seek(&mut self, _position: u64, time_us: i64) {
        match self.seeker.as_mut() {
            Some(seeker) if time_us > 0 => seeker.set_seek_target_us(time_us),
            Some(seeker) => seeker.cancel(),
            None => {}
        }
    }
}

/// Factory handing each period its own [`SyntheticExtractor`].
pub fn factory(seek_config: &SeekConfig) -> ExtractorFactory {
    let seek_config = seek_config.clone();
    Arc::new(move || Box::new(SyntheticExtractor::new(&seek_config)) as Box<dyn Extractor>)
}

/// Outcome of [`resolve_seek`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeekResolution {
    pub target_us: i64,
    pub byte_position: u64,
    pub found: bool,
    /// Timestamp of the frame the search landed on.
    pub frame_time_us: Option<i64>,
    pub probes: u32,
    pub repositions: u32,
}

/// Run a complete binary search for `target_us` over an encoded stream,
/// reopening the input whenever the search asks to.
pub fn resolve_seek(
    data: &Bytes,
    target_us: i64,
    seek_config: &SeekConfig,
) -> Result<SeekResolution> {
    let header = StreamHeader::parse(data)
        .ok_or_else(|| Error::malformed(TRACK_ID, "missing stream header"))?;
    let length = data.len() as u64;
    let open = |position: u64| -> Result<BytesInput> {
        if position > length {
            return Err(Error::Internal(format!(
                "search repositioned to {position} past stream length {length}"
            )));
        }
        Ok(BytesInput::new(data.slice(position as usize..), position, Some(length)))
    };

    let mut seeker = BinarySearchSeeker::new(
        FrameScanSeeker::new(SyncFrameParser, seek_config),
        seek_bounds(header, length),
        seek_config,
    );
    seeker.set_seek_target_us(target_us);
    let mut input = open(STREAM_HEADER_LEN as u64)?;
    let mut repositions = 0;
    loop {
        match seeker.handle_pending_seek(&mut input)? {
            SeekStep::Reposition(position) => {
                repositions += 1;
                if repositions > MAX_REPOSITIONS {
                    return Err(Error::Internal(format!(
                        "seek to {target_us} did not converge"
                    )));
                }
                input = open(position)?;
            }
            SeekStep::Resolved {
                byte_position,
                found,
            } => {
                let frame_time_us = data
                    .get(byte_position as usize..)
                    .and_then(|frame| SyncFrameParser.parse(frame))
                    .map(|frame| frame.timestamp_us);
                return Ok(SeekResolution {
                    target_us,
                    byte_position,
                    found,
                    frame_time_us,
                    probes: seeker.probe_count(),
                    repositions,
                });
            }
        }
    }
}
