//! The contract between a container extractor and the buffers it fills.

use std::sync::Arc;

use td_core::{CryptoData, Format, Result, SampleFlags};
use td_seek::{ExtractorInput, SeekMap};

/// Receives what an extractor finds in its input.
///
/// Track ids are chosen by the extractor. The first format pushed for an id
/// registers the track.
pub trait ExtractorOutput {
    /// Set the format of subsequent samples on `track_id`.
    fn push_format(&mut self, track_id: u32, format: Format);

    /// Append payload bytes of the sample being assembled on `track_id`.
    fn push_data(&mut self, track_id: u32, data: &[u8]);

    /// Commit the sample made of the last `size` bytes pushed on `track_id`.
    fn commit_sample(
        &mut self,
        track_id: u32,
        time_us: i64,
        flags: SampleFlags,
        size: usize,
        crypto: Option<CryptoData>,
    );

    /// Publish how times map to byte positions in this stream.
    fn report_seek_map(&mut self, seek_map: Arc<dyn SeekMap>);

    /// No further tracks will be registered.
    fn end_tracks(&mut self);
}

/// What the loader does after one [`Extractor::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorStep {
    /// Call `read` again with the same input.
    Continue,
    /// Reopen the input at this byte position and call `read` again.
    Reposition(u64),
    /// The input is exhausted.
    EndOfInput,
}

/// Parses one container format from an [`ExtractorInput`].
pub trait Extractor: Send {
    /// Parse a bounded amount of input, reporting what was found to `output`.
    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> Result<ExtractorStep>;

    /// Prepare to restart at byte `position`, positioned for `time_us`.
    ///
    /// The loader opens the next input at `position`. Extractors that can
    /// refine the position (for example by binary search) answer the first
    /// `read` with [`ExtractorStep::Reposition`].
    fn seek(&mut self, position: u64, time_us: i64);
}

/// Creates a fresh extractor for each period of a source.
pub type ExtractorFactory = Arc<dyn Fn() -> Box<dyn Extractor> + Send + Sync>;
