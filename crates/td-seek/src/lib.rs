//! td-seek: seeking inside byte streams that carry no seek index.
//!
//! # Modules
//!
//! - [`input`] - Forward-only extractor input with a separate peek cursor
//! - [`seek_map`] - Time-to-byte mapping published by extractors
//! - [`binary_search`] - Bisection driver with found/under/over convergence
//! - [`frame_seeker`] - Timestamp probe over sync-framed streams

pub mod binary_search;
pub mod frame_seeker;
pub mod input;
pub mod seek_map;

pub use binary_search::{
    BinarySearchSeeker, SeekOperationParams, SeekStep, TimestampSearchResult, TimestampSeeker,
};
pub use frame_seeker::{FrameHeader, FrameParser, FrameScanSeeker};
pub use input::{BytesInput, ExtractorInput};
pub use seek_map::{BinarySearchSeekMap, SeekMap, SeekPoint, Unseekable};
