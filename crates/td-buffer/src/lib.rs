//! td-buffer: sample byte storage and per-sample metadata for demuxed tracks.
//!
//! # Modules
//!
//! - [`allocator`] - Shared pool of fixed-size byte blocks
//! - [`data_queue`] - Ring of blocks addressed by absolute byte offset
//! - [`metadata_queue`] - Per-sample records with keyframe-aware lookup
//! - [`crypto`] - In-band encryption header framing
//! - [`sample_queue`] - Producer/consumer contract combining the above

pub mod allocator;
pub mod buffer;
pub mod crypto;
pub mod data_queue;
pub mod metadata_queue;
pub mod sample_queue;

pub use allocator::{Allocation, Allocator};
pub use buffer::SampleBuffer;
pub use crypto::{encode_encryption_header, CryptoInfo};
pub use data_queue::SampleDataQueue;
pub use metadata_queue::SampleMetadataQueue;
pub use sample_queue::{ReadResult, SampleQueue};
