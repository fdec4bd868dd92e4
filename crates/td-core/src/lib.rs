//! td-core: shared error type, configuration, typed ids, and media-domain types.
//!
//! Every other td-* crate depends on this one. It carries no buffering or
//! timeline logic of its own.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{ClippingFailure, Error, ErrorCategory, MergeFailure, Result};
pub use ids::*;
pub use media::*;
