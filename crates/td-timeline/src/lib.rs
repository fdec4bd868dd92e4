//! td-timeline: window/period timelines and the operators that compose them.
//!
//! # Modules
//!
//! - [`timeline`] - The [`Timeline`] tree and derived lookups
//! - [`composition`] - Primitives every operator answers
//! - [`concatenated`], [`clipped`], [`looping`], [`merged`], [`masked`] - Operators
//! - [`uid`] - Identities that survive refresh

pub mod clipped;
pub mod composition;
pub mod concatenated;
pub mod looping;
pub mod masked;
pub mod merged;
pub mod timeline;
pub mod uid;
pub mod window;

pub use clipped::ClippedTimeline;
pub use composition::Composition;
pub use concatenated::ConcatenatedTimeline;
pub use looping::{InfiniteLoopTimeline, LoopingTimeline};
pub use masked::MaskedTimeline;
pub use merged::MergedTimeline;
pub use timeline::{PlaceholderTimeline, SharedTimeline, SingleTimeline, Timeline};
pub use uid::Uid;
pub use window::{Period, RepeatMode, Window};
