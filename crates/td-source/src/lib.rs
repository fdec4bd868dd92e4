//! td-source: media sources, the periods they create, and the operators that
//! compose them.
//!
//! # Modules
//!
//! - [`extractor`] - Contract between a container parser and the sample queues
//! - [`data_source`] - Byte sources an extractor reads from
//! - [`period`] - The [`MediaPeriod`] trait
//! - [`source`] - The [`MediaSource`] trait and timeline refresh events
//! - [`progressive`] - Extractor-driven single-period source
//! - [`masking`], [`concatenating`], [`clipping`], [`looping`], [`merging`] - Composite sources

pub mod clipping;
pub mod concatenating;
pub mod data_source;
pub mod extractor;
pub mod looping;
pub mod masking;
pub mod merging;
pub mod period;
pub mod progressive;
pub mod source;

pub use clipping::{ClippingPeriod, ClippingSource};
pub use concatenating::ConcatenatingSource;
pub use data_source::{BytesDataSource, DataSource};
pub use extractor::{Extractor, ExtractorFactory, ExtractorOutput, ExtractorStep};
pub use looping::LoopingSource;
pub use masking::{MaskingPeriod, MaskingSource};
pub use merging::{MergingPeriod, MergingSource};
pub use period::{MediaPeriod, PeriodId};
pub use progressive::{ProgressivePeriod, ProgressiveSource, PROGRESSIVE_PERIOD_UID};
pub use source::{MediaSource, SourceEvent, SourceEventReceiver, SourceEventSender};
