//! Unified error type for the tapedeck engine.
//!
//! Recoverable failures funnel into [`Error`]. Each variant belongs to an
//! [`ErrorCategory`] so the playback layer can decide whether to retry, skip a
//! track, or surface the failure. Programming errors (reading released bytes,
//! discarding samples that were already read) are not represented here: they
//! panic at the call site.

use std::fmt;

/// Why a clipping operator refused its child timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClippingFailure {
    /// The child does not expose exactly one window and one period.
    #[error("child must have exactly one period")]
    InvalidPeriodCount,
    /// The child window is dynamic, so its duration is not final.
    #[error("child window is dynamic")]
    DynamicWindow,
    /// A non-zero start was requested on a child that cannot seek.
    #[error("child is not seekable to a non-zero start")]
    NotSeekableToStart,
    /// The requested start lies after the requested end.
    #[error("clip start exceeds clip end")]
    StartExceedsEnd,
    /// The requested end lies beyond the child's duration.
    #[error("clip end exceeds child duration")]
    EndExceedsDuration,
}

/// Why a merge of parallel timelines was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MergeFailure {
    /// A child reports a different number of periods than the first child.
    #[error("child {child} has {actual} periods, expected {expected}")]
    PeriodCountMismatch {
        /// Period count of the first child.
        expected: usize,
        /// Period count of the offending child.
        actual: usize,
        /// Index of the offending child.
        child: usize,
    },
    /// A child window is dynamic.
    #[error("child {child} has a dynamic window")]
    DynamicWindow {
        /// Index of the offending child.
        child: usize,
    },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retryable I/O or load failure; buffered state is unaffected.
    Transient,
    /// Bad bytes on one track; other tracks keep playing.
    MalformedStream,
    /// A clipping or merging operator rejected its children.
    Composition,
    /// Invalid configuration.
    Configuration,
    /// Lookup misses and unexpected internal states.
    Internal,
}

/// Unified error type covering recoverable failure modes in tapedeck.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Loading from a data source failed and may be retried.
    #[error("Load error [{source_name}]: {message}")]
    Load {
        /// Name of the data source that failed.
        source_name: String,
        /// Human-readable error description.
        message: String,
    },

    /// Stream bytes could not be interpreted.
    #[error("Malformed stream [track {track}]: {message}")]
    Malformed {
        /// Track the bad data belongs to (`u32::MAX` when not track specific).
        track: u32,
        /// Human-readable error description.
        message: String,
    },

    /// A clipping operator rejected its child.
    #[error("Illegal clipping: {0}")]
    IllegalClipping(ClippingFailure),

    /// A merging operator rejected its children.
    #[error("Illegal merge: {0}")]
    IllegalMerge(MergeFailure),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "period", "source").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io { .. } | Error::Load { .. } => ErrorCategory::Transient,
            Error::Malformed { .. } => ErrorCategory::MalformedStream,
            Error::IllegalClipping(_) | Error::IllegalMerge(_) => ErrorCategory::Composition,
            Error::Validation(_) => ErrorCategory::Configuration,
            Error::NotFound { .. } | Error::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the operation that produced this error may be retried as is.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Load`].
    pub fn load(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Load {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Malformed`].
    pub fn malformed(track: u32, message: impl Into<String>) -> Self {
        Error::Malformed {
            track,
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_is_transient() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn load_display() {
        let err = Error::load("bytes", "connection dropped");
        assert_eq!(err.to_string(), "Load error [bytes]: connection dropped");
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_display() {
        let err = Error::malformed(2, "truncated encryption header");
        assert_eq!(
            err.to_string(),
            "Malformed stream [track 2]: truncated encryption header"
        );
        assert_eq!(err.category(), ErrorCategory::MalformedStream);
        assert!(!err.is_retryable());
    }

    #[test]
    fn clipping_display() {
        let err = Error::IllegalClipping(ClippingFailure::NotSeekableToStart);
        assert_eq!(
            err.to_string(),
            "Illegal clipping: child is not seekable to a non-zero start"
        );
        assert_eq!(err.category(), ErrorCategory::Composition);
    }

    #[test]
    fn merge_display() {
        let err = Error::IllegalMerge(MergeFailure::PeriodCountMismatch {
            expected: 2,
            actual: 3,
            child: 1,
        });
        assert_eq!(
            err.to_string(),
            "Illegal merge: child 1 has 3 periods, expected 2"
        );
    }

    #[test]
    fn composition_failures_are_errors() {
        fn describe(err: &dyn std::error::Error) -> String {
            err.to_string()
        }
        assert_eq!(
            describe(&ClippingFailure::EndExceedsDuration),
            "clip end exceeds child duration"
        );
        assert_eq!(
            describe(&ClippingFailure::StartExceedsEnd),
            "clip start exceeds clip end"
        );
        assert_eq!(
            describe(&MergeFailure::DynamicWindow { child: 2 }),
            "child 2 has a dynamic window"
        );
    }

    #[test]
    fn not_found_display() {
        let err = Error::not_found("period", "uid-7");
        assert_eq!(err.to_string(), "period not found: uid-7");
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn validation_is_configuration() {
        let err = Error::Validation("allocation_length must be > 0".into());
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
