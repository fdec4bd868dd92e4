//! Value types describing one window or period of a timeline.

use serde::{Deserialize, Serialize};
use td_core::Manifest;

use crate::uid::Uid;

/// How traversal continues past the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop after the last window.
    #[default]
    Off,
    /// Repeat the current window.
    One,
    /// Wrap from the last window to the first.
    All,
}

/// A user-seekable span of content.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub uid: Uid,
    pub manifest: Option<Manifest>,
    pub is_seekable: bool,
    /// The duration or content may still change with a later refresh.
    pub is_dynamic: bool,
    /// Stand-in published before the real timeline is known.
    pub is_placeholder: bool,
    pub default_position_us: i64,
    pub duration_us: Option<i64>,
    pub first_period_index: usize,
    pub last_period_index: usize,
    /// Offset of the window start from the start of its first period.
    pub position_in_first_period_us: i64,
}

impl Window {
    pub fn period_count(&self) -> usize {
        self.last_period_index - self.first_period_index + 1
    }
}

/// A contiguous playable segment inside a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub uid: Uid,
    pub window_index: usize,
    pub duration_us: Option<i64>,
    /// Offset of the period start from the window start. Negative when the
    /// period starts before its window.
    pub position_in_window_us: i64,
    pub is_placeholder: bool,
}
