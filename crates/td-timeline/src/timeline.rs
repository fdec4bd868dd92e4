//! The [`Timeline`] tree and the operations every node supports.
//!
//! Leaves describe one source directly. Every other variant is an operator
//! over child timelines and answers lookups through [`Composition`]. Nodes are
//! immutable: a refresh builds a new tree that shares unchanged children.

use std::sync::Arc;

use td_core::Manifest;

use crate::clipped::ClippedTimeline;
use crate::composition::{self, Composition};
use crate::concatenated::ConcatenatedTimeline;
use crate::looping::{InfiniteLoopTimeline, LoopingTimeline};
use crate::masked::MaskedTimeline;
use crate::merged::MergedTimeline;
use crate::uid::Uid;
use crate::window::{Period, RepeatMode, Window};

/// Timelines are shared between a parent and the sources that built them.
pub type SharedTimeline = Arc<Timeline>;

#[derive(Debug, Clone, PartialEq)]
pub enum Timeline {
    Single(SingleTimeline),
    Placeholder(PlaceholderTimeline),
    Masked(MaskedTimeline),
    Concatenated(ConcatenatedTimeline),
    Clipped(ClippedTimeline),
    Looping(LoopingTimeline),
    InfiniteLoop(InfiniteLoopTimeline),
    Merged(MergedTimeline),
}

impl Timeline {
    /// An empty concatenation.
    pub fn empty() -> Self {
        Self::Concatenated(ConcatenatedTimeline::new(Vec::new()))
    }

    /// The operator view of a composed node, `None` for leaves.
    pub fn as_composition(&self) -> Option<&dyn Composition> {
        match self {
            Self::Single(_) | Self::Placeholder(_) => None,
            Self::Masked(t) => Some(t),
            Self::Concatenated(t) => Some(t),
            Self::Clipped(t) => Some(t),
            Self::Looping(t) => Some(t),
            Self::InfiniteLoop(t) => Some(t),
            Self::Merged(t) => Some(t),
        }
    }

    pub fn window_count(&self) -> usize {
        match self.as_composition() {
            Some(c) => composition::window_count(c),
            None => 1,
        }
    }

    pub fn period_count(&self) -> usize {
        match self.as_composition() {
            Some(c) => composition::period_count(c),
            None => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.window_count() == 0
    }

    /// Window `index`. Panics if `index` is out of range.
    pub fn window(&self, index: usize) -> Window {
        assert!(
            index < self.window_count(),
            "window {index} out of range ({} windows)",
            self.window_count()
        );
        match self {
            Self::Single(t) => t.window(),
            Self::Placeholder(t) => t.window(),
            _ => composition::window(self.require_composition(), index),
        }
    }

    /// Period `index`. Panics if `index` is out of range.
    pub fn period(&self, index: usize) -> Period {
        assert!(
            index < self.period_count(),
            "period {index} out of range ({} periods)",
            self.period_count()
        );
        match self {
            Self::Single(t) => t.period(),
            Self::Placeholder(t) => t.period(),
            _ => composition::period(self.require_composition(), index),
        }
    }

    pub fn uid_of_period(&self, index: usize) -> Uid {
        self.period(index).uid
    }

    pub fn index_of_period(&self, uid: &Uid) -> Option<usize> {
        match self {
            Self::Single(t) => (*uid == t.uid).then_some(0),
            Self::Placeholder(_) => (*uid == Uid::Placeholder).then_some(0),
            _ => composition::index_of_period(self.require_composition(), uid),
        }
    }

    pub fn period_by_uid(&self, uid: &Uid) -> Option<Period> {
        self.index_of_period(uid).map(|index| self.period(index))
    }

    pub fn first_window_index(&self) -> Option<usize> {
        (!self.is_empty()).then_some(0)
    }

    pub fn last_window_index(&self) -> Option<usize> {
        self.window_count().checked_sub(1)
    }

    /// Window played after `index` under `repeat_mode`.
    pub fn next_window_index(&self, index: usize, repeat_mode: RepeatMode) -> Option<usize> {
        match self.as_composition() {
            Some(c) => composition::next_window_index(c, index, repeat_mode),
            None => match repeat_mode {
                RepeatMode::Off => (index + 1 < self.window_count()).then_some(index + 1),
                RepeatMode::One => Some(index),
                RepeatMode::All if index + 1 == self.window_count() => self.first_window_index(),
                RepeatMode::All => Some(index + 1),
            },
        }
    }

    /// Window played before `index` under `repeat_mode`.
    pub fn previous_window_index(&self, index: usize, repeat_mode: RepeatMode) -> Option<usize> {
        match self.as_composition() {
            Some(c) => composition::previous_window_index(c, index, repeat_mode),
            None => match repeat_mode {
                RepeatMode::Off => index.checked_sub(1),
                RepeatMode::One => Some(index),
                RepeatMode::All if index == 0 => self.last_window_index(),
                RepeatMode::All => Some(index - 1),
            },
        }
    }

    /// Period played after `index` under `repeat_mode`.
    pub fn next_period_index(&self, index: usize, repeat_mode: RepeatMode) -> Option<usize> {
        let window_index = self.period(index).window_index;
        if self.window(window_index).last_period_index == index {
            let next_window = self.next_window_index(window_index, repeat_mode)?;
            return Some(self.window(next_window).first_period_index);
        }
        Some(index + 1)
    }

    pub fn is_last_period(&self, index: usize, repeat_mode: RepeatMode) -> bool {
        self.next_period_index(index, repeat_mode).is_none()
    }

    /// Resolve a position inside window `window_index` to the period that
    /// contains it and the position inside that period. `None` uses the
    /// window's default position.
    pub fn period_position(
        &self,
        window_index: usize,
        window_position_us: Option<i64>,
    ) -> (usize, i64) {
        let window = self.window(window_index);
        let window_position_us = window_position_us.unwrap_or(window.default_position_us);
        let mut period_index = window.first_period_index;
        let mut position_us = window.position_in_first_period_us + window_position_us;
        let mut duration_us = self.period(period_index).duration_us;
        while let Some(duration) = duration_us {
            if position_us < duration || period_index >= window.last_period_index {
                break;
            }
            position_us -= duration;
            period_index += 1;
            duration_us = self.period(period_index).duration_us;
        }
        (period_index, position_us)
    }

    fn require_composition(&self) -> &dyn Composition {
        match self.as_composition() {
            Some(c) => c,
            None => unreachable!("leaf timelines are handled directly"),
        }
    }
}

impl From<SingleTimeline> for Timeline {
    fn from(t: SingleTimeline) -> Self {
        Self::Single(t)
    }
}

impl From<ConcatenatedTimeline> for Timeline {
    fn from(t: ConcatenatedTimeline) -> Self {
        Self::Concatenated(t)
    }
}

impl From<ClippedTimeline> for Timeline {
    fn from(t: ClippedTimeline) -> Self {
        Self::Clipped(t)
    }
}

impl From<LoopingTimeline> for Timeline {
    fn from(t: LoopingTimeline) -> Self {
        Self::Looping(t)
    }
}

impl From<MaskedTimeline> for Timeline {
    fn from(t: MaskedTimeline) -> Self {
        Self::Masked(t)
    }
}

impl From<MergedTimeline> for Timeline {
    fn from(t: MergedTimeline) -> Self {
        Self::Merged(t)
    }
}

impl From<InfiniteLoopTimeline> for Timeline {
    fn from(t: InfiniteLoopTimeline) -> Self {
        Self::InfiniteLoop(t)
    }
}

/// One window containing one period that starts with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTimeline {
    pub uid: Uid,
    pub duration_us: Option<i64>,
    pub is_seekable: bool,
    pub is_dynamic: bool,
    /// Published before the source knows its real duration and seekability.
    pub is_placeholder: bool,
    pub default_position_us: i64,
    pub manifest: Option<Manifest>,
}

impl SingleTimeline {
    /// A static, seekable timeline of known duration.
    pub fn new(duration_us: i64, uid: Uid) -> Self {
        Self {
            uid,
            duration_us: Some(duration_us),
            is_seekable: true,
            is_dynamic: false,
            is_placeholder: false,
            default_position_us: 0,
            manifest: None,
        }
    }

    pub fn unseekable(duration_us: Option<i64>, uid: Uid) -> Self {
        Self {
            uid,
            duration_us,
            is_seekable: false,
            is_dynamic: false,
            is_placeholder: false,
            default_position_us: 0,
            manifest: None,
        }
    }

    /// Unknown duration, not yet seekable.
    pub fn placeholder(uid: Uid) -> Self {
        Self {
            is_placeholder: true,
            ..Self::unseekable(None, uid)
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    fn window(&self) -> Window {
        Window {
            uid: self.uid.clone(),
            manifest: self.manifest.clone(),
            is_seekable: self.is_seekable,
            is_dynamic: self.is_dynamic,
            is_placeholder: self.is_placeholder,
            default_position_us: self.default_position_us,
            duration_us: self.duration_us,
            first_period_index: 0,
            last_period_index: 0,
            position_in_first_period_us: 0,
        }
    }

    fn period(&self) -> Period {
        Period {
            uid: self.uid.clone(),
            window_index: 0,
            duration_us: self.duration_us,
            position_in_window_us: 0,
            is_placeholder: self.is_placeholder,
        }
    }
}

/// The single dynamic window shown for a source that has not reported yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderTimeline {
    pub manifest: Option<Manifest>,
}

impl PlaceholderTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self) -> Window {
        Window {
            uid: Uid::Placeholder,
            manifest: self.manifest.clone(),
            is_seekable: false,
            is_dynamic: true,
            is_placeholder: true,
            default_position_us: 0,
            duration_us: None,
            first_period_index: 0,
            last_period_index: 0,
            position_in_first_period_us: 0,
        }
    }

    fn period(&self) -> Period {
        Period {
            uid: Uid::Placeholder,
            window_index: 0,
            duration_us: None,
            position_in_window_us: 0,
            is_placeholder: true,
        }
    }
}
