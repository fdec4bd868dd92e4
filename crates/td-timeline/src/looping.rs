//! Repetition of a child timeline.

use crate::composition::Composition;
use crate::timeline::{SharedTimeline, Timeline};
use crate::uid::Uid;
use crate::window::RepeatMode;

/// A child repeated `loop_count` times. Each iteration is a separate child
/// named by its iteration index, so periods of different iterations have
/// distinct uids.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopingTimeline {
    child: SharedTimeline,
    loop_count: usize,
    child_windows: usize,
    child_periods: usize,
}

impl LoopingTimeline {
    /// Panics if `loop_count` is zero.
    pub fn new(child: SharedTimeline, loop_count: usize) -> Self {
        assert!(loop_count > 0, "loop count must be positive");
        let child_windows = child.window_count();
        let child_periods = child.period_count();
        Self {
            child,
            loop_count,
            child_windows,
            child_periods,
        }
    }

    pub fn child(&self) -> &SharedTimeline {
        &self.child
    }

    pub fn loop_count(&self) -> usize {
        self.loop_count
    }

    /// Iteration and child period index of global period `period_index`.
    pub fn iteration_of_period(&self, period_index: usize) -> (usize, usize) {
        let iteration = self.child_index_for_period(period_index);
        (iteration, period_index - self.first_period_of(iteration))
    }
}

impl Composition for LoopingTimeline {
    fn child_count(&self) -> usize {
        self.loop_count
    }

    fn child_index_for_window(&self, window_index: usize) -> usize {
        window_index / self.child_windows
    }

    fn child_index_for_period(&self, period_index: usize) -> usize {
        period_index / self.child_periods
    }

    fn child_index_for_uid(&self, uid: &Uid) -> Option<usize> {
        match uid {
            Uid::Index(iteration) => {
                let iteration = usize::try_from(*iteration).ok()?;
                (iteration < self.loop_count).then_some(iteration)
            }
            _ => None,
        }
    }

    fn first_window_of(&self, child: usize) -> usize {
        child * self.child_windows
    }

    fn first_period_of(&self, child: usize) -> usize {
        child * self.child_periods
    }

    fn timeline_of(&self, _child: usize) -> &Timeline {
        &self.child
    }

    fn uid_of(&self, child: usize) -> Uid {
        Uid::Index(child as u64)
    }
}

/// A child repeated without end: indices are the child's own, and traversal
/// wraps from the last window to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteLoopTimeline {
    child: SharedTimeline,
}

impl InfiniteLoopTimeline {
    pub fn new(child: SharedTimeline) -> Self {
        Self { child }
    }

    pub fn child(&self) -> &SharedTimeline {
        &self.child
    }
}

impl Composition for InfiniteLoopTimeline {
    fn child_count(&self) -> usize {
        1
    }

    fn child_index_for_window(&self, _window_index: usize) -> usize {
        0
    }

    fn child_index_for_period(&self, _period_index: usize) -> usize {
        0
    }

    fn child_index_for_uid(&self, _uid: &Uid) -> Option<usize> {
        Some(0)
    }

    fn first_window_of(&self, _child: usize) -> usize {
        0
    }

    fn first_period_of(&self, _child: usize) -> usize {
        0
    }

    fn timeline_of(&self, _child: usize) -> &Timeline {
        &self.child
    }

    fn uid_of(&self, _child: usize) -> Uid {
        Uid::Index(0)
    }

    fn wrap_uid(&self, _child: usize, uid: Uid) -> Uid {
        uid
    }

    fn unwrap_uid(&self, uid: &Uid) -> Option<(usize, Uid)> {
        Some((0, uid.clone()))
    }

    fn effective_repeat_mode(&self, repeat_mode: RepeatMode) -> RepeatMode {
        match repeat_mode {
            RepeatMode::One => RepeatMode::One,
            RepeatMode::Off | RepeatMode::All => RepeatMode::All,
        }
    }
}
