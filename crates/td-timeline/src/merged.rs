//! Parallel children played in sync, such as separate audio and video
//! sources for the same content.
//!
//! The merged timeline takes its topology and uids from the first child.

use td_core::MergeFailure;

use crate::composition::Composition;
use crate::timeline::{SharedTimeline, Timeline};
use crate::uid::Uid;
use crate::window::{Period, Window};

#[derive(Debug, Clone, PartialEq)]
pub struct MergedTimeline {
    children: Vec<SharedTimeline>,
    clip_durations: bool,
}

impl MergedTimeline {
    /// Merge `children`, which must agree on period count and have static
    /// windows. With `clip_durations`, each period and window lasts as long as
    /// the shortest child's. Panics if `children` is empty.
    pub fn new(children: Vec<SharedTimeline>, clip_durations: bool) -> Result<Self, MergeFailure> {
        assert!(!children.is_empty(), "merge needs at least one child");
        let expected = children[0].period_count();
        for (child, timeline) in children.iter().enumerate() {
            let actual = timeline.period_count();
            if actual != expected {
                return Err(MergeFailure::PeriodCountMismatch {
                    expected,
                    actual,
                    child,
                });
            }
            if (0..timeline.window_count()).any(|w| timeline.window(w).is_dynamic) {
                return Err(MergeFailure::DynamicWindow { child });
            }
        }
        Ok(Self {
            children,
            clip_durations,
        })
    }

    pub fn children(&self) -> &[SharedTimeline] {
        &self.children
    }

    fn shortest<F>(&self, duration: F) -> Option<i64>
    where
        F: Fn(&Timeline) -> Option<i64>,
    {
        self.children
            .iter()
            .filter_map(|child| duration(child.as_ref()))
            .min()
    }
}

impl Composition for MergedTimeline {
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
        &self.children[0]
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

    fn adjust_window(&self, window_index: usize, mut window: Window) -> Window {
        if !self.clip_durations {
            return window;
        }
        let shortest = self.shortest(|child| {
            (window_index < child.window_count())
                .then(|| child.window(window_index).duration_us)
                .flatten()
        });
        if let Some(duration) = shortest {
            window.duration_us = Some(duration);
            window.default_position_us = window.default_position_us.min(duration);
        }
        window
    }

    fn adjust_period(&self, period_index: usize, mut period: Period) -> Period {
        if !self.clip_durations {
            return period;
        }
        if let Some(duration) = self.shortest(|child| child.period(period_index).duration_us) {
            period.duration_us = Some(duration);
        }
        period
    }
}
