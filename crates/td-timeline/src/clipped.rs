//! A single-period child cut down to `[start, end)` of its window.
//!
//! The clipped period starts at the clip start: a clipping period rewrites
//! sample timestamps by [`ClippedTimeline::period_offset_us`] so that period
//! time and window time coincide.

use td_core::ClippingFailure;

use crate::composition::Composition;
use crate::timeline::{SharedTimeline, Timeline};
use crate::uid::Uid;
use crate::window::{Period, Window};

#[derive(Debug, Clone, PartialEq)]
pub struct ClippedTimeline {
    child: SharedTimeline,
    start_us: i64,
    end_us: Option<i64>,
    period_offset_us: i64,
}

impl ClippedTimeline {
    /// Clip `child` to `[start_us, end_us)` in window time. `None` for the
    /// end keeps the child's end.
    pub fn new(
        child: SharedTimeline,
        start_us: i64,
        end_us: Option<i64>,
    ) -> Result<Self, ClippingFailure> {
        if child.window_count() != 1 || child.period_count() != 1 {
            return Err(ClippingFailure::InvalidPeriodCount);
        }
        let window = child.window(0);
        if window.is_dynamic {
            return Err(ClippingFailure::DynamicWindow);
        }
        let start_us = start_us.max(0);
        if start_us != 0 && !window.is_seekable && !window.is_placeholder {
            return Err(ClippingFailure::NotSeekableToStart);
        }
        if let (Some(end), Some(duration)) = (end_us, window.duration_us) {
            if end > duration {
                return Err(ClippingFailure::EndExceedsDuration);
            }
        }
        let end_us = end_us.or(window.duration_us);
        if end_us.is_some_and(|end| start_us > end) {
            return Err(ClippingFailure::StartExceedsEnd);
        }
        Ok(Self {
            period_offset_us: window.position_in_first_period_us + start_us,
            child,
            start_us,
            end_us,
        })
    }

    pub fn child(&self) -> &SharedTimeline {
        &self.child
    }

    pub fn start_us(&self) -> i64 {
        self.start_us
    }

    /// Resolved clip end in the child's window time.
    pub fn end_us(&self) -> Option<i64> {
        self.end_us
    }

    pub fn duration_us(&self) -> Option<i64> {
        self.end_us.map(|end| end - self.start_us)
    }

    /// Child period time at which the clipped period starts.
    pub fn period_offset_us(&self) -> i64 {
        self.period_offset_us
    }
}

impl Composition for ClippedTimeline {
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

    fn adjust_window(&self, _window_index: usize, mut window: Window) -> Window {
        let duration_us = self.duration_us();
        let mut default_position_us = (window.default_position_us - self.start_us).max(0);
        if let Some(duration) = duration_us {
            default_position_us = default_position_us.min(duration);
        }
        window.duration_us = duration_us;
        window.default_position_us = default_position_us;
        window.position_in_first_period_us = 0;
        window
    }

    fn adjust_period(&self, _period_index: usize, mut period: Period) -> Period {
        period.duration_us = self.duration_us();
        period.position_in_window_us = 0;
        period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{PlaceholderTimeline, SingleTimeline};
    use std::sync::Arc;

    fn child(duration_us: i64) -> SharedTimeline {
        Arc::new(SingleTimeline::new(duration_us, Uid::Index(0)).into())
    }

    #[test]
    fn window_covers_clip_range() {
        let clipped = ClippedTimeline::new(child(10_000_000), 2_000_000, Some(5_000_000)).unwrap();
        assert_eq!(clipped.duration_us(), Some(3_000_000));
        assert_eq!(clipped.period_offset_us(), 2_000_000);

        let t: Timeline = clipped.into();
        let window = t.window(0);
        assert_eq!(window.duration_us, Some(3_000_000));
        assert_eq!(window.position_in_first_period_us, 0);
        assert_eq!(window.uid, Uid::Index(0));
        assert_eq!(t.period(0).duration_us, Some(3_000_000));
        assert_eq!(t.index_of_period(&Uid::Index(0)), Some(0));
    }

    #[test]
    fn open_end_keeps_child_end() {
        let clipped = ClippedTimeline::new(child(10_000_000), 4_000_000, None).unwrap();
        assert_eq!(clipped.end_us(), Some(10_000_000));
        assert_eq!(clipped.duration_us(), Some(6_000_000));
    }

    #[test]
    fn rejects_invalid_clips() {
        assert_eq!(
            ClippedTimeline::new(child(1_000), 0, Some(2_000)).unwrap_err(),
            ClippingFailure::EndExceedsDuration
        );
        assert_eq!(
            ClippedTimeline::new(child(1_000), 900, Some(500)).unwrap_err(),
            ClippingFailure::StartExceedsEnd
        );

        let unseekable = Arc::new(SingleTimeline::unseekable(Some(1_000), Uid::Index(0)).into());
        assert_eq!(
            ClippedTimeline::new(unseekable, 10, None).unwrap_err(),
            ClippingFailure::NotSeekableToStart
        );

        let placeholder = Arc::new(Timeline::Placeholder(PlaceholderTimeline::new()));
        assert_eq!(
            ClippedTimeline::new(placeholder, 0, None).unwrap_err(),
            ClippingFailure::DynamicWindow
        );

        let two: SharedTimeline = Arc::new(
            crate::ConcatenatedTimeline::new(vec![
                (Uid::Index(0), child(1_000)),
                (Uid::Index(1), child(1_000)),
            ])
            .into(),
        );
        assert_eq!(
            ClippedTimeline::new(two, 0, None).unwrap_err(),
            ClippingFailure::InvalidPeriodCount
        );
    }

    #[test]
    fn unseekable_child_can_be_clipped_from_zero() {
        let unseekable = Arc::new(SingleTimeline::unseekable(Some(1_000), Uid::Index(0)).into());
        let clipped = ClippedTimeline::new(unseekable, 0, Some(500)).unwrap();
        assert_eq!(clipped.duration_us(), Some(500));
    }

    #[test]
    fn placeholder_child_is_clipped_without_seekability() {
        let placeholder = Arc::new(SingleTimeline::placeholder(Uid::Index(0)).into());
        let clipped = ClippedTimeline::new(placeholder, 2_000, Some(5_000)).unwrap();
        assert_eq!(clipped.duration_us(), Some(3_000));
    }

    #[test]
    fn default_position_is_clamped_into_clip() {
        let mut leaf = SingleTimeline::new(10_000, Uid::Index(0));
        leaf.default_position_us = 9_000;
        let t: Timeline = ClippedTimeline::new(Arc::new(leaf.into()), 1_000, Some(4_000))
            .unwrap()
            .into();
        assert_eq!(t.window(0).default_position_us, 3_000);
    }
}
