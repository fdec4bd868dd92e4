//! Children played back to back, located by prefix-sum bisection.

use std::collections::HashMap;

use crate::composition::Composition;
use crate::timeline::{SharedTimeline, Timeline};
use crate::uid::Uid;

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatenatedTimeline {
    children: Vec<SharedTimeline>,
    uids: Vec<Uid>,
    /// Global index of each child's first window.
    first_windows: Vec<usize>,
    /// Global index of each child's first period.
    first_periods: Vec<usize>,
    child_by_uid: HashMap<Uid, usize>,
}

impl ConcatenatedTimeline {
    /// Concatenate `(uid, timeline)` pairs in order. Panics if two children
    /// share a uid.
    pub fn new(children: Vec<(Uid, SharedTimeline)>) -> Self {
        let mut first_windows = Vec::with_capacity(children.len());
        let mut first_periods = Vec::with_capacity(children.len());
        let mut child_by_uid = HashMap::with_capacity(children.len());
        let (mut windows, mut periods) = (0, 0);
        for (index, (uid, timeline)) in children.iter().enumerate() {
            first_windows.push(windows);
            first_periods.push(periods);
            windows += timeline.window_count();
            periods += timeline.period_count();
            let previous = child_by_uid.insert(uid.clone(), index);
            assert!(previous.is_none(), "duplicate child uid {uid}");
        }
        let (uids, children) = children.into_iter().unzip();
        Self {
            children,
            uids,
            first_windows,
            first_periods,
            child_by_uid,
        }
    }

    pub fn children(&self) -> &[SharedTimeline] {
        &self.children
    }
}

/// Last child whose first index is at or before `index`. Empty children
/// share their successor's first index and are skipped.
fn floor_search(firsts: &[usize], index: usize) -> usize {
    firsts.partition_point(|&first| first <= index).saturating_sub(1)
}

impl Composition for ConcatenatedTimeline {
    fn child_count(&self) -> usize {
        self.children.len()
    }

    fn child_index_for_window(&self, window_index: usize) -> usize {
        floor_search(&self.first_windows, window_index)
    }

    fn child_index_for_period(&self, period_index: usize) -> usize {
        floor_search(&self.first_periods, period_index)
    }

    fn child_index_for_uid(&self, uid: &Uid) -> Option<usize> {
        self.child_by_uid.get(uid).copied()
    }

    fn first_window_of(&self, child: usize) -> usize {
        self.first_windows[child]
    }

    fn first_period_of(&self, child: usize) -> usize {
        self.first_periods[child]
    }

    fn timeline_of(&self, child: usize) -> &Timeline {
        &self.children[child]
    }

    fn uid_of(&self, child: usize) -> Uid {
        self.uids[child].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::SingleTimeline;
    use crate::window::RepeatMode;
    use std::sync::Arc;

    /// A concatenation of `count` single-period windows of 1s each.
    fn run_of(count: usize, tag: u64) -> SharedTimeline {
        let children = (0..count)
            .map(|i| {
                let leaf = SingleTimeline::new(1_000_000, Uid::Index(i as u64));
                (Uid::Index(tag * 100 + i as u64), Arc::new(leaf.into()))
            })
            .collect();
        Arc::new(ConcatenatedTimeline::new(children).into())
    }

    fn three_one_four() -> ConcatenatedTimeline {
        ConcatenatedTimeline::new(vec![
            (Uid::Index(0), run_of(3, 0)),
            (Uid::Index(1), run_of(1, 1)),
            (Uid::Index(2), run_of(4, 2)),
        ])
    }

    #[test]
    fn prefix_sums_locate_children() {
        let t = three_one_four();
        let expected = [0, 0, 0, 1, 2, 2, 2, 2];
        for (window, child) in expected.iter().enumerate() {
            assert_eq!(t.child_index_for_window(window), *child, "window {window}");
            assert_eq!(t.child_index_for_period(window), *child, "period {window}");
        }
        assert_eq!(t.first_window_of(2), 4);
        assert_eq!(t.first_period_of(1), 3);
    }

    #[test]
    fn counts_and_windows_are_translated() {
        let t: Timeline = three_one_four().into();
        assert_eq!(t.window_count(), 8);
        assert_eq!(t.period_count(), 8);
        let window = t.window(5);
        assert_eq!(window.first_period_index, 5);
        assert_eq!(window.last_period_index, 5);
        assert_eq!(t.period(5).window_index, 5);
    }

    #[test]
    fn period_uids_round_trip() {
        let t: Timeline = three_one_four().into();
        for index in 0..t.period_count() {
            let uid = t.uid_of_period(index);
            assert_eq!(t.index_of_period(&uid), Some(index));
        }
        let foreign = Uid::nested(Uid::Index(9), Uid::Index(0));
        assert_eq!(t.index_of_period(&foreign), None);
    }

    #[test]
    fn uid_survives_rebuild_with_new_neighbour() {
        let before: Timeline = three_one_four().into();
        let uid = before.uid_of_period(3);

        let after: Timeline = ConcatenatedTimeline::new(vec![
            (Uid::Index(7), run_of(2, 7)),
            (Uid::Index(0), run_of(3, 0)),
            (Uid::Index(1), run_of(1, 1)),
        ])
        .into();
        assert_eq!(after.index_of_period(&uid), Some(5));
    }

    #[test]
    fn empty_children_are_skipped() {
        let t: Timeline = ConcatenatedTimeline::new(vec![
            (Uid::Index(0), run_of(2, 0)),
            (Uid::Index(1), run_of(0, 1)),
            (Uid::Index(2), run_of(1, 2)),
        ])
        .into();
        assert_eq!(t.window_count(), 3);
        assert_eq!(t.next_window_index(1, RepeatMode::Off), Some(2));
        assert_eq!(t.previous_window_index(2, RepeatMode::Off), Some(1));
        assert_eq!(
            t.window(2).uid,
            Uid::nested(Uid::Index(2), Uid::nested(Uid::Index(200), Uid::Index(0)))
        );
    }

    #[test]
    fn traversal_honours_repeat_mode() {
        let t: Timeline = three_one_four().into();
        assert_eq!(t.next_window_index(2, RepeatMode::Off), Some(3));
        assert_eq!(t.next_window_index(7, RepeatMode::Off), None);
        assert_eq!(t.next_window_index(7, RepeatMode::All), Some(0));
        assert_eq!(t.next_window_index(4, RepeatMode::One), Some(4));
        assert_eq!(t.previous_window_index(0, RepeatMode::All), Some(7));
        assert_eq!(t.previous_window_index(4, RepeatMode::Off), Some(3));
        assert_eq!(t.next_period_index(7, RepeatMode::All), Some(0));
        assert!(t.is_last_period(7, RepeatMode::Off));
    }

    #[test]
    #[should_panic(expected = "duplicate child uid")]
    fn duplicate_uids_panic() {
        ConcatenatedTimeline::new(vec![
            (Uid::Index(0), run_of(1, 0)),
            (Uid::Index(0), run_of(1, 1)),
        ]);
    }
}
