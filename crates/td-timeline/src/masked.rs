//! Timeline of a source that may not have reported yet.
//!
//! Until the real timeline arrives, a masked timeline exposes one placeholder
//! window and period so the indices of its siblings stay put. Once the real
//! timeline arrives its first window and period take over the placeholder
//! uid, so periods created against the placeholder keep resolving.

use std::sync::Arc;

use crate::composition::Composition;
use crate::timeline::{PlaceholderTimeline, SharedTimeline, Timeline};
use crate::uid::Uid;

#[derive(Debug, Clone, PartialEq)]
pub struct MaskedTimeline {
    inner: SharedTimeline,
    replaced_window_uid: Option<Uid>,
    replaced_period_uid: Option<Uid>,
}

impl MaskedTimeline {
    pub fn placeholder() -> Self {
        Self {
            inner: Arc::new(Timeline::Placeholder(PlaceholderTimeline::new())),
            replaced_window_uid: None,
            replaced_period_uid: None,
        }
    }

    /// Mask the first real timeline of a source. Its first window and period
    /// are renamed to the placeholder uid.
    pub fn with_real_timeline(real: SharedTimeline) -> Self {
        let (replaced_window_uid, replaced_period_uid) = if real.is_empty() {
            (None, None)
        } else {
            (Some(real.window(0).uid), Some(real.period(0).uid))
        };
        Self {
            inner: real,
            replaced_window_uid,
            replaced_period_uid,
        }
    }

    /// Swap in a later real timeline, keeping the uids already replaced.
    pub fn with_updated_timeline(&self, real: SharedTimeline) -> Self {
        Self {
            inner: real,
            replaced_window_uid: self.replaced_window_uid.clone(),
            replaced_period_uid: self.replaced_period_uid.clone(),
        }
    }

    pub fn inner(&self) -> &SharedTimeline {
        &self.inner
    }

    /// True until a real timeline has been masked.
    pub fn is_placeholder(&self) -> bool {
        matches!(*self.inner, Timeline::Placeholder(_))
    }

    /// Uid inside the real timeline for a uid seen from outside.
    pub fn real_uid(&self, uid: &Uid) -> Uid {
        match (uid, &self.replaced_period_uid) {
            (Uid::Placeholder, Some(real)) => real.clone(),
            _ => uid.clone(),
        }
    }
}

impl Composition for MaskedTimeline {
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
        &self.inner
    }

    fn uid_of(&self, _child: usize) -> Uid {
        Uid::Index(0)
    }

    fn wrap_uid(&self, _child: usize, uid: Uid) -> Uid {
        let replaced = Some(&uid) == self.replaced_period_uid.as_ref()
            || Some(&uid) == self.replaced_window_uid.as_ref();
        if replaced {
            Uid::Placeholder
        } else {
            uid
        }
    }

    fn unwrap_uid(&self, uid: &Uid) -> Option<(usize, Uid)> {
        Some((0, self.real_uid(uid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concatenated::ConcatenatedTimeline;
    use crate::timeline::SingleTimeline;
    use td_core::SourceId;

    fn real(duration_us: i64) -> SharedTimeline {
        Arc::new(SingleTimeline::new(duration_us, Uid::Index(42)).into())
    }

    #[test]
    fn placeholder_exposes_one_dynamic_window() {
        let masked = MaskedTimeline::placeholder();
        assert!(masked.is_placeholder());
        let t: Timeline = masked.into();
        assert_eq!(t.window_count(), 1);
        assert!(t.window(0).is_placeholder);
        assert_eq!(t.uid_of_period(0), Uid::Placeholder);
    }

    #[test]
    fn real_timeline_takes_over_placeholder_uid() {
        let masked = MaskedTimeline::with_real_timeline(real(3_000));
        assert!(!masked.is_placeholder());
        assert_eq!(masked.real_uid(&Uid::Placeholder), Uid::Index(42));
        let t: Timeline = masked.into();
        assert_eq!(t.uid_of_period(0), Uid::Placeholder);
        assert_eq!(t.index_of_period(&Uid::Placeholder), Some(0));
        assert_eq!(t.window(0).duration_us, Some(3_000));
        assert!(!t.window(0).is_placeholder);
    }

    #[test]
    fn updates_keep_the_replaced_uid() {
        let first = MaskedTimeline::with_real_timeline(real(3_000));
        let updated: Timeline = first.with_updated_timeline(real(6_000)).into();
        assert_eq!(updated.uid_of_period(0), Uid::Placeholder);
        assert_eq!(updated.period(0).duration_us, Some(6_000));
    }

    #[test]
    fn period_created_on_placeholder_resolves_after_refresh() {
        let id = SourceId::new();
        let before: Timeline = ConcatenatedTimeline::new(vec![(
            Uid::Source(id),
            Arc::new(MaskedTimeline::placeholder().into()),
        )])
        .into();
        let held = before.uid_of_period(0);

        let after: Timeline = ConcatenatedTimeline::new(vec![(
            Uid::Source(id),
            Arc::new(MaskedTimeline::with_real_timeline(real(1_000)).into()),
        )])
        .into();
        assert_eq!(after.index_of_period(&held), Some(0));
        assert_eq!(after.period_by_uid(&held).unwrap().duration_us, Some(1_000));
    }
}
