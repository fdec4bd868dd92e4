//! Repeats a child source a fixed number of times or without end.

use std::sync::Arc;

use td_core::{Error, Result, SourceId};
use td_timeline::{InfiniteLoopTimeline, LoopingTimeline, SharedTimeline, Timeline, Uid};

use crate::period::{MediaPeriod, PeriodId};
use crate::source::{publish, ChildSource, MediaSource, SourceEventSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopCount {
    Finite(usize),
    Infinite,
}

pub struct LoopingSource {
    child: ChildSource,
    loop_count: LoopCount,
    listener: Option<SourceEventSender>,
    timeline: Option<SharedTimeline>,
}

impl LoopingSource {
    /// Play `source` `loop_count` times. Panics if `loop_count` is zero.
    pub fn new(source: Box<dyn MediaSource>, loop_count: usize) -> Self {
        assert!(loop_count > 0, "loop count must be positive");
        Self::with_count(source, LoopCount::Finite(loop_count))
    }

    /// Play `source` until stopped.
    pub fn infinite(source: Box<dyn MediaSource>) -> Self {
        Self::with_count(source, LoopCount::Infinite)
    }

    fn with_count(source: Box<dyn MediaSource>, loop_count: LoopCount) -> Self {
        Self {
            child: ChildSource::new(source),
            loop_count,
            listener: None,
            timeline: None,
        }
    }

    pub fn timeline(&self) -> Option<SharedTimeline> {
        self.timeline.clone()
    }

    fn absorb_child_timeline(&mut self) -> Result<bool> {
        if !self.child.refresh()? {
            return Ok(false);
        }
        let Some(child_timeline) = self.child.timeline.clone() else {
            return Ok(false);
        };
        let timeline: Timeline = match self.loop_count {
            LoopCount::Finite(count) => LoopingTimeline::new(child_timeline, count).into(),
            LoopCount::Infinite => InfiniteLoopTimeline::new(child_timeline).into(),
        };
        let timeline = Arc::new(timeline);
        self.timeline = Some(Arc::clone(&timeline));
        publish(self.listener.as_ref(), timeline, self.child.manifest.clone());
        Ok(true)
    }

    /// The child's uid for an outer period uid.
    fn child_uid(&self, uid: &Uid) -> Result<Uid> {
        match self.loop_count {
            LoopCount::Infinite => Ok(uid.clone()),
            LoopCount::Finite(count) => match uid.split() {
                Some((Uid::Index(iteration), inner)) if (*iteration as usize) < count => {
                    Ok(inner.clone())
                }
                _ => Err(Error::not_found("period", uid)),
            },
        }
    }
}

impl MediaSource for LoopingSource {
    fn id(&self) -> SourceId {
        self.child.source.id()
    }

    fn prepare(&mut self, listener: SourceEventSender) -> Result<()> {
        self.listener = Some(listener);
        self.child.prepare()?;
        self.absorb_child_timeline()?;
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        self.absorb_child_timeline()
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        let child_uid = self.child_uid(&id.uid)?;
        self.child.source.create_period(&id.with_uid(child_uid))
    }

    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>) {
        match self.child_uid(&id.uid) {
            Ok(child_uid) => self.child.source.release_period(&id.with_uid(child_uid), period),
            Err(error) => tracing::warn!(%error, "released period is not part of this loop"),
        }
    }

    fn release(&mut self) {
        self.child.release();
        self.timeline = None;
        self.listener = None;
    }
}
