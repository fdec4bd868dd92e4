//! A playlist of sources played back to back.
//!
//! Children may be added, moved and removed at any time. Each child is
//! wrapped in a [`MaskingSource`] and named by its [`SourceId`], so period
//! uids stay valid across every edit that leaves their source in place.

use std::collections::HashMap;
use std::sync::Arc;

use td_core::{Error, Result, SourceId};
use td_timeline::{ConcatenatedTimeline, MaskedTimeline, SharedTimeline, Timeline, Uid};

use crate::masking::MaskingSource;
use crate::period::{MediaPeriod, PeriodId};
use crate::source::{publish, ChildSource, MediaSource, SourceEventSender};

pub struct ConcatenatingSource {
    id: SourceId,
    children: Vec<ChildSource>,
    /// Owning child of every period handed out and not yet released.
    active_periods: HashMap<PeriodId, SourceId>,
    listener: Option<SourceEventSender>,
    timeline: SharedTimeline,
}

impl Default for ConcatenatingSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcatenatingSource {
    pub fn new() -> Self {
        Self {
            id: SourceId::new(),
            children: Vec::new(),
            active_periods: HashMap::new(),
            listener: None,
            timeline: Arc::new(Timeline::empty()),
        }
    }

    pub fn with_sources(sources: impl IntoIterator<Item = Box<dyn MediaSource>>) -> Self {
        let mut concatenating = Self::new();
        for source in sources {
            concatenating.push_child(concatenating.children.len(), source);
        }
        concatenating
    }

    pub fn source_count(&self) -> usize {
        self.children.len()
    }

    /// Ids of the children in playback order.
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.children.iter().map(|child| child.source.id()).collect()
    }

    /// The timeline as last published.
    pub fn timeline(&self) -> SharedTimeline {
        Arc::clone(&self.timeline)
    }

    /// Append `source`. It is prepared right away if this source is.
    pub fn add_source(&mut self, source: Box<dyn MediaSource>) -> Result<SourceId> {
        self.add_source_at(self.children.len(), source)
    }

    /// Insert `source` before the child at `index`. Panics if `index` is
    /// greater than the number of children.
    pub fn add_source_at(
        &mut self,
        index: usize,
        source: Box<dyn MediaSource>,
    ) -> Result<SourceId> {
        assert!(index <= self.children.len(), "insert index {index} out of range");
        let id = self.push_child(index, source);
        if self.listener.is_some() {
            let child = &mut self.children[index];
            child.prepare()?;
            child.refresh()?;
            self.rebuild_and_publish();
        }
        tracing::info!(playlist = %self.id, source = %id, index, "source added");
        Ok(id)
    }

    /// Remove the child `id`. Fails while any of its periods are active.
    pub fn remove_source(&mut self, id: SourceId) -> Result<()> {
        let index = self.index_of(id)?;
        if self.active_periods.values().any(|owner| *owner == id) {
            return Err(Error::Internal(format!(
                "source {id} still has active periods"
            )));
        }
        let mut child = self.children.remove(index);
        child.release();
        if self.listener.is_some() {
            self.rebuild_and_publish();
        }
        tracing::info!(playlist = %self.id, source = %id, "source removed");
        Ok(())
    }

    /// Move the child `id` so that it ends up at `to_index`.
    pub fn move_source(&mut self, id: SourceId, to_index: usize) -> Result<()> {
        let from_index = self.index_of(id)?;
        if to_index >= self.children.len() {
            return Err(Error::not_found("playlist index", to_index));
        }
        let child = self.children.remove(from_index);
        self.children.insert(to_index, child);
        if self.listener.is_some() {
            self.rebuild_and_publish();
        }
        Ok(())
    }

    fn push_child(&mut self, index: usize, source: Box<dyn MediaSource>) -> SourceId {
        let masked = MaskingSource::new(source);
        let id = masked.id();
        self.children.insert(index, ChildSource::new(Box::new(masked)));
        id
    }

    fn index_of(&self, id: SourceId) -> Result<usize> {
        self.children
            .iter()
            .position(|child| child.source.id() == id)
            .ok_or_else(|| Error::not_found("source", id))
    }

    fn rebuild_and_publish(&mut self) {
        let children = self
            .children
            .iter()
            .map(|child| {
                let timeline = child
                    .timeline
                    .clone()
                    .unwrap_or_else(|| Arc::new(MaskedTimeline::placeholder().into()));
                (Uid::Source(child.source.id()), timeline)
            })
            .collect();
        self.timeline = Arc::new(ConcatenatedTimeline::new(children).into());
        tracing::debug!(
            playlist = %self.id,
            windows = self.timeline.window_count(),
            periods = self.timeline.period_count(),
            "playlist timeline rebuilt"
        );
        publish(self.listener.as_ref(), Arc::clone(&self.timeline), None);
    }

    /// Split a period uid into the owning child and the child's own uid.
    fn child_for(&self, uid: &Uid) -> Result<(usize, Uid)> {
        let Some((Uid::Source(id), inner)) = uid.split() else {
            return Err(Error::not_found("period", uid));
        };
        Ok((self.index_of(*id)?, inner.clone()))
    }
}

impl MediaSource for ConcatenatingSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn prepare(&mut self, listener: SourceEventSender) -> Result<()> {
        self.listener = Some(listener);
        for child in &mut self.children {
            child.prepare()?;
            child.refresh()?;
        }
        self.rebuild_and_publish();
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        let mut changed = false;
        for child in &mut self.children {
            changed |= child.refresh()?;
        }
        if changed {
            self.rebuild_and_publish();
        }
        Ok(changed)
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        let (index, child_uid) = self.child_for(&id.uid)?;
        let child = &mut self.children[index];
        let period = child.source.create_period(&id.with_uid(child_uid))?;
        self.active_periods.insert(id.clone(), child.source.id());
        Ok(period)
    }

    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>) {
        self.active_periods.remove(id);
        match self.child_for(&id.uid) {
            Ok((index, child_uid)) => {
                self.children[index]
                    .source
                    .release_period(&id.with_uid(child_uid), period);
            }
            Err(error) => tracing::warn!(%error, "released period has no owning source"),
        }
    }

    fn release(&mut self) {
        if !self.active_periods.is_empty() {
            tracing::warn!(
                playlist = %self.id,
                active = self.active_periods.len(),
                "released with active periods"
            );
            self.active_periods.clear();
        }
        for child in &mut self.children {
            child.release();
        }
        self.listener = None;
        self.timeline = Arc::new(Timeline::empty());
    }
}
