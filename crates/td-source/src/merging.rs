//! Plays several sources in parallel as one, such as separate audio and
//! video renditions of the same content.
//!
//! The merged timeline takes its structure from the first child. Every period
//! of the merged source is built from the periods at the same index in each
//! child, and exposes their tracks one after the other.

use std::any::Any;
use std::sync::Arc;

use td_buffer::{ReadResult, SampleBuffer};
use td_core::{Error, Format, Result, SourceId};
use td_timeline::{MergedTimeline, SharedTimeline, Timeline};

use crate::period::{MediaPeriod, PeriodId};
use crate::source::{publish, ChildSource, MediaSource, SourceEventSender};

pub struct MergingSource {
    id: SourceId,
    children: Vec<ChildSource>,
    clip_durations: bool,
    listener: Option<SourceEventSender>,
    timeline: Option<SharedTimeline>,
}

impl MergingSource {
    /// Merge `sources`. With `clip_durations`, each period lasts as long as
    /// the shortest child's. Panics if `sources` is empty.
    pub fn new(sources: Vec<Box<dyn MediaSource>>, clip_durations: bool) -> Self {
        assert!(!sources.is_empty(), "merge needs at least one source");
        Self {
            id: SourceId::new(),
            children: sources.into_iter().map(ChildSource::new).collect(),
            clip_durations,
            listener: None,
            timeline: None,
        }
    }

    pub fn timeline(&self) -> Option<SharedTimeline> {
        self.timeline.clone()
    }

    /// Refresh every child and rebuild once all of them have reported.
    fn absorb_child_timelines(&mut self) -> Result<bool> {
        let mut changed = false;
        for child in &mut self.children {
            changed |= child.refresh()?;
        }
        if !changed {
            return Ok(false);
        }
        let Some(timelines) = self
            .children
            .iter()
            .map(|child| child.timeline.clone())
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(false);
        };
        let merged = MergedTimeline::new(timelines, self.clip_durations)
            .inspect_err(|failure| tracing::warn!(source = %self.id, %failure, "merge rejected"))
            .map_err(Error::IllegalMerge)?;
        let timeline: SharedTimeline = Arc::new(Timeline::from(merged));
        self.timeline = Some(Arc::clone(&timeline));
        publish(
            self.listener.as_ref(),
            timeline,
            self.children[0].manifest.clone(),
        );
        Ok(true)
    }

    /// Period ids in each child for the merged period `id`.
    fn child_ids(&self, id: &PeriodId) -> Result<Vec<PeriodId>> {
        let timeline = self.timeline.as_ref().ok_or_else(|| {
            Error::Internal(format!(
                "period {} requested before all merged sources published a timeline",
                id.uid
            ))
        })?;
        let period_index = timeline
            .index_of_period(&id.uid)
            .ok_or_else(|| Error::not_found("period", &id.uid))?;
        self.children
            .iter()
            .map(|child| {
                let child_timeline = child
                    .timeline
                    .as_ref()
                    .ok_or_else(|| Error::Internal("merged source lost its timeline".into()))?;
                Ok(id.with_uid(child_timeline.uid_of_period(period_index)))
            })
            .collect()
    }
}

impl MediaSource for MergingSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn prepare(&mut self, listener: SourceEventSender) -> Result<()> {
        self.listener = Some(listener);
        for child in &mut self.children {
            child.prepare()?;
        }
        self.absorb_child_timelines()?;
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        self.absorb_child_timelines()
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        let child_ids = self.child_ids(id)?;
        let mut periods = Vec::with_capacity(child_ids.len());
        for (child, child_id) in self.children.iter_mut().zip(&child_ids) {
            periods.push(child.source.create_period(child_id)?);
        }
        Ok(Box::new(MergingPeriod::new(periods, child_ids)))
    }

    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>) {
        let merging = match period.into_any().downcast::<MergingPeriod>() {
            Ok(merging) => merging,
            Err(_) => {
                tracing::warn!(period = %id.uid, "released period was not created here");
                return;
            }
        };
        let MergingPeriod {
            periods, child_ids, ..
        } = *merging;
        for ((child, child_id), period) in self.children.iter_mut().zip(&child_ids).zip(periods) {
            child.source.release_period(child_id, period);
        }
    }

    fn release(&mut self) {
        for child in &mut self.children {
            child.release();
        }
        self.timeline = None;
        self.listener = None;
    }
}

/// Child periods played in sync. Track `i` of the merged period is looked up
/// through a table of `(child, child track)` pairs built at preparation.
pub struct MergingPeriod {
    periods: Vec<Box<dyn MediaPeriod>>,
    child_ids: Vec<PeriodId>,
    tracks: Vec<(usize, usize)>,
}

impl MergingPeriod {
    fn new(periods: Vec<Box<dyn MediaPeriod>>, child_ids: Vec<PeriodId>) -> Self {
        Self {
            periods,
            child_ids,
            tracks: Vec::new(),
        }
    }

    fn build_track_table(&mut self) {
        self.tracks = self
            .periods
            .iter()
            .enumerate()
            .flat_map(|(child, period)| {
                (0..period.track_groups().len()).map(move |track| (child, track))
            })
            .collect();
    }
}

impl MediaPeriod for MergingPeriod {
    fn prepare(&mut self, position_us: i64) -> Result<()> {
        for period in &mut self.periods {
            period.prepare(position_us)?;
        }
        self.build_track_table();
        Ok(())
    }

    fn is_prepared(&self) -> bool {
        self.periods.iter().all(|period| period.is_prepared())
    }

    fn track_groups(&self) -> Vec<Format> {
        self.periods
            .iter()
            .flat_map(|period| period.track_groups())
            .collect()
    }

    fn select_tracks(&mut self, enabled: &[bool], position_us: i64) -> i64 {
        assert_eq!(enabled.len(), self.tracks.len(), "one selection flag per track");
        let mut per_child: Vec<Vec<bool>> = self
            .periods
            .iter()
            .map(|period| vec![false; period.track_groups().len()])
            .collect();
        for (&(child, track), &enable) in self.tracks.iter().zip(enabled) {
            per_child[child][track] = enable;
        }
        let mut selections = per_child.iter();
        let (primary, others) = self.periods.split_at_mut(1);
        let position_us = match selections.next() {
            Some(selection) => primary[0].select_tracks(selection, position_us),
            None => position_us,
        };
        for (period, selection) in others.iter_mut().zip(selections) {
            period.select_tracks(selection, position_us);
        }
        position_us
    }

    fn read(
        &mut self,
        track: usize,
        buffer: &mut SampleBuffer,
        format_required: bool,
    ) -> Result<ReadResult> {
        let (child, child_track) = self.tracks[track];
        self.periods[child].read(child_track, buffer, format_required)
    }

    /// Seek the first child, then bring the others to where it landed.
    fn seek_to(&mut self, position_us: i64) -> i64 {
        let (primary, others) = self.periods.split_at_mut(1);
        let position_us = primary[0].seek_to(position_us);
        for period in others {
            period.seek_to(position_us);
        }
        position_us
    }

    fn discard_buffer(&mut self, position_us: i64) {
        for period in &mut self.periods {
            period.discard_buffer(position_us);
        }
    }

    fn buffered_position_us(&self) -> Option<i64> {
        self.periods
            .iter()
            .filter_map(|period| period.buffered_position_us())
            .min()
    }

    fn next_load_position_us(&self) -> Option<i64> {
        self.periods
            .iter()
            .filter_map(|period| period.next_load_position_us())
            .min()
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        let mut progressed = false;
        for period in &mut self.periods {
            progressed |= period.continue_loading(position_us);
        }
        progressed
    }

    fn maybe_throw_error(&mut self) -> Result<()> {
        for period in &mut self.periods {
            period.maybe_throw_error()?;
        }
        Ok(())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
