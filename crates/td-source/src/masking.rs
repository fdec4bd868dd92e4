//! Hides a child source behind a placeholder until it reports a timeline.
//!
//! Periods requested while the placeholder is showing are handed out as
//! deferred [`MaskingPeriod`]s. Once the child reports, the source creates the
//! real child periods and the deferred periods pick them up on their next
//! call.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use td_buffer::{ReadResult, SampleBuffer};
use td_core::{Error, Format, Result, SourceId};
use td_timeline::{MaskedTimeline, SharedTimeline};

use crate::period::{MediaPeriod, PeriodId};
use crate::source::{publish, ChildSource, MediaSource, SourceEventSender};

/// Publishes a one-window placeholder until its child reports, then the
/// child's timeline with the first period renamed to the placeholder uid.
/// Periods created against the placeholder keep resolving after refresh.
pub struct MaskingSource {
    child: ChildSource,
    timeline: MaskedTimeline,
    listener: Option<SourceEventSender>,
    deferred: Vec<(PeriodId, Arc<Mutex<Binding>>)>,
}

impl MaskingSource {
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        Self {
            child: ChildSource::new(source),
            timeline: MaskedTimeline::placeholder(),
            listener: None,
            deferred: Vec::new(),
        }
    }

    /// The timeline as last published.
    pub fn timeline(&self) -> SharedTimeline {
        Arc::new(self.timeline.clone().into())
    }

    pub fn is_placeholder(&self) -> bool {
        self.timeline.is_placeholder()
    }

    /// Periods still waiting for the child's timeline.
    pub fn deferred_period_count(&self) -> usize {
        self.deferred.len()
    }

    fn publish_timeline(&self) {
        publish(
            self.listener.as_ref(),
            self.timeline(),
            self.child.manifest.clone(),
        );
    }

    fn absorb_child_timeline(&mut self) -> Result<bool> {
        if !self.child.refresh()? {
            return Ok(false);
        }
        let Some(real) = self.child.timeline.clone() else {
            return Ok(false);
        };
        self.timeline = if self.timeline.is_placeholder() {
            tracing::debug!(source = %self.id(), "child timeline unmasked");
            MaskedTimeline::with_real_timeline(real)
        } else {
            self.timeline.with_updated_timeline(real)
        };
        if !self.timeline.is_placeholder() {
            self.bind_deferred();
        }
        Ok(true)
    }

    /// Create the child periods of everything handed out under the placeholder.
    fn bind_deferred(&mut self) {
        for (id, binding) in std::mem::take(&mut self.deferred) {
            let child_id = id.with_uid(self.timeline.real_uid(&id.uid));
            tracing::debug!(period = %id.uid, child = %child_id.uid, "binding deferred period");
            *binding.lock() = match self.child.source.create_period(&child_id) {
                Ok(period) => Binding::Ready(period),
                Err(err) => Binding::Failed(err),
            };
        }
    }
}

impl MediaSource for MaskingSource {
    fn id(&self) -> SourceId {
        self.child.source.id()
    }

    fn prepare(&mut self, listener: SourceEventSender) -> Result<()> {
        self.listener = Some(listener);
        self.child.prepare()?;
        self.absorb_child_timeline()?;
        self.publish_timeline();
        Ok(())
    }

    fn poll(&mut self) -> Result<bool> {
        let changed = self.absorb_child_timeline()?;
        if changed {
            self.publish_timeline();
        }
        Ok(changed)
    }

    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>> {
        if self.timeline.is_placeholder() {
            self.poll()?;
        }
        if self.timeline.is_placeholder() {
            tracing::debug!(period = %id.uid, source = %self.id(), "deferring period");
            let binding = Arc::new(Mutex::new(Binding::Pending));
            self.deferred.push((id.clone(), Arc::clone(&binding)));
            return Ok(Box::new(MaskingPeriod::deferred(binding)));
        }
        let child_id = id.with_uid(self.timeline.real_uid(&id.uid));
        let period = self.child.source.create_period(&child_id)?;
        Ok(Box::new(MaskingPeriod::bound(period)))
    }

    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>) {
        let mut masking = match period.into_any().downcast::<MaskingPeriod>() {
            Ok(masking) => masking,
            Err(_) => {
                tracing::warn!(period = %id.uid, "released period was not created here");
                return;
            }
        };
        self.deferred.retain(|(_, binding)| !Arc::ptr_eq(binding, &masking.binding));
        masking.bind();
        if let Some(period) = masking.period.take() {
            let child_id = id.with_uid(self.timeline.real_uid(&id.uid));
            self.child.source.release_period(&child_id, period);
        }
    }

    fn release(&mut self) {
        self.deferred.clear();
        self.child.release();
        self.timeline = MaskedTimeline::placeholder();
        self.listener = None;
    }
}

/// State shared between a deferred period and the source that binds it.
enum Binding {
    Pending,
    Ready(Box<dyn MediaPeriod>),
    Failed(Error),
    Taken,
}

/// A child period, or a stand-in for one whose source has not reported yet.
///
/// Until bound it reports nothing prepared and nothing to read, and remembers
/// the requested position. Binding happens on the next call after the source
/// created the child period; a pending `prepare` is replayed then.
pub struct MaskingPeriod {
    binding: Arc<Mutex<Binding>>,
    period: Option<Box<dyn MediaPeriod>>,
    preparing: bool,
    position_us: i64,
    error: Option<Error>,
}

impl MaskingPeriod {
    fn deferred(binding: Arc<Mutex<Binding>>) -> Self {
        Self {
            binding,
            period: None,
            preparing: false,
            position_us: 0,
            error: None,
        }
    }

    fn bound(period: Box<dyn MediaPeriod>) -> Self {
        Self {
            period: Some(period),
            ..Self::deferred(Arc::new(Mutex::new(Binding::Taken)))
        }
    }

    pub fn is_bound(&self) -> bool {
        self.period.is_some()
    }

    /// Pick up the child period if the source created it. Returns whether
    /// the period is bound.
    fn bind(&mut self) -> bool {
        if self.period.is_some() {
            return true;
        }
        let taken = std::mem::replace(&mut *self.binding.lock(), Binding::Taken);
        match taken {
            Binding::Ready(mut period) => {
                if self.preparing {
                    if let Err(err) = period.prepare(self.position_us) {
                        self.error = Some(err);
                    }
                }
                self.period = Some(period);
                true
            }
            Binding::Failed(err) => {
                self.error = Some(err);
                false
            }
            Binding::Pending => {
                *self.binding.lock() = Binding::Pending;
                false
            }
            Binding::Taken => false,
        }
    }
}

impl MediaPeriod for MaskingPeriod {
    fn prepare(&mut self, position_us: i64) -> Result<()> {
        self.position_us = position_us;
        if let Some(period) = &mut self.period {
            return period.prepare(position_us);
        }
        self.preparing = true;
        self.bind();
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_prepared(&self) -> bool {
        self.period.as_ref().is_some_and(|period| period.is_prepared())
    }

    fn track_groups(&self) -> Vec<Format> {
        self.period
            .as_ref()
            .map(|period| period.track_groups())
            .unwrap_or_default()
    }

    fn select_tracks(&mut self, enabled: &[bool], position_us: i64) -> i64 {
        match &mut self.period {
            Some(period) => period.select_tracks(enabled, position_us),
            None => position_us,
        }
    }

    fn read(
        &mut self,
        track: usize,
        buffer: &mut SampleBuffer,
        format_required: bool,
    ) -> Result<ReadResult> {
        if !self.bind() {
            return Ok(ReadResult::NothingRead);
        }
        match &mut self.period {
            Some(period) => period.read(track, buffer, format_required),
            None => Ok(ReadResult::NothingRead),
        }
    }

    fn seek_to(&mut self, position_us: i64) -> i64 {
        match &mut self.period {
            Some(period) => period.seek_to(position_us),
            None => {
                self.position_us = position_us;
                position_us
            }
        }
    }

    fn discard_buffer(&mut self, position_us: i64) {
        if let Some(period) = &mut self.period {
            period.discard_buffer(position_us);
        }
    }

    fn buffered_position_us(&self) -> Option<i64> {
        match &self.period {
            Some(period) => period.buffered_position_us(),
            None => Some(self.position_us),
        }
    }

    fn next_load_position_us(&self) -> Option<i64> {
        match &self.period {
            Some(period) => period.next_load_position_us(),
            None => Some(self.position_us),
        }
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        if !self.bind() {
            return false;
        }
        match &mut self.period {
            Some(period) => period.continue_loading(position_us),
            None => false,
        }
    }

    fn maybe_throw_error(&mut self) -> Result<()> {
        self.bind();
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        match &mut self.period {
            Some(period) => period.maybe_throw_error(),
            None => Ok(()),
        }
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
