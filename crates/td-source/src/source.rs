//! The [`MediaSource`] trait and how sources publish timelines.

use tokio::sync::mpsc;

use td_core::{Manifest, Result, SourceId};
use td_timeline::SharedTimeline;

use crate::period::{MediaPeriod, PeriodId};

/// Notifications a source sends to whoever prepared it.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A new timeline replaces the previous one in full.
    TimelineRefreshed {
        timeline: SharedTimeline,
        manifest: Option<Manifest>,
    },
}

pub type SourceEventSender = mpsc::UnboundedSender<SourceEvent>;
pub type SourceEventReceiver = mpsc::UnboundedReceiver<SourceEvent>;

/// Provides a timeline and creates the periods in it.
///
/// Composite sources own their children and receive the children's events
/// on channels of their own; nothing is delivered until
/// [`poll`](MediaSource::poll) pumps those channels.
pub trait MediaSource: Send {
    /// Stable identity of this source.
    fn id(&self) -> SourceId;

    /// Start preparing. Timelines are sent to `listener`.
    fn prepare(&mut self, listener: SourceEventSender) -> Result<()>;

    /// Process pending child notifications and republish if anything changed.
    ///
    /// Returns whether a new timeline was published. Composition failures
    /// (illegal clipping or merging) are returned here.
    fn poll(&mut self) -> Result<bool>;

    /// Create the period named by `id`.
    fn create_period(&mut self, id: &PeriodId) -> Result<Box<dyn MediaPeriod>>;

    /// Release a period created with `id`.
    fn release_period(&mut self, id: &PeriodId, period: Box<dyn MediaPeriod>);

    /// Release all resources. The source may be prepared again afterwards.
    fn release(&mut self);
}

/// Send a timeline to `listener` if one is attached.
pub(crate) fn publish(
    listener: Option<&SourceEventSender>,
    timeline: SharedTimeline,
    manifest: Option<Manifest>,
) {
    let Some(listener) = listener else {
        return;
    };
    if listener
        .send(SourceEvent::TimelineRefreshed { timeline, manifest })
        .is_err()
    {
        tracing::debug!("timeline listener dropped");
    }
}

/// Latest timeline waiting on `receiver`, if any.
pub(crate) fn drain_latest(
    receiver: &mut SourceEventReceiver,
) -> Option<(SharedTimeline, Option<Manifest>)> {
    let mut latest = None;
    while let Ok(SourceEvent::TimelineRefreshed { timeline, manifest }) = receiver.try_recv() {
        latest = Some((timeline, manifest));
    }
    latest
}

/// A child source with the channel it reports on.
pub(crate) struct ChildSource {
    pub source: Box<dyn MediaSource>,
    pub receiver: SourceEventReceiver,
    sender: SourceEventSender,
    pub timeline: Option<SharedTimeline>,
    pub manifest: Option<Manifest>,
}

impl ChildSource {
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            source,
            receiver,
            sender,
            timeline: None,
            manifest: None,
        }
    }

    pub fn prepare(&mut self) -> Result<()> {
        self.source.prepare(self.sender.clone())
    }

    /// Poll the child and take its latest timeline. Returns whether the
    /// timeline changed.
    pub fn refresh(&mut self) -> Result<bool> {
        self.source.poll()?;
        match drain_latest(&mut self.receiver) {
            Some((timeline, manifest)) => {
                self.timeline = Some(timeline);
                self.manifest = manifest;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn release(&mut self) {
        self.source.release();
        while self.receiver.try_recv().is_ok() {}
        self.timeline = None;
        self.manifest = None;
    }
}
