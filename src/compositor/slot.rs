//! Layer slot
//!
//! Double-buffered presentation of one logical layer. Every date change
//! loads into the hidden buffer, waits for the viewer's load notification,
//! crossfades, and only then releases the previously visible buffer.
//!
//! Each load is tagged with the slot's epoch, the buffer it targets and
//! the slot generation at the time of the request. Notifications whose tag no longer matches
//! the pending load are dropped, so the most recent request always wins
//! regardless of the order in which loads finish.

use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::viewer::{
    BufferId, LoadEvent, LoadNotifier, LoadOutcome, LoadTag, SourceHandle, SourceSpec, Viewer,
};
use crate::error::SourceLoadError;
use crate::layers::{LogicalLayer, StackPosition, TileUrlBuilder};

// ============================================================================
// Public types
// ============================================================================

/// How a single `request_date` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The slot now shows this date.
    Rendered(NaiveDate),
    /// The slot was already showing the requested content.
    Unchanged,
    /// A later request replaced this one before it became visible.
    Superseded,
    /// The layer was disabled before the request finished.
    Released,
    /// The source failed to load; the previous date stays visible.
    Failed(SourceLoadError),
}

impl SlotOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, SlotOutcome::Rendered(_) | SlotOutcome::Unchanged)
    }
}

/// Observable state of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSlotState {
    pub layer_id: String,
    pub active_buffer: BufferId,
    pub pending_buffer: Option<BufferId>,
    pub last_rendered_date: Option<NaiveDate>,
}

// ============================================================================
// Internal bookkeeping
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Attached {
    handle: SourceHandle,
    date: NaiveDate,
}

#[derive(Debug)]
struct PendingLoad {
    buffer: BufferId,
    generation: u64,
    date: NaiveDate,
    waiters: Vec<oneshot::Sender<SlotOutcome>>,
}

#[derive(Debug)]
struct Crossfade {
    incoming: BufferId,
    date: NaiveDate,
    deadline: Instant,
    waiters: Vec<oneshot::Sender<SlotOutcome>>,
}

fn resolve(waiters: Vec<oneshot::Sender<SlotOutcome>>, outcome: SlotOutcome) {
    for waiter in waiters {
        // Callers may drop their ticket without waiting.
        let _ = waiter.send(outcome.clone());
    }
}

// ============================================================================
// LayerSlot
// ============================================================================

#[derive(Debug)]
pub struct LayerSlot {
    layer: LogicalLayer,
    stack: StackPosition,
    epoch: u64,
    buffers: [Option<Attached>; 2],
    active: BufferId,
    generation: u64,
    pending: Option<PendingLoad>,
    fade: Option<Crossfade>,
    last_rendered_date: Option<NaiveDate>,
    last_error: Option<SourceLoadError>,
}

impl LayerSlot {
    /// Empty slot; nothing is attached until the first request.
    ///
    /// `epoch` must differ from that of any earlier slot of the same layer
    /// whose notifications may still be in flight.
    pub fn new(layer: LogicalLayer, stack: StackPosition, epoch: u64) -> Self {
        Self {
            layer,
            stack,
            epoch,
            buffers: [None, None],
            active: BufferId::A,
            generation: 0,
            pending: None,
            fade: None,
            last_rendered_date: None,
            last_error: None,
        }
    }

    /// Ask the slot to show `date`.
    ///
    /// The returned receiver resolves once the request is rendered,
    /// superseded, released or failed. Static layers load once; later
    /// requests resolve as [`SlotOutcome::Unchanged`].
    pub fn request_date<V: Viewer>(
        &mut self,
        date: NaiveDate,
        viewer: &mut V,
        events: &mpsc::UnboundedSender<LoadEvent>,
    ) -> oneshot::Receiver<SlotOutcome> {
        let (tx, rx) = oneshot::channel();
        let is_static = !self.layer.has_time_dimension;

        if let Some(fade) = self.fade.as_mut() {
            if is_static || fade.date == date {
                fade.waiters.push(tx);
                return rx;
            }
        }
        if let Some(pending) = self.pending.as_mut() {
            if is_static || pending.date == date {
                pending.waiters.push(tx);
                return rx;
            }
        }

        // A different date wins over whatever is in flight.
        self.finish_fade(viewer);
        self.supersede_pending(viewer);

        if self.active_handle().is_some() && (is_static || self.last_rendered_date == Some(date)) {
            let _ = tx.send(SlotOutcome::Unchanged);
            return rx;
        }

        let next = self.active.opposite();
        self.detach(next, viewer);
        self.generation += 1;

        let spec = SourceSpec {
            url: TileUrlBuilder::tile_url(&self.layer, date),
            min_zoom: self.layer.min_zoom,
            max_zoom: self.layer.max_zoom,
            stack: self.stack,
            label: format!("{}-{}", self.layer.id, next),
        };
        let handle = viewer.add_raster_source(&spec);
        viewer.set_opacity(handle, 0.0, Duration::ZERO);
        self.buffers[next.index()] = Some(Attached { handle, date });

        debug!(
            layer = %self.layer.id,
            %date,
            buffer = %next,
            generation = self.generation,
            "loading layer date"
        );

        let tag = LoadTag {
            layer_id: self.layer.id.clone(),
            epoch: self.epoch,
            buffer: next,
            generation: self.generation,
        };
        self.pending = Some(PendingLoad {
            buffer: next,
            generation: self.generation,
            date,
            waiters: vec![tx],
        });
        viewer.on_source_loaded(handle, LoadNotifier::new(tag, events.clone()));
        rx
    }

    /// Apply a load notification. Returns `false` when it was stale.
    ///
    /// A successful load starts the crossfade; a zero-length crossfade
    /// completes the swap immediately.
    pub fn handle_load<V: Viewer>(
        &mut self,
        event: &LoadEvent,
        viewer: &mut V,
        now: Instant,
        crossfade: Duration,
    ) -> bool {
        let matches_pending = event.tag.epoch == self.epoch
            && self.pending.as_ref().is_some_and(|pending| {
                pending.generation == event.tag.generation && pending.buffer == event.tag.buffer
            });
        if !matches_pending {
            trace!(
                layer = %self.layer.id,
                epoch = event.tag.epoch,
                buffer = %event.tag.buffer,
                generation = event.tag.generation,
                current = self.generation,
                "discarding stale load notification"
            );
            return false;
        }
        let Some(pending) = self.pending.take() else {
            return false;
        };

        match &event.outcome {
            LoadOutcome::Loaded => {
                let target = self.layer.target_opacity();
                if let Some(incoming) = self.handle_of(pending.buffer) {
                    viewer.set_opacity(incoming, target, crossfade);
                }
                if let Some(outgoing) = self.handle_of(pending.buffer.opposite()) {
                    viewer.set_opacity(outgoing, 0.0, crossfade);
                }
                self.fade = Some(Crossfade {
                    incoming: pending.buffer,
                    date: pending.date,
                    deadline: now + crossfade,
                    waiters: pending.waiters,
                });
                if crossfade.is_zero() {
                    self.finish_fade(viewer);
                }
            }
            LoadOutcome::Failed(reason) => self.fail_pending(pending, reason.clone(), viewer),
        }
        true
    }

    /// Give up on the load in flight, if any. The previous date stays
    /// visible and waiters resolve as failed.
    pub fn abandon_pending<V: Viewer>(
        &mut self,
        reason: impl Into<String>,
        viewer: &mut V,
    ) -> bool {
        match self.pending.take() {
            Some(pending) => {
                self.fail_pending(pending, reason.into(), viewer);
                true
            }
            None => false,
        }
    }

    fn fail_pending<V: Viewer>(&mut self, pending: PendingLoad, reason: String, viewer: &mut V) {
        self.detach(pending.buffer, viewer);
        warn!(
            layer = %self.layer.id,
            date = %pending.date,
            kept = ?self.last_rendered_date,
            %reason,
            "layer source failed to load"
        );
        let error = SourceLoadError {
            layer_id: self.layer.id.clone(),
            date: pending.date,
            reason,
        };
        self.last_error = Some(error.clone());
        resolve(pending.waiters, SlotOutcome::Failed(error));
    }

    /// Complete the crossfade if its deadline has passed.
    pub fn advance<V: Viewer>(&mut self, now: Instant, viewer: &mut V) -> bool {
        match &self.fade {
            Some(fade) if fade.deadline <= now => {
                self.finish_fade(viewer);
                true
            }
            _ => false,
        }
    }

    /// Detach both buffers without fading and resolve every waiter.
    pub fn release<V: Viewer>(mut self, viewer: &mut V) {
        self.detach(BufferId::A, viewer);
        self.detach(BufferId::B, viewer);
        if let Some(pending) = self.pending.take() {
            resolve(pending.waiters, SlotOutcome::Released);
        }
        if let Some(fade) = self.fade.take() {
            resolve(fade.waiters, SlotOutcome::Released);
        }
        debug!(layer = %self.layer.id, "layer released");
    }

    fn finish_fade<V: Viewer>(&mut self, viewer: &mut V) {
        let Some(fade) = self.fade.take() else {
            return;
        };
        self.detach(fade.incoming.opposite(), viewer);
        self.active = fade.incoming;
        self.last_rendered_date = Some(fade.date);
        self.last_error = None;
        debug!(layer = %self.layer.id, date = %fade.date, buffer = %fade.incoming, "swap settled");
        resolve(fade.waiters, SlotOutcome::Rendered(fade.date));
    }

    fn supersede_pending<V: Viewer>(&mut self, viewer: &mut V) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        debug!(
            layer = %self.layer.id,
            date = %pending.date,
            generation = pending.generation,
            "superseding pending load"
        );
        self.detach(pending.buffer, viewer);
        resolve(pending.waiters, SlotOutcome::Superseded);
    }

    fn detach<V: Viewer>(&mut self, buffer: BufferId, viewer: &mut V) {
        if let Some(attached) = self.buffers[buffer.index()].take() {
            trace!(layer = %self.layer.id, %buffer, date = %attached.date, "detach buffer");
            viewer.remove_source(attached.handle);
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn layer(&self) -> &LogicalLayer {
        &self.layer
    }

    pub fn stack(&self) -> StackPosition {
        self.stack
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// No load or crossfade in flight.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.fade.is_none()
    }

    /// When the running crossfade completes.
    pub fn deadline(&self) -> Option<Instant> {
        self.fade.as_ref().map(|fade| fade.deadline)
    }

    pub fn state(&self) -> LayerSlotState {
        LayerSlotState {
            layer_id: self.layer.id.clone(),
            active_buffer: self.active,
            pending_buffer: self.pending.as_ref().map(|pending| pending.buffer),
            last_rendered_date: self.last_rendered_date,
        }
    }

    /// Most recent load failure since the last successful swap.
    pub fn last_error(&self) -> Option<&SourceLoadError> {
        self.last_error.as_ref()
    }

    /// Source currently shown by the active buffer.
    pub fn active_handle(&self) -> Option<SourceHandle> {
        self.handle_of(self.active)
    }

    pub fn handle_of(&self, buffer: BufferId) -> Option<SourceHandle> {
        self.buffers[buffer.index()].map(|attached| attached.handle)
    }
}
