//! Compositor
//!
//! Owns the enabled layers and their slots. Rendering a date fans the
//! request out to every enabled slot; load notifications come back over a
//! single channel and are routed to the slot named in their tag.
//!
//! Slots are keyed by stack position, so iteration is always base layers
//! first, then overlays in declaration order, no matter in which order the
//! layers were enabled.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use super::slot::{LayerSlot, LayerSlotState, SlotOutcome};
use super::viewer::{LoadEvent, Viewer};
use crate::config::{EngineConfig, DEFAULT_LOAD_TIMEOUT_MS};
use crate::error::{Result, SourceLoadError, TerraError};
use crate::layers::{LayerCatalog, StackPosition};

// ============================================================================
// Render tickets
// ============================================================================

/// Pending per-layer outcomes of one render request.
///
/// Waiting only makes progress while the compositor is being pumped or
/// settled.
#[derive(Debug)]
pub struct RenderTicket {
    date: NaiveDate,
    pending: Vec<(String, oneshot::Receiver<SlotOutcome>)>,
}

impl RenderTicket {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Layers this request went out to, bottom to top.
    pub fn layer_ids(&self) -> Vec<&str> {
        self.pending.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Wait for every layer to finish.
    pub async fn wait(self) -> RenderReport {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        for (layer_id, rx) in self.pending {
            // A dropped sender means the slot went away with the request.
            let outcome = rx.await.unwrap_or(SlotOutcome::Released);
            outcomes.push((layer_id, outcome));
        }
        RenderReport {
            date: self.date,
            outcomes,
        }
    }
}

/// Per-layer result of a render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReport {
    pub date: NaiveDate,
    pub outcomes: Vec<(String, SlotOutcome)>,
}

impl RenderReport {
    /// Every layer shows the requested content.
    pub fn is_rendered(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_rendered())
    }

    pub fn errors(&self) -> Vec<&SourceLoadError> {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                SlotOutcome::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    pub fn outcome(&self, layer_id: &str) -> Option<&SlotOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == layer_id)
            .map(|(_, outcome)| outcome)
    }
}

// ============================================================================
// Compositor
// ============================================================================

pub struct Compositor<V: Viewer> {
    viewer: V,
    catalog: LayerCatalog,
    slots: BTreeMap<StackPosition, LayerSlot>,
    events_tx: mpsc::UnboundedSender<LoadEvent>,
    events_rx: mpsc::UnboundedReceiver<LoadEvent>,
    crossfade: Duration,
    load_timeout: Duration,
    current_date: Option<NaiveDate>,
    /// Epoch handed to the next slot created.
    next_epoch: u64,
}

impl<V: Viewer> Compositor<V> {
    /// Compositor with no layers enabled.
    pub fn new(viewer: V, catalog: LayerCatalog, crossfade: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            viewer,
            catalog,
            slots: BTreeMap::new(),
            events_tx,
            events_rx,
            crossfade,
            load_timeout: Duration::from_millis(DEFAULT_LOAD_TIMEOUT_MS),
            current_date: None,
            next_epoch: 1,
        }
    }

    pub fn from_config(viewer: V, catalog: LayerCatalog, config: &EngineConfig) -> Self {
        Self::new(viewer, catalog, config.crossfade()).with_load_timeout(config.load_timeout())
    }

    /// How long `settle` waits for unreported loads before giving up on them.
    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    /// Enable or disable a layer.
    ///
    /// Enabling after a date has been rendered immediately requests that
    /// date for the new layer and returns its ticket. Disabling releases
    /// both buffers at once, without a fade.
    pub fn set_visible(&mut self, layer_id: &str, enabled: bool) -> Result<Option<RenderTicket>> {
        let layer = self.catalog.require(layer_id)?.clone();
        let stack = self
            .catalog
            .stack_position(layer_id)
            .ok_or_else(|| TerraError::UnknownLayer {
                layer_id: layer_id.to_string(),
            })?;

        if !enabled {
            if let Some(slot) = self.slots.remove(&stack) {
                slot.release(&mut self.viewer);
                info!(layer = %layer_id, "layer disabled");
            }
            return Ok(None);
        }

        if self.slots.contains_key(&stack) {
            return Ok(None);
        }

        info!(layer = %layer_id, tier = %stack.tier, "layer enabled");
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let mut slot = LayerSlot::new(layer, stack, epoch);
        let ticket = self.current_date.map(|date| {
            let rx = slot.request_date(date, &mut self.viewer, &self.events_tx);
            RenderTicket {
                date,
                pending: vec![(layer_id.to_string(), rx)],
            }
        });
        self.slots.insert(stack, slot);
        Ok(ticket)
    }

    /// Request `date` on every enabled layer, bottom to top.
    pub fn render_at_date(&mut self, date: NaiveDate) -> RenderTicket {
        debug!(%date, layers = self.slots.len(), "render at date");
        self.current_date = Some(date);

        let pending = self
            .slots
            .values_mut()
            .map(|slot| {
                let rx = slot.request_date(date, &mut self.viewer, &self.events_tx);
                (slot.layer().id.clone(), rx)
            })
            .collect();

        RenderTicket { date, pending }
    }

    /// Apply queued load notifications and finish crossfades due by `now`.
    ///
    /// Returns the number of notifications that were applied.
    pub fn pump(&mut self, now: Instant) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.dispatch(&event, now) {
                applied += 1;
            }
        }
        self.advance(now);
        applied
    }

    /// Drive loads and crossfades until every slot is idle.
    ///
    /// Loads still unreported after the load timeout are abandoned; their
    /// layers keep the previous date. Returns `false` when that happened.
    pub async fn settle(&mut self) -> bool {
        let mut give_up = Some(Instant::now() + self.load_timeout);
        loop {
            self.pump(Instant::now());
            if self.is_settled() {
                return give_up.is_some();
            }

            let wake = match (self.next_deadline(), give_up) {
                (Some(fade), Some(limit)) => Some(fade.min(limit)),
                (fade, limit) => fade.or(limit),
            };
            let event = tokio::select! {
                event = self.events_rx.recv() => event,
                _ = async {
                    match wake {
                        Some(wake) => sleep_until(wake).await,
                        None => std::future::pending::<()>().await,
                    }
                } => None,
            };

            if let Some(event) = event {
                self.dispatch(&event, Instant::now());
            } else if give_up.is_some_and(|limit| Instant::now() >= limit) {
                self.abandon_stalled_loads();
                give_up = None;
            }
        }
    }

    /// Render `date` and wait until it has settled on every layer.
    pub async fn render_and_settle(&mut self, date: NaiveDate) -> RenderReport {
        let ticket = self.render_at_date(date);
        self.settle().await;
        ticket.wait().await
    }

    fn dispatch(&mut self, event: &LoadEvent, now: Instant) -> bool {
        let slot = self
            .catalog
            .stack_position(&event.tag.layer_id)
            .and_then(|stack| self.slots.get_mut(&stack));

        match slot {
            Some(slot) => slot.handle_load(event, &mut self.viewer, now, self.crossfade),
            None => {
                trace!(layer = %event.tag.layer_id, "load notification for disabled layer");
                false
            }
        }
    }

    fn abandon_stalled_loads(&mut self) {
        let reason = format!("no load notification within {:?}", self.load_timeout);
        for slot in self.slots.values_mut() {
            if slot.abandon_pending(reason.as_str(), &mut self.viewer) {
                warn!(layer = %slot.layer().id, timeout = ?self.load_timeout, "abandoned stalled load");
            }
        }
    }

    fn advance(&mut self, now: Instant) {
        for slot in self.slots.values_mut() {
            slot.advance(now, &mut self.viewer);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().filter_map(LayerSlot::deadline).min()
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// No slot has a load or crossfade in flight.
    pub fn is_settled(&self) -> bool {
        self.slots.values().all(LayerSlot::is_idle)
    }

    pub fn is_enabled(&self, layer_id: &str) -> bool {
        self.catalog
            .stack_position(layer_id)
            .is_some_and(|stack| self.slots.contains_key(&stack))
    }

    pub fn slot_state(&self, layer_id: &str) -> Option<LayerSlotState> {
        self.catalog
            .stack_position(layer_id)
            .and_then(|stack| self.slots.get(&stack))
            .map(LayerSlot::state)
    }

    /// Enabled layer ids, bottom to top.
    pub fn enabled_layers(&self) -> Vec<&str> {
        self.slots
            .values()
            .map(|slot| slot.layer().id.as_str())
            .collect()
    }

    /// Latest load failure of every slot still showing an older date.
    pub fn source_errors(&self) -> Vec<&SourceLoadError> {
        self.slots
            .values()
            .filter_map(LayerSlot::last_error)
            .collect()
    }

    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current_date
    }

    pub fn crossfade(&self) -> Duration {
        self.crossfade
    }

    pub fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut V {
        &mut self.viewer
    }
}
