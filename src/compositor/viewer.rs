//! Viewer capabilities consumed by the compositor.
//!
//! The map or globe widget is an external collaborator. It only has to add
//! and remove raster sources, set their opacity, and report when a source
//! finished loading.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::layers::StackPosition;

/// Opaque handle for a raster source attached to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceHandle(pub u64);

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src-{}", self.0)
    }
}

/// One of the two alternating presentation buffers of a layer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    A,
    B,
}

impl BufferId {
    pub fn opposite(self) -> Self {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            BufferId::A => 0,
            BufferId::B => 1,
        }
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferId::A => write!(f, "A"),
            BufferId::B => write!(f, "B"),
        }
    }
}

/// Everything the viewer needs to attach a raster source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    /// Tile URL template with `{z}/{y}/{x}` left for the viewer.
    pub url: String,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Where the source sits in the stack; both buffers of a layer share it.
    pub stack: StackPosition,
    /// Viewer-side identifier, `<layer>-<buffer>`.
    pub label: String,
}

/// Identifies which request a load notification belongs to.
///
/// `epoch` names the slot instance; a layer that is disabled and enabled
/// again gets a new epoch, so notifications of the old slot never match
/// the new one even when buffer and generation coincide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTag {
    pub layer_id: String,
    pub epoch: u64,
    pub buffer: BufferId,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    Failed(String),
}

/// A tagged load notification delivered back to the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEvent {
    pub tag: LoadTag,
    pub outcome: LoadOutcome,
}

/// One-shot "source loaded" callback handed to the viewer.
///
/// Firing consumes the notifier. Dropping it without firing reports a
/// failure, so an abandoned source never leaves its request hanging on the
/// compositor side.
#[derive(Debug)]
pub struct LoadNotifier {
    tag: LoadTag,
    tx: Option<mpsc::UnboundedSender<LoadEvent>>,
}

impl LoadNotifier {
    pub(crate) fn new(tag: LoadTag, tx: mpsc::UnboundedSender<LoadEvent>) -> Self {
        Self { tag, tx: Some(tx) }
    }

    pub fn tag(&self) -> &LoadTag {
        &self.tag
    }

    /// Report that the source finished loading.
    pub fn loaded(mut self) {
        self.send(LoadOutcome::Loaded);
    }

    /// Report that the source could not be loaded.
    pub fn failed(mut self, reason: impl Into<String>) {
        self.send(LoadOutcome::Failed(reason.into()));
    }

    fn send(&mut self, outcome: LoadOutcome) {
        if let Some(tx) = self.tx.take() {
            // The compositor may already be gone; nothing left to notify.
            let _ = tx.send(LoadEvent {
                tag: self.tag.clone(),
                outcome,
            });
        }
    }
}

impl Drop for LoadNotifier {
    fn drop(&mut self) {
        self.send(LoadOutcome::Failed("load notification abandoned".to_string()));
    }
}

/// Raster capabilities of the map/globe viewer.
pub trait Viewer {
    /// Attach a raster source and return its handle.
    fn add_raster_source(&mut self, spec: &SourceSpec) -> SourceHandle;

    /// Ramp a source's opacity to `opacity` over `transition`.
    fn set_opacity(&mut self, handle: SourceHandle, opacity: f32, transition: Duration);

    /// Detach a source and release its resources.
    fn remove_source(&mut self, handle: SourceHandle);

    /// Fire `notifier` once the source has loaded (or failed to).
    fn on_source_loaded(&mut self, handle: SourceHandle, notifier: LoadNotifier);
}
