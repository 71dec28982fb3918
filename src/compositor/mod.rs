//! Compositor Module
//!
//! Flicker-free date changes for raster layers on an external viewer:
//! - Viewer capabilities and tagged load notifications
//! - Double-buffered layer slots with crossfade
//! - Compositor owning the enabled slots in stacking order
//! - In-memory recording viewer for headless use

pub mod recording;
pub mod render;
pub mod slot;
pub mod viewer;

pub use recording::{RecordedSource, RecordingViewer, ViewerCall};
pub use render::{Compositor, RenderReport, RenderTicket};
pub use slot::{LayerSlot, LayerSlotState, SlotOutcome};
pub use viewer::{
    BufferId, LoadEvent, LoadNotifier, LoadOutcome, LoadTag, SourceHandle, SourceSpec, Viewer,
};
