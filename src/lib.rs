//! Terratime - Temporal Satellite Imagery Engine
//!
//! Terratime swaps date-indexed raster layers over a map or globe viewer
//! without flicker, builds per-day frame sequences by sequential fetch, and
//! plays them back on a timer.
//!
//! # Architecture
//!
//! Two paths share the same layer model:
//! - Interactive: layer catalog -> tile URLs -> double-buffered layer slots -> compositor
//! - Offline: date range -> frame sequence builder (+ frame cache) -> playback scheduler -> compositor
//!
//! The viewer and the snapshot service are external collaborators, reached
//! through the [`compositor::Viewer`] and [`sequence::SnapshotFetcher`] traits.

pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod layers;
pub mod playback;
pub mod sequence;

pub use error::{Result, TerraError};
