//! Sequence Module
//!
//! Offline path from a date range to a playable frame sequence:
//! - Date ranges and date parsing
//! - Snapshot fetchers (tile references, WMS images)
//! - Sequential, cancellable frame sequence builder
//! - Frame cache and sequence export

pub mod builder;
pub mod cache;
pub mod export;
pub mod fetch;
pub mod frame;
pub mod range;

pub use builder::{BuildProgress, BuildReport, FrameSequenceBuilder};
pub use cache::{CacheStats, FrameCache, FrameKey};
pub use export::{read_manifest, write_sequence, ExportManifest};
#[cfg(feature = "http")]
pub use fetch::WmsSnapshotFetcher;
pub use fetch::{SnapshotFetcher, TileReferenceFetcher};
pub use frame::{BuildStatus, Frame, FramePayload, FrameSequence, ImageBlob, TileReference};
pub use range::{date_from_query, parse_date, DateRange};
