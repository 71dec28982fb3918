//! Layer Module
//!
//! Logical layer configuration and address construction:
//! - Layer catalog with stacking order
//! - Tile URL and WMS snapshot URL building
//! - Snapshot viewport

pub mod catalog;
pub mod tile_url;
pub mod viewport;

pub use catalog::{LayerCatalog, LogicalLayer, StackPosition, Tier};
pub use tile_url::{format_api_date, format_display_date, TileUrlBuilder};
pub use viewport::Viewport;
