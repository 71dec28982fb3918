//! Tile and snapshot address construction.
//!
//! Stateless: every function maps `(layer, date)` to the address the viewer
//! or the snapshot fetcher should request.

use chrono::NaiveDate;

use crate::config::SnapshotConfig;
use crate::layers::catalog::LogicalLayer;
use crate::layers::viewport::Viewport;

/// Placeholder substituted with the layer's time parameter.
pub const TIME_PLACEHOLDER: &str = "{time}";

/// Date format expected by the imagery services.
pub const API_DATE_FORMAT: &str = "%Y-%m-%d";

/// Builds tile and snapshot URLs for logical layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileUrlBuilder;

impl TileUrlBuilder {
    /// Tile URL template for `layer` at `date`.
    ///
    /// Static layers return their template unchanged; the `{z}/{y}/{x}`
    /// placeholders are left for the viewer to fill.
    pub fn tile_url(layer: &LogicalLayer, date: NaiveDate) -> String {
        if layer.has_time_dimension {
            layer
                .url_template
                .replace(TIME_PLACEHOLDER, &Self::time_param(layer, date))
        } else {
            layer.url_template.clone()
        }
    }

    /// Value substituted for `{time}` (and sent as WMS `TIME`).
    pub fn time_param(layer: &LogicalLayer, date: NaiveDate) -> String {
        match &layer.time_suffix {
            Some(suffix) => format!("{}{}", format_api_date(date), suffix),
            None => format_api_date(date),
        }
    }

    /// WMS 1.3.0 GetMap request flattening `layers` into one image.
    ///
    /// Layers without a WMS name are skipped. Order is preserved, so pass
    /// layers bottom to top.
    pub fn wms_get_map_url(
        config: &SnapshotConfig,
        layers: &[&LogicalLayer],
        date: NaiveDate,
        viewport: &Viewport,
    ) -> String {
        let names: Vec<&str> = layers
            .iter()
            .filter_map(|layer| layer.wms_name.as_deref())
            .collect();

        let params = [
            ("SERVICE", "WMS".to_string()),
            ("VERSION", "1.3.0".to_string()),
            ("REQUEST", "GetMap".to_string()),
            ("FORMAT", config.format.clone()),
            ("TRANSPARENT", config.transparent.to_string()),
            ("LAYERS", names.join(",")),
            ("CRS", config.crs.clone()),
            ("STYLES", String::new()),
            ("WIDTH", viewport.width.to_string()),
            ("HEIGHT", viewport.height.to_string()),
            ("BBOX", viewport.wms_bbox()),
            ("TIME", format_api_date(date)),
        ];

        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        format!("{}?{}", config.wms_url, query.join("&"))
    }
}

/// `2024-09-09`
pub fn format_api_date(date: NaiveDate) -> String {
    date.format(API_DATE_FORMAT).to_string()
}

/// `Sep 9, 2024`
pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}
