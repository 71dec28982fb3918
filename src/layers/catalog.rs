//! Logical layer definitions and the layer catalog.
//!
//! A logical layer is immutable configuration: where its tiles come from,
//! whether they vary by date, and where it sits in the stack. The catalog
//! preserves declaration order, which fixes the overlay stacking order.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerraError};
use crate::layers::tile_url::TIME_PLACEHOLDER;

/// Opacity used for base layers configured with opacity 0.
const FALLBACK_BASE_OPACITY: f32 = 1.0;

/// Opacity used for overlay layers configured with opacity 0.
const FALLBACK_OVERLAY_OPACITY: f32 = 0.8;

/// Stacking tier. Base layers always render beneath overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Base,
    Overlay,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Base => write!(f, "base"),
            Tier::Overlay => write!(f, "overlay"),
        }
    }
}

/// Position of a layer in the viewer's stack.
///
/// Ordering is tier first, then declaration index, so sorting positions
/// yields the bottom-to-top drawing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackPosition {
    pub tier: Tier,
    pub index: usize,
}

/// A named raster source definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalLayer {
    /// Stable identifier used by the compositor.
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// Tile URL template; `{time}` is replaced for time-bearing layers.
    pub url_template: String,

    /// Whether the imagery varies by date.
    pub has_time_dimension: bool,

    /// Base layers sit beneath every overlay.
    #[serde(default)]
    pub is_base: bool,

    #[serde(default)]
    pub min_zoom: u8,

    pub max_zoom: u8,

    /// Target opacity once a swap settles.
    pub opacity: f32,

    /// Appended to the `YYYY-MM-DD` date for services that expect a timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_suffix: Option<String>,

    /// Layer name on the WMS endpoint, used for flattened snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wms_name: Option<String>,
}

impl LogicalLayer {
    /// Opacity a settled buffer is ramped to.
    pub fn target_opacity(&self) -> f32 {
        if self.opacity > 0.0 {
            self.opacity.min(1.0)
        } else if self.is_base {
            FALLBACK_BASE_OPACITY
        } else {
            FALLBACK_OVERLAY_OPACITY
        }
    }

    pub fn tier(&self) -> Tier {
        if self.is_base {
            Tier::Base
        } else {
            Tier::Overlay
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| TerraError::InvalidConfig { reason };

        if self.id.trim().is_empty() {
            return Err(invalid("layer id must not be empty".to_string()));
        }
        if self.min_zoom > self.max_zoom {
            return Err(invalid(format!(
                "layer '{}': min_zoom {} exceeds max_zoom {}",
                self.id, self.min_zoom, self.max_zoom
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(invalid(format!(
                "layer '{}': opacity {} outside [0, 1]",
                self.id, self.opacity
            )));
        }
        if self.has_time_dimension && !self.url_template.contains(TIME_PLACEHOLDER) {
            return Err(invalid(format!(
                "layer '{}': time-bearing template lacks {}",
                self.id, TIME_PLACEHOLDER
            )));
        }
        Ok(())
    }
}

/// Ordered, validated set of logical layers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCatalog {
    layers: Vec<LogicalLayer>,
}

impl LayerCatalog {
    /// Build a catalog, validating every layer and rejecting duplicate ids.
    pub fn new(layers: Vec<LogicalLayer>) -> Result<Self> {
        let mut seen = HashSet::new();
        for layer in &layers {
            layer.validate()?;
            if !seen.insert(layer.id.as_str()) {
                return Err(TerraError::InvalidConfig {
                    reason: format!("duplicate layer id '{}'", layer.id),
                });
            }
        }
        Ok(Self { layers })
    }

    /// Load a catalog from a JSON array of layers.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let layers: Vec<LogicalLayer> = serde_json::from_str(&content)?;
        Self::new(layers)
    }

    /// Built-in NASA GIBS catalog: a static Blue Marble base and three daily
    /// sea surface temperature overlays.
    pub fn gibs_default() -> Self {
        let wmts = "https://gibs.earthdata.nasa.gov/wmts/epsg3857/best";
        let overlay = |id: &str, name: &str, product: &str| LogicalLayer {
            id: id.to_string(),
            name: name.to_string(),
            url_template: format!(
                "{wmts}/{product}/default/{{time}}/GoogleMapsCompatible_Level7/{{z}}/{{y}}/{{x}}.png"
            ),
            has_time_dimension: true,
            is_base: false,
            min_zoom: 0,
            max_zoom: 7,
            opacity: 0.8,
            time_suffix: None,
            wms_name: Some(product.to_string()),
        };

        Self {
            layers: vec![
                LogicalLayer {
                    id: "bluemarble".to_string(),
                    name: "Blue Marble Shaded Relief".to_string(),
                    url_template: format!(
                        "{wmts}/BlueMarble_ShadedRelief_Bathymetry/default/2025-10-02/GoogleMapsCompatible_Level8/{{z}}/{{y}}/{{x}}.jpeg"
                    ),
                    has_time_dimension: false,
                    is_base: true,
                    min_zoom: 0,
                    max_zoom: 8,
                    opacity: 1.0,
                    time_suffix: None,
                    wms_name: Some("BlueMarble_NextGeneration".to_string()),
                },
                overlay(
                    "sst",
                    "Sea Surface Temperature (GHRSST MUR)",
                    "GHRSST_L4_MUR_Sea_Surface_Temperature",
                ),
                overlay(
                    "avhrr_sst",
                    "Sea Surface Temperature (AVHRR MetOp-B)",
                    "AVHRR_MetOp-B_L3U_Sea_Surface_Temperature",
                ),
                overlay(
                    "modis_sst_day",
                    "Sea Surface Temperature (MODIS Terra, Day)",
                    "MODIS_Terra_L2_Sea_Surface_Temp_Day",
                ),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&LogicalLayer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    /// Like [`get`](Self::get), but unknown ids become an error.
    pub fn require(&self, id: &str) -> Result<&LogicalLayer> {
        self.get(id).ok_or_else(|| TerraError::UnknownLayer {
            layer_id: id.to_string(),
        })
    }

    /// Stack position of a layer, derived from tier and declaration order.
    pub fn stack_position(&self, id: &str) -> Option<StackPosition> {
        self.layers
            .iter()
            .position(|layer| layer.id == id)
            .map(|index| StackPosition {
                tier: self.layers[index].tier(),
                index,
            })
    }

    /// Layers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &LogicalLayer> {
        self.layers.iter()
    }

    /// Layers bottom to top.
    pub fn stacking_order(&self) -> Vec<&LogicalLayer> {
        let mut ordered: Vec<(StackPosition, &LogicalLayer)> = self
            .layers
            .iter()
            .enumerate()
            .map(|(index, layer)| {
                (
                    StackPosition {
                        tier: layer.tier(),
                        index,
                    },
                    layer,
                )
            })
            .collect();
        ordered.sort_by_key(|(position, _)| *position);
        ordered.into_iter().map(|(_, layer)| layer).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: &str, is_base: bool) -> LogicalLayer {
        LogicalLayer {
            id: id.to_string(),
            name: id.to_string(),
            url_template: format!("https://tiles.example/{id}/{{time}}/{{z}}/{{y}}/{{x}}.png"),
            has_time_dimension: true,
            is_base,
            min_zoom: 0,
            max_zoom: 7,
            opacity: 0.8,
            time_suffix: None,
            wms_name: None,
        }
    }

    #[test]
    fn test_gibs_default_is_valid() {
        let catalog = LayerCatalog::gibs_default();
        let rebuilt = LayerCatalog::new(catalog.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.len(), 4);
        assert!(!catalog.get("bluemarble").unwrap().has_time_dimension);
        assert!(catalog.get("sst").unwrap().has_time_dimension);
    }

    #[test]
    fn test_base_layers_stack_below_overlays() {
        let catalog = LayerCatalog::new(vec![
            layer("clouds", false),
            layer("relief", true),
            layer("sst", false),
        ])
        .unwrap();

        let order: Vec<&str> = catalog
            .stacking_order()
            .iter()
            .map(|layer| layer.id.as_str())
            .collect();
        assert_eq!(order, vec!["relief", "clouds", "sst"]);
        assert!(catalog.stack_position("relief") < catalog.stack_position("clouds"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = LayerCatalog::new(vec![layer("sst", false), layer("sst", false)]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_time_layer_requires_placeholder() {
        let mut bad = layer("sst", false);
        bad.url_template = "https://tiles.example/sst/{z}/{y}/{x}.png".to_string();
        assert!(LayerCatalog::new(vec![bad]).is_err());
    }

    #[test]
    fn test_inverted_zoom_rejected() {
        let mut bad = layer("sst", false);
        bad.min_zoom = 9;
        assert!(LayerCatalog::new(vec![bad]).is_err());
    }

    #[test]
    fn test_target_opacity_fallbacks() {
        let mut base = layer("relief", true);
        base.opacity = 0.0;
        let mut overlay = layer("sst", false);
        overlay.opacity = 0.0;

        assert_eq!(base.target_opacity(), 1.0);
        assert_eq!(overlay.target_opacity(), 0.8);
        assert_eq!(layer("sst", false).target_opacity(), 0.8);
    }

    #[test]
    fn test_require_unknown_layer() {
        let catalog = LayerCatalog::gibs_default();
        let err = catalog.require("ndvi").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_LAYER");
    }
}
