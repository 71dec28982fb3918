//! Geographic viewport used for flattened snapshots.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerraError};

/// Visible extent in degrees plus the output image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Whole-globe extent at the given image size.
    pub fn global(width: u32, height: u32) -> Self {
        Self {
            west: -180.0,
            south: -90.0,
            east: 180.0,
            north: 90.0,
            width,
            height,
        }
    }

    /// Build a viewport from a `west,south,east,north` string.
    pub fn from_bbox(bbox: &str, width: u32, height: u32) -> Result<Self> {
        let parts: Vec<f64> = bbox
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| TerraError::InvalidConfig {
                reason: format!("bbox '{bbox}' is not numeric: {e}"),
            })?;

        let &[west, south, east, north] = parts.as_slice() else {
            return Err(TerraError::InvalidConfig {
                reason: format!("bbox '{bbox}' must have four values: west,south,east,north"),
            });
        };

        let viewport = Self {
            west,
            south,
            east,
            north,
            width,
            height,
        };
        viewport.validate()?;
        Ok(viewport)
    }

    pub fn validate(&self) -> Result<()> {
        if self.west >= self.east || self.south >= self.north {
            return Err(TerraError::InvalidConfig {
                reason: "viewport must satisfy west < east and south < north".to_string(),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(TerraError::InvalidConfig {
                reason: "viewport size must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// WMS 1.3.0 EPSG:4326 axis order: `south,west,north,east`.
    pub fn wms_bbox(&self) -> String {
        format!("{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::global(1200, 600)
    }
}
