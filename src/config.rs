//! Engine configuration
//!
//! Timing and sizing knobs for the compositor, builder and scheduler.
//! The crossfade duration and playback interval are plain parameters; no
//! correctness property depends on their particular values.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerraError};

/// Default crossfade duration in milliseconds.
pub const DEFAULT_CROSSFADE_MS: u64 = 300;

/// Default delay between playback frames in milliseconds.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 1000;

/// Default time a layer load may stay unreported before it is abandoned.
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;

/// Default number of frames kept by the frame cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Default longest accepted build range, in days.
pub const DEFAULT_MAX_RANGE_DAYS: usize = 366;

/// NASA GIBS WMS endpoint (EPSG:4326, "best" imagery).
pub const GIBS_WMS_URL: &str = "https://gibs.earthdata.nasa.gov/wms/epsg4326/best/wms.cgi";

/// Settings for WMS snapshot requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// WMS GetMap endpoint.
    pub wms_url: String,

    /// Image MIME type requested from the service.
    pub format: String,

    /// Coordinate reference system of the bounding box.
    pub crs: String,

    /// Request a transparent background.
    pub transparent: bool,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            wms_url: GIBS_WMS_URL.to_string(),
            format: "image/png".to_string(),
            crs: "EPSG:4326".to_string(),
            transparent: true,
            timeout_ms: 30_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Crossfade duration used by layer slots.
    pub crossfade_ms: u64,

    /// Delay between playback frames.
    pub frame_interval_ms: u64,

    /// How long the compositor waits for a layer source to load.
    pub load_timeout_ms: u64,

    /// Wrap to the first frame after the last one.
    pub loop_playback: bool,

    /// Frame cache capacity (0 disables caching).
    pub cache_capacity: usize,

    /// Longest accepted build range in days.
    pub max_range_days: usize,

    /// Snapshot request settings.
    pub snapshot: SnapshotConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: DEFAULT_CROSSFADE_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
            loop_playback: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.frame_interval_ms == 0 {
            return Err(TerraError::InvalidConfig {
                reason: "frame_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.load_timeout_ms == 0 {
            return Err(TerraError::InvalidConfig {
                reason: "load_timeout_ms must be greater than zero".to_string(),
            });
        }
        if self.max_range_days == 0 {
            return Err(TerraError::InvalidConfig {
                reason: "max_range_days must be greater than zero".to_string(),
            });
        }
        if self.snapshot.wms_url.trim().is_empty() {
            return Err(TerraError::InvalidConfig {
                reason: "snapshot.wms_url must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Crossfade duration.
    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    /// Longest wait for a layer source load.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Playback tick interval.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
