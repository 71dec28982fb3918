//! Snapshot providers
//!
//! The builder asks a [`SnapshotFetcher`] for one flattened frame per date.
//! `Ok(None)` and errors both mean the date is skipped.

use std::future::Future;

use chrono::NaiveDate;

use super::frame::{FramePayload, TileReference};
use crate::error::Result;
use crate::layers::{LayerCatalog, LogicalLayer, TileUrlBuilder, Viewport};

#[cfg(feature = "http")]
pub use wms::WmsSnapshotFetcher;

/// Source of per-date snapshots.
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch the snapshot for `date` over `viewport`.
    fn fetch_snapshot(
        &self,
        date: NaiveDate,
        viewport: &Viewport,
    ) -> impl Future<Output = Result<Option<FramePayload>>> + Send;

    /// Identifies everything besides the date that determines a snapshot.
    /// Used as the frame cache key.
    fn scene_key(&self, viewport: &Viewport) -> String;
}

/// Resolve layer ids against the catalog, keeping stacking order.
fn resolve_layers(catalog: &LayerCatalog, layer_ids: &[String]) -> Result<Vec<LogicalLayer>> {
    for id in layer_ids {
        catalog.require(id)?;
    }
    Ok(catalog
        .stacking_order()
        .into_iter()
        .filter(|layer| layer_ids.iter().any(|id| id == &layer.id))
        .cloned()
        .collect())
}

// ============================================================================
// Tile references (offline)
// ============================================================================

/// Produces tile-reference frames without touching the network.
#[derive(Debug, Clone)]
pub struct TileReferenceFetcher {
    layers: Vec<LogicalLayer>,
}

impl TileReferenceFetcher {
    pub fn new(catalog: &LayerCatalog, layer_ids: &[String]) -> Result<Self> {
        Ok(Self {
            layers: resolve_layers(catalog, layer_ids)?,
        })
    }

    pub fn layers(&self) -> &[LogicalLayer] {
        &self.layers
    }
}

impl SnapshotFetcher for TileReferenceFetcher {
    fn fetch_snapshot(
        &self,
        date: NaiveDate,
        _viewport: &Viewport,
    ) -> impl Future<Output = Result<Option<FramePayload>>> + Send {
        let tiles: Vec<TileReference> = self
            .layers
            .iter()
            .map(|layer| TileReference {
                layer_id: layer.id.clone(),
                url: TileUrlBuilder::tile_url(layer, date),
            })
            .collect();

        let payload = (!tiles.is_empty()).then_some(FramePayload::Tiles(tiles));
        std::future::ready(Ok(payload))
    }

    fn scene_key(&self, _viewport: &Viewport) -> String {
        let ids: Vec<&str> = self.layers.iter().map(|layer| layer.id.as_str()).collect();
        format!("tiles:{}", ids.join(","))
    }
}

// ============================================================================
// WMS snapshots
// ============================================================================

#[cfg(feature = "http")]
mod wms {
    use std::future::Future;
    use std::time::Duration;

    use chrono::NaiveDate;
    use tracing::debug;

    use super::resolve_layers;
    use crate::config::SnapshotConfig;
    use crate::error::{Result, TerraError};
    use crate::layers::{LayerCatalog, LogicalLayer, TileUrlBuilder, Viewport};
    use crate::sequence::fetch::SnapshotFetcher;
    use crate::sequence::frame::{FramePayload, ImageBlob};

    /// Fetches flattened GetMap images from a WMS endpoint.
    #[derive(Debug, Clone)]
    pub struct WmsSnapshotFetcher {
        client: reqwest::Client,
        config: SnapshotConfig,
        layers: Vec<LogicalLayer>,
    }

    impl WmsSnapshotFetcher {
        pub fn new(
            config: SnapshotConfig,
            catalog: &LayerCatalog,
            layer_ids: &[String],
        ) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .build()
                .map_err(|e| TerraError::Http {
                    reason: e.to_string(),
                })?;

            Ok(Self {
                client,
                config,
                layers: resolve_layers(catalog, layer_ids)?,
            })
        }

        fn url(&self, date: NaiveDate, viewport: &Viewport) -> String {
            let layers: Vec<&LogicalLayer> = self.layers.iter().collect();
            TileUrlBuilder::wms_get_map_url(&self.config, &layers, date, viewport)
        }
    }

    impl SnapshotFetcher for WmsSnapshotFetcher {
        fn fetch_snapshot(
            &self,
            date: NaiveDate,
            viewport: &Viewport,
        ) -> impl Future<Output = Result<Option<FramePayload>>> + Send {
            let url = self.url(date, viewport);
            let client = self.client.clone();
            let requested_format = self.config.format.clone();

            async move {
                debug!(%date, %url, "requesting snapshot");
                let http = |e: reqwest::Error| TerraError::Http {
                    reason: e.to_string(),
                };

                let response = client.get(&url).send().await.map_err(http)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(TerraError::Http {
                        reason: format!("snapshot request for {date} returned {status}"),
                    });
                }

                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
                    .unwrap_or(requested_format);

                // WMS services report request errors as XML with a 200 status.
                if !content_type.starts_with("image/") {
                    return Err(TerraError::Http {
                        reason: format!("service exception for {date} ({content_type})"),
                    });
                }

                let bytes = response.bytes().await.map_err(http)?;
                if bytes.is_empty() {
                    return Ok(None);
                }
                Ok(Some(FramePayload::Image(ImageBlob::new(
                    content_type,
                    bytes.to_vec(),
                ))))
            }
        }

        fn scene_key(&self, viewport: &Viewport) -> String {
            let names: Vec<&str> = self
                .layers
                .iter()
                .filter_map(|layer| layer.wms_name.as_deref())
                .collect();
            format!(
                "wms:{}:{}:{}x{}",
                names.join(","),
                viewport.wms_bbox(),
                viewport.width,
                viewport.height
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::range::parse_date;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_tile_references_in_stacking_order() {
        let catalog = LayerCatalog::gibs_default();
        let fetcher = TileReferenceFetcher::new(&catalog, &ids(&["sst", "bluemarble"])).unwrap();

        let payload = fetcher
            .fetch_snapshot(parse_date("2024-09-10").unwrap(), &Viewport::default())
            .await
            .unwrap()
            .unwrap();

        let FramePayload::Tiles(tiles) = payload else {
            panic!("expected tile references");
        };
        let layer_ids: Vec<&str> = tiles.iter().map(|tile| tile.layer_id.as_str()).collect();
        assert_eq!(layer_ids, vec!["bluemarble", "sst"]);
        assert!(tiles[1].url.contains("/2024-09-10/"));
    }

    #[test]
    fn test_unknown_layer_rejected() {
        let catalog = LayerCatalog::gibs_default();
        let err = TileReferenceFetcher::new(&catalog, &ids(&["sst", "ndvi"])).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_LAYER");
    }

    #[tokio::test]
    async fn test_no_layers_yields_no_snapshot() {
        let catalog = LayerCatalog::gibs_default();
        let fetcher = TileReferenceFetcher::new(&catalog, &[]).unwrap();
        let payload = fetcher
            .fetch_snapshot(parse_date("2024-09-10").unwrap(), &Viewport::default())
            .await
            .unwrap();
        assert!(payload.is_none());
    }

    #[test]
    fn test_scene_key_names_layers() {
        let catalog = LayerCatalog::gibs_default();
        let fetcher = TileReferenceFetcher::new(&catalog, &ids(&["sst"])).unwrap();
        assert_eq!(fetcher.scene_key(&Viewport::default()), "tiles:sst");
    }
}
