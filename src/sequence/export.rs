//! Sequence export
//!
//! Writes the image frames of a sequence to a directory as
//! `frame_<index>_<date>.<ext>` next to a `manifest.json` describing every
//! frame and every skipped date.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::frame::{BuildStatus, FramePayload, FrameSequence, TileReference};
use crate::error::{Result, SequenceFetchError};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFrame {
    pub index: usize,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiles: Vec<TileReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFailure {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub requested_count: usize,
    pub built_count: usize,
    pub status: BuildStatus,
    pub frames: Vec<ManifestFrame>,
    pub failures: Vec<ManifestFailure>,
}

/// Write `sequence` into `dir`, creating it if needed.
pub fn write_sequence(
    sequence: &FrameSequence,
    failures: &[SequenceFetchError],
    dir: &Path,
) -> Result<ExportManifest> {
    fs::create_dir_all(dir)?;

    let mut frames = Vec::with_capacity(sequence.len());
    for frame in &sequence.frames {
        let entry = match &frame.payload {
            FramePayload::Image(blob) => {
                let file = format!(
                    "frame_{:04}_{}.{}",
                    frame.sequence_index,
                    frame.date,
                    blob.extension()
                );
                fs::write(dir.join(&file), &blob.data[..])?;
                ManifestFrame {
                    index: frame.sequence_index,
                    date: frame.date,
                    file: Some(file),
                    sha256: Some(blob.digest.clone()),
                    tiles: Vec::new(),
                }
            }
            FramePayload::Tiles(tiles) => ManifestFrame {
                index: frame.sequence_index,
                date: frame.date,
                file: None,
                sha256: None,
                tiles: tiles.clone(),
            },
        };
        frames.push(entry);
    }

    let manifest = ExportManifest {
        start_date: sequence.start_date,
        end_date: sequence.end_date,
        requested_count: sequence.requested_count,
        built_count: sequence.built_count,
        status: sequence.status,
        frames,
        failures: failures
            .iter()
            .map(|failure| ManifestFailure {
                date: failure.date,
                reason: failure.reason.clone(),
            })
            .collect(),
    };

    fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    info!(dir = %dir.display(), frames = manifest.frames.len(), "sequence exported");
    Ok(manifest)
}

/// Read a manifest written by [`write_sequence`].
pub fn read_manifest(dir: &Path) -> Result<ExportManifest> {
    let content = fs::read_to_string(dir.join(MANIFEST_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::frame::ImageBlob;
    use crate::sequence::range::{parse_date, DateRange};
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_export_writes_images_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = FrameSequence::new(&DateRange::parse("2024-09-09", "2024-09-11").unwrap());
        sequence.push_frame(
            date("2024-09-09"),
            FramePayload::Image(ImageBlob::new("image/png", vec![1, 2, 3])),
        );
        sequence.push_frame(
            date("2024-09-11"),
            FramePayload::Image(ImageBlob::new("image/jpeg", vec![4, 5])),
        );
        sequence.status = BuildStatus::Complete;
        let failures = vec![SequenceFetchError {
            date: date("2024-09-10"),
            reason: "HTTP request failed: 503".to_string(),
        }];

        let manifest = write_sequence(&sequence, &failures, dir.path()).unwrap();

        assert_eq!(
            fs::read(dir.path().join("frame_0000_2024-09-09.png")).unwrap(),
            vec![1, 2, 3]
        );
        assert!(dir.path().join("frame_0001_2024-09-11.jpg").exists());
        assert_eq!(manifest.failures.len(), 1);
        assert_eq!(read_manifest(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_tile_frames_listed_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = FrameSequence::new(&DateRange::parse("2024-09-09", "2024-09-09").unwrap());
        sequence.push_frame(
            date("2024-09-09"),
            FramePayload::Tiles(vec![TileReference {
                layer_id: "sst".to_string(),
                url: "https://tiles.example/sst/2024-09-09/{z}/{y}/{x}.png".to_string(),
            }]),
        );

        let manifest = write_sequence(&sequence, &[], dir.path()).unwrap();
        assert_eq!(manifest.frames[0].file, None);
        assert_eq!(manifest.frames[0].tiles.len(), 1);

        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
