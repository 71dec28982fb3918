//! Frames and frame sequences.
//!
//! A frame is immutable once produced. A sequence only accepts frames in
//! strictly increasing date order, so failed dates leave gaps but never
//! reorder or duplicate anything.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::range::DateRange;

// ============================================================================
// Payloads
// ============================================================================

/// Flattened snapshot image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub content_type: String,
    pub data: Arc<[u8]>,
    /// SHA-256 of `data`, lowercase hex.
    pub digest: String,
}

impl ImageBlob {
    pub fn new(content_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let digest = Sha256::digest(&data)
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        Self {
            content_type: content_type.into(),
            data,
            digest,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension matching the content type.
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

/// Tile template of one layer at a frame's date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileReference {
    pub layer_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Image(ImageBlob),
    Tiles(Vec<TileReference>),
}

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub date: NaiveDate,
    pub payload: FramePayload,
    /// Position in the owning sequence.
    pub sequence_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Idle,
    Building,
    Complete,
    Cancelled,
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Idle => write!(f, "idle"),
            BuildStatus::Building => write!(f, "building"),
            BuildStatus::Complete => write!(f, "complete"),
            BuildStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Ordered, possibly sparse list of per-date frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSequence {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frames: Vec<Frame>,
    pub requested_count: usize,
    pub built_count: usize,
    pub status: BuildStatus,
}

impl FrameSequence {
    /// Empty sequence for `range`.
    pub fn new(range: &DateRange) -> Self {
        Self {
            start_date: range.start(),
            end_date: range.end(),
            frames: Vec::new(),
            requested_count: range.day_count(),
            built_count: 0,
            status: BuildStatus::Idle,
        }
    }

    /// Append a frame for `date`.
    ///
    /// Returns `false` and leaves the sequence untouched unless `date` lies
    /// in the range and after the last frame.
    pub fn push_frame(&mut self, date: NaiveDate, payload: FramePayload) -> bool {
        let in_range = self.start_date <= date && date <= self.end_date;
        let ascending = self.frames.last().map_or(true, |last| last.date < date);
        if !in_range || !ascending {
            return false;
        }

        self.frames.push(Frame {
            date,
            payload,
            sequence_index: self.frames.len(),
        });
        self.built_count = self.frames.len();
        true
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn find_by_date(&self, date: NaiveDate) -> Option<&Frame> {
        self.frames
            .binary_search_by_key(&date, |frame| frame.date)
            .ok()
            .map(|index| &self.frames[index])
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.frames.iter().map(|frame| frame.date).collect()
    }
}
