//! Error handling for Terratime
//!
//! Nothing in the compositor, builder or scheduler is fatal. Each failure
//! degrades to a retained previous state, a skipped unit of work, or a
//! reported status. The types below make those outcomes observable.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for Terratime operations
pub type Result<T> = std::result::Result<T, TerraError>;

/// A raster source failed to load for a layer slot.
///
/// The slot keeps showing its last good date; the load is not retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Source load failed for layer '{layer_id}' at {date}: {reason}")]
pub struct SourceLoadError {
    pub layer_id: String,
    pub date: NaiveDate,
    pub reason: String,
}

/// A single date failed while building a frame sequence.
///
/// The date is omitted from the sequence and recorded in the build report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Snapshot fetch failed for {date}: {reason}")]
pub struct SequenceFetchError {
    pub date: NaiveDate,
    pub reason: String,
}

/// Playback conditions reported as status rather than raised.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Nothing to play: the frame sequence is empty")]
    NothingToPlay,
}

/// Main error type for Terratime operations
#[derive(Error, Debug)]
pub enum TerraError {
    // Imagery Errors
    #[error(transparent)]
    SourceLoad(#[from] SourceLoadError),

    #[error(transparent)]
    SequenceFetch(#[from] SequenceFetchError),

    // Request Errors
    #[error("Invalid date range: {reason}")]
    InvalidRange { reason: String },

    #[error("Unknown layer: {layer_id}")]
    UnknownLayer { layer_id: String },

    #[error("A frame sequence build is already in progress")]
    BuildInProgress,

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Transport Errors
    #[error("HTTP request failed: {reason}")]
    Http { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TerraError {
    /// Shorthand for an invalid range with a formatted reason.
    pub fn invalid_range(reason: impl Into<String>) -> Self {
        TerraError::InvalidRange {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            TerraError::SourceLoad(_) => "SOURCE_LOAD_ERROR",
            TerraError::SequenceFetch(_) => "SEQUENCE_FETCH_ERROR",
            TerraError::InvalidRange { .. } => "INVALID_RANGE",
            TerraError::UnknownLayer { .. } => "UNKNOWN_LAYER",
            TerraError::BuildInProgress => "BUILD_IN_PROGRESS",
            TerraError::Playback(_) => "PLAYBACK_ERROR",
            TerraError::InvalidConfig { .. } => "INVALID_CONFIG",
            TerraError::Http { .. } => "HTTP_ERROR",
            TerraError::Io(_) => "IO_ERROR",
            TerraError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the engine in a usable state; the caller may
    /// simply retry or carry on with what was already rendered or built.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TerraError::SourceLoad(_)
                | TerraError::SequenceFetch(_)
                | TerraError::InvalidRange { .. }
                | TerraError::BuildInProgress
                | TerraError::Playback(_)
                | TerraError::Http { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TerraError::SourceLoad(_) => vec![
                "The layer keeps showing its previous date",
                "Pick another date or check the imagery service status",
            ],
            TerraError::SequenceFetch(_) => vec![
                "The date was skipped; the rest of the sequence is intact",
                "Rebuild later to fill the gap",
            ],
            TerraError::InvalidRange { .. } => vec![
                "Dates must be formatted as YYYY-MM-DD",
                "The end date must not precede the start date",
                "Shorten the range if it exceeds the configured maximum",
            ],
            TerraError::UnknownLayer { .. } => vec![
                "Run 'terratime-cli layers' to list available layers",
            ],
            TerraError::BuildInProgress => vec![
                "Wait for the running build to finish",
                "Cancel the running build before starting a new one",
            ],
            TerraError::Playback(PlaybackError::NothingToPlay) => {
                vec!["Build a frame sequence before starting playback"]
            }
            TerraError::InvalidConfig { .. } => vec![
                "Check the configuration file against the documented defaults",
            ],
            TerraError::Http { .. } => vec![
                "Check your network connection",
                "The imagery service may be temporarily unavailable",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_error_codes() {
        let err = TerraError::invalid_range("end precedes start");
        assert_eq!(err.error_code(), "INVALID_RANGE");
        assert_eq!(TerraError::BuildInProgress.error_code(), "BUILD_IN_PROGRESS");
    }

    #[test]
    fn test_source_load_error_converts() {
        let err: TerraError = SourceLoadError {
            layer_id: "sst".to_string(),
            date: date("2024-09-10"),
            reason: "timeout".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "SOURCE_LOAD_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "Source load failed for layer 'sst' at 2024-09-10: timeout"
        );
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = TerraError::Playback(PlaybackError::NothingToPlay);
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_config_errors_are_not_recoverable() {
        let err = TerraError::InvalidConfig {
            reason: "frame_interval_ms must be positive".to_string(),
        };
        assert!(!err.is_recoverable());
    }
}
