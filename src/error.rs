//! Error types for Synheart Wayfind
//!
//! The ingestion path never returns these: malformed events are absorbed and
//! counted. Errors only surface at the boundaries (configuration, JSON parsing,
//! snapshot import/export).

use thiserror::Error;

/// Errors that can occur at the recognizer boundaries
#[derive(Debug, Error)]
pub enum WayfindError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse navigation events: {0}")]
    ParseError(String),

    #[error("Unsupported snapshot version: {0}")]
    SnapshotVersion(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
