//! Model persistence
//!
//! A `ModelSnapshot` captures everything a recognizer needs to answer
//! predictions exactly as before: patterns, transition tables, temporal
//! buckets, the history buffer and the session cursor. Collections are emitted
//! in a stable order so the same state always serializes to the same JSON.

use crate::error::WayfindError;
use crate::normalizer::{NormalizedEvent, SessionCursor};
use crate::temporal::TemporalBucket;
use crate::transition::TransitionTables;
use crate::types::BrowsingPattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot format version
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Serialized history buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Capacity in effect at export time
    pub capacity: usize,
    /// Oldest first
    pub events: Vec<NormalizedEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub patterns: Vec<BrowsingPattern>,
    pub transitions: TransitionTables,
    pub temporal: Vec<TemporalBucket>,
    pub history: HistorySnapshot,
    #[serde(default)]
    pub session: SessionCursor,
    #[serde(default)]
    pub events_processed: u64,
    #[serde(default)]
    pub malformed_events: u64,
}

impl ModelSnapshot {
    /// Parse and version-check a snapshot
    pub fn from_json(json: &str) -> Result<Self, WayfindError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String, WayfindError> {
        serde_json::to_string(self).map_err(|e| WayfindError::EncodingError(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, WayfindError> {
        serde_json::to_string_pretty(self).map_err(|e| WayfindError::EncodingError(e.to_string()))
    }

    /// Only the major version has to match
    pub fn check_version(&self) -> Result<(), WayfindError> {
        let major = |v: &str| v.split('.').next().map(str::to_string);
        if major(&self.version) == major(SNAPSHOT_VERSION) {
            Ok(())
        } else {
            Err(WayfindError::SnapshotVersion(self.version.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn empty() -> ModelSnapshot {
        ModelSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            exported_at: Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap(),
            patterns: Vec::new(),
            transitions: TransitionTables::default(),
            temporal: Vec::new(),
            history: HistorySnapshot {
                capacity: 1000,
                events: Vec::new(),
            },
            session: SessionCursor::default(),
            events_processed: 0,
            malformed_events: 0,
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let snapshot = empty();
        let json = snapshot.to_json().unwrap();
        assert_eq!(ModelSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_minor_version_accepted() {
        let mut snapshot = empty();
        snapshot.version = "1.4.2".to_string();
        assert!(snapshot.check_version().is_ok());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut snapshot = empty();
        snapshot.version = "2.0.0".to_string();
        let json = snapshot.to_json().unwrap();

        let err = ModelSnapshot::from_json(&json).unwrap_err();
        assert!(matches!(err, WayfindError::SnapshotVersion(v) if v == "2.0.0"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            ModelSnapshot::from_json("{\"version\": 1}"),
            Err(WayfindError::JsonError(_))
        ));
    }
}
