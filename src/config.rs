//! Recognizer configuration
//!
//! All tunables live in one serde-friendly struct so a collaborator can ship a
//! partial JSON file and inherit the defaults for everything else.

use crate::error::WayfindError;
use serde::{Deserialize, Serialize};

/// Default History Buffer capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Default lower bound the governor may shrink the History Buffer to
pub const DEFAULT_HISTORY_FLOOR: usize = 500;

/// Default Pattern Database hard cap
pub const DEFAULT_MAX_PATTERNS: usize = 100;

/// Longest accepted session gap (one year)
pub const MAX_SESSION_GAP_MINUTES: i64 = 365 * 24 * 60;

/// Longest accepted pattern retention window (one year)
pub const MAX_PATTERN_RETENTION_DAYS: i64 = 365;

/// Tunables for a [`PatternRecognizer`](crate::pipeline::PatternRecognizer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Initial (and maximum) History Buffer capacity
    pub history_capacity: usize,
    /// Capacity floor for the Performance Governor
    pub history_floor: usize,

    /// Number of ingested events between transition normalization passes
    pub normalization_interval: u64,
    /// Scaling applied to raw transition counts on every normalization pass
    pub transition_decay: f64,
    /// Decayed counts below this weight are evicted
    pub min_transition_weight: f64,

    /// Samples retained per (day, hour) bucket
    pub temporal_sample_cap: usize,
    /// Minimum hour similarity for a bucket to count as "similar"
    pub temporal_similarity_threshold: f64,
    /// Measure hour distance around the clock (23:00 is one hour from 00:00)
    pub circular_hours: bool,
    /// Fixed offset applied to event timestamps before deriving day and hour
    pub utc_offset_minutes: i32,
    /// Inactivity gap that closes a session
    pub session_gap_minutes: i64,

    /// Events scanned by the sequential detector
    pub sequence_window: usize,
    /// Length of the category subsequences the sequential detector tracks
    pub sequence_length: usize,
    /// Events scanned by the category detector
    pub category_window: usize,
    /// Share of the category window a category must hold
    pub category_min_share: f64,
    /// Events sharing a (day, hour) slot before a temporal pattern is emitted
    pub temporal_min_support: usize,

    /// Pattern Database hard cap
    pub max_patterns: usize,
    /// Patterns unseen for longer than this are prune candidates
    pub pattern_retention_days: i64,
    /// Prune candidates below this confidence are removed
    pub pattern_prune_confidence: f64,
    /// Confidence added on each re-observation
    pub confidence_step: f64,

    /// Number of predictions returned by `predict`
    pub max_predictions: usize,
    /// Markov targets below this probability are not emitted
    pub markov_min_probability: f64,

    /// Per-event processing ceiling in milliseconds
    pub processing_ceiling_ms: f64,
    /// History capacity removed (or restored) per governor adjustment
    pub capacity_step: usize,
    /// Consecutive fast events before capacity grows back
    pub recovery_events: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_floor: DEFAULT_HISTORY_FLOOR,
            normalization_interval: 50,
            transition_decay: 0.95,
            min_transition_weight: 0.01,
            temporal_sample_cap: 100,
            temporal_similarity_threshold: 0.7,
            circular_hours: true,
            utc_offset_minutes: 0,
            session_gap_minutes: 30,
            sequence_window: 10,
            sequence_length: 3,
            category_window: 20,
            category_min_share: 0.3,
            temporal_min_support: 5,
            max_patterns: DEFAULT_MAX_PATTERNS,
            pattern_retention_days: 7,
            pattern_prune_confidence: 0.5,
            confidence_step: 0.05,
            max_predictions: 5,
            markov_min_probability: 0.1,
            processing_ceiling_ms: 5.0,
            capacity_step: 50,
            recovery_events: 500,
        }
    }
}

impl RecognizerConfig {
    /// Load a configuration from JSON, filling absent fields with defaults
    pub fn from_json(json: &str) -> Result<Self, WayfindError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the recognizer cannot honour
    pub fn validate(&self) -> Result<(), WayfindError> {
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity must be greater than zero"));
        }
        if self.history_floor == 0 || self.history_floor > self.history_capacity {
            return Err(invalid(format!(
                "history_floor must be in 1..={}, got {}",
                self.history_capacity, self.history_floor
            )));
        }
        if self.max_patterns == 0 {
            return Err(invalid("max_patterns must be greater than zero"));
        }
        if self.normalization_interval == 0 {
            return Err(invalid("normalization_interval must be greater than zero"));
        }
        if self.sequence_length < 2 || self.sequence_window < self.sequence_length {
            return Err(invalid(
                "sequence_length must be at least 2 and fit inside sequence_window",
            ));
        }
        if self.category_window == 0 || self.temporal_sample_cap == 0 {
            return Err(invalid("category_window and temporal_sample_cap must be non-zero"));
        }
        if self.max_predictions == 0 {
            return Err(invalid("max_predictions must be greater than zero"));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid("utc_offset_minutes must be within one day"));
        }
        if !(1..=MAX_SESSION_GAP_MINUTES).contains(&self.session_gap_minutes) {
            return Err(invalid(format!(
                "session_gap_minutes must be in 1..={MAX_SESSION_GAP_MINUTES}, got {}",
                self.session_gap_minutes
            )));
        }
        if !(1..=MAX_PATTERN_RETENTION_DAYS).contains(&self.pattern_retention_days) {
            return Err(invalid(format!(
                "pattern_retention_days must be in 1..={MAX_PATTERN_RETENTION_DAYS}, got {}",
                self.pattern_retention_days
            )));
        }
        if self.processing_ceiling_ms <= 0.0 {
            return Err(invalid("processing_ceiling_ms must be positive"));
        }

        let unit_fields = [
            ("transition_decay", self.transition_decay),
            ("temporal_similarity_threshold", self.temporal_similarity_threshold),
            ("category_min_share", self.category_min_share),
            ("pattern_prune_confidence", self.pattern_prune_confidence),
            ("confidence_step", self.confidence_step),
            ("markov_min_probability", self.markov_min_probability),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.transition_decay == 0.0 {
            return Err(invalid("transition_decay must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> WayfindError {
    WayfindError::InvalidConfig(msg.into())
}
