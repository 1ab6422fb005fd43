//! Core data types for the navigation pattern pipeline
//!
//! Events flow in from a browser observer, patterns accumulate in the Pattern
//! Database, predictions are computed on demand and never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for any pattern confidence
pub const MAX_PATTERN_CONFIDENCE: f64 = 0.95;

/// Category assigned to events whose URL cannot be parsed
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Kind of navigation event reported by the browser observer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationEventType {
    #[default]
    Navigation,
    Search,
    Interaction,
    #[serde(alias = "tab-management", alias = "tabManagement")]
    TabManagement,
}

/// Optional metadata attached to a navigation event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, alias = "tabId", skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Producer-supplied category hint (informational; the category key is
    /// always derived from the URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "searchTerms", skip_serializing_if = "Option::is_none")]
    pub search_terms: Option<String>,
}

/// A single navigation event from the browser observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationEvent {
    /// Event identifier (generated when the producer omits it)
    #[serde(default = "new_event_id")]
    pub id: String,
    /// Destination URL
    pub url: String,
    /// Referring URL, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// When the navigation happened
    pub timestamp: DateTime<Utc>,
    /// Time spent on the page in milliseconds, absent for instantaneous events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Event kind
    #[serde(rename = "type", alias = "event_type", default)]
    pub event_type: NavigationEventType,
    #[serde(default)]
    pub metadata: EventMetadata,
}

fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl NavigationEvent {
    /// Create a navigation event with a generated id
    pub fn new(url: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: new_event_id(),
            url: url.into(),
            referrer: None,
            timestamp,
            duration: None,
            event_type: NavigationEventType::Navigation,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Set the dwell time in milliseconds
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_type(mut self, event_type: NavigationEventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_search_terms(mut self, terms: impl Into<String>) -> Self {
        self.metadata.search_terms = Some(terms.into());
        self
    }
}

/// Detector that produced a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Sequential,
    Temporal,
    Category,
    Search,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Sequential => "sequential",
            PatternType::Temporal => "temporal",
            PatternType::Category => "category",
            PatternType::Search => "search",
        }
    }
}

/// Context captured each time a pattern is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternContext {
    /// Local hour of the observation (0-23)
    pub time_of_day: u8,
    /// Elapsed session time at the observation, in milliseconds
    pub session_duration_ms: u64,
}

/// A recurring structure in browsing behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowsingPattern {
    /// Stable key, `<type>:<sequence>`
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    /// String-encoded path of categories
    pub sequence: String,
    /// Number of observations
    pub frequency: u64,
    /// Confidence in `[0, MAX_PATTERN_CONFIDENCE]`
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
    /// Most recent observation contexts
    #[serde(default)]
    pub contexts: Vec<PatternContext>,
}

impl BrowsingPattern {
    /// Create a freshly observed pattern; confidence is clamped
    pub fn new(
        pattern_type: PatternType,
        sequence: impl Into<String>,
        confidence: f64,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let sequence = sequence.into();
        Self {
            id: Self::key(pattern_type, &sequence),
            pattern_type,
            sequence,
            frequency: 1,
            confidence: clamp_confidence(confidence),
            last_seen: seen_at,
            contexts: Vec::new(),
        }
    }

    /// Build the database key for a pattern
    pub fn key(pattern_type: PatternType, sequence: &str) -> String {
        format!("{}:{}", pattern_type.as_str(), sequence)
    }

    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency.max(1);
        self
    }

    pub fn with_context(mut self, context: PatternContext) -> Self {
        self.contexts.push(context);
        self
    }
}

/// Clamp a confidence into the pattern range
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, MAX_PATTERN_CONFIDENCE)
}

/// Signal that produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    Markov,
    Temporal,
    Session,
    Search,
}

/// Per-dimension evidence behind a prediction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionFactors {
    pub historical_frequency: f64,
    pub temporal_relevance: f64,
    pub context_similarity: f64,
}

impl PredictionFactors {
    /// Per-factor maximum of two factor sets
    pub fn max(self, other: Self) -> Self {
        Self {
            historical_frequency: self.historical_frequency.max(other.historical_frequency),
            temporal_relevance: self.temporal_relevance.max(other.temporal_relevance),
            context_similarity: self.context_similarity.max(other.context_similarity),
        }
    }
}

/// Supplementary detail on a merged prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetadata {
    /// Every signal that proposed this target, in a stable order
    pub sources: Vec<PredictionType>,
}

/// A ranked guess at the next navigation target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternPrediction {
    /// Predicted destination (category key)
    pub target_url: String,
    pub confidence: f64,
    /// Signal with the strongest contribution
    #[serde(rename = "type")]
    pub prediction_type: PredictionType,
    pub factors: PredictionFactors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PredictionMetadata>,
}

/// Optional context supplied at prediction time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionContext {
    /// Local hour of day (0-23)
    #[serde(default, alias = "timeOfDay", skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<u8>,
    /// Elapsed session time in milliseconds
    #[serde(default, alias = "sessionDuration", skip_serializing_if = "Option::is_none")]
    pub session_duration_ms: Option<u64>,
    #[serde(default, alias = "recentSearches", skip_serializing_if = "Option::is_none")]
    pub recent_searches: Option<Vec<String>>,
}

impl PredictionContext {
    pub fn with_time_of_day(mut self, hour: u8) -> Self {
        self.time_of_day = Some(hour);
        self
    }

    pub fn with_session_duration(mut self, duration_ms: u64) -> Self {
        self.session_duration_ms = Some(duration_ms);
        self
    }

    pub fn with_recent_searches<I, S>(mut self, searches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recent_searches = Some(searches.into_iter().map(Into::into).collect());
        self
    }
}

/// Resource and model-size figures for a monitoring collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub pattern_count: usize,
    /// Number of (source, target) transition entries
    pub transition_model_size: usize,
    pub average_processing_time_ms: f64,
    /// Approximate heap footprint of the model in bytes
    pub estimated_memory_usage: usize,
    pub events_processed: u64,
    pub malformed_events: u64,
    pub history_len: usize,
    pub history_capacity: usize,
    /// Detectors run on every Nth event
    pub detector_stride: u32,
}
