//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Wayfind. Each ingested
//! event flows through normalization → history → transition model → temporal
//! store → pattern detectors → pattern database, with the performance
//! governor timing the whole pass.

use crate::adapter::EventAdapter;
use crate::config::RecognizerConfig;
use crate::detectors::{DetectorInput, PatternDetectors};
use crate::error::WayfindError;
use crate::governor::{GovernorAction, PerformanceGovernor};
use crate::history::HistoryBuffer;
use crate::normalizer::{EventNormalizer, NormalizedEvent, SessionCursor};
use crate::patterns::PatternDatabase;
use crate::predictor::{ModelView, PredictionEngine};
use crate::snapshot::{HistorySnapshot, ModelSnapshot, SNAPSHOT_VERSION};
use crate::temporal::{TemporalKey, TemporalStore};
use crate::transition::TransitionModel;
use crate::types::{
    BrowsingPattern, NavigationEvent, PatternPrediction, PerformanceMetrics, PredictionContext,
    UNKNOWN_CATEGORY,
};
use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Replay a JSON array or NDJSON event stream into a fresh recognizer.
///
/// # Example
/// ```ignore
/// let recognizer = replay_events(&ndjson, RecognizerConfig::default())?;
/// let top = recognizer.top_patterns(10, 0.0);
/// ```
pub fn replay_events(
    raw_json: &str,
    config: RecognizerConfig,
) -> Result<PatternRecognizer, WayfindError> {
    let events = EventAdapter::parse(raw_json)?;
    let mut recognizer = PatternRecognizer::with_config(config)?;
    recognizer.ingest_all(events);
    Ok(recognizer)
}

/// Stateful, single-writer navigation pattern recognizer.
///
/// Use [`SharedRecognizer`] when ingestion and prediction happen on
/// different threads.
#[derive(Debug, Clone)]
pub struct PatternRecognizer {
    config: RecognizerConfig,
    normalizer: EventNormalizer,
    cursor: SessionCursor,
    history: HistoryBuffer,
    transitions: TransitionModel,
    temporal: TemporalStore,
    detectors: PatternDetectors,
    patterns: PatternDatabase,
    engine: PredictionEngine,
    governor: PerformanceGovernor,
    events_processed: u64,
    malformed_events: u64,
}

impl Default for PatternRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRecognizer {
    /// Create a recognizer with default settings
    pub fn new() -> Self {
        Self::build(RecognizerConfig::default())
    }

    /// Create a recognizer with a validated configuration
    pub fn with_config(config: RecognizerConfig) -> Result<Self, WayfindError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RecognizerConfig) -> Self {
        Self {
            normalizer: EventNormalizer::from_config(&config),
            cursor: SessionCursor::default(),
            history: HistoryBuffer::new(config.history_capacity, config.history_floor),
            transitions: TransitionModel::from_config(&config),
            temporal: TemporalStore::from_config(&config),
            detectors: PatternDetectors::from_config(&config),
            patterns: PatternDatabase::from_config(&config),
            engine: PredictionEngine::from_config(&config),
            governor: PerformanceGovernor::from_config(&config),
            events_processed: 0,
            malformed_events: 0,
            config,
        }
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Ingest one navigation event. Never fails: malformed input is recorded
    /// under the `unknown` category and counted.
    pub fn ingest(&mut self, event: NavigationEvent) {
        let started = Instant::now();
        self.apply(event);
        self.governor.observe(started.elapsed(), &mut self.history);
    }

    pub fn ingest_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = NavigationEvent>,
    {
        for event in events {
            self.ingest(event);
        }
    }

    /// Let the performance governor react to a host-measured processing time.
    ///
    /// `ingest` already records its own measurement in the rolling average;
    /// hosts that time ingestion end to end (including their own queueing) can
    /// report that figure here. It may shrink or restore capacity but is not
    /// averaged, so the same event is never counted twice.
    pub fn observe_processing_time(&mut self, elapsed: Duration) -> GovernorAction {
        self.governor.evaluate(elapsed, &mut self.history)
    }

    fn apply(&mut self, event: NavigationEvent) {
        let normalized = self.normalizer.normalize(event, &mut self.cursor);
        self.events_processed += 1;

        if !normalized.well_formed {
            self.malformed_events += 1;
            log::debug!(
                "event {} has a malformed url or referrer, recorded as {}",
                normalized.event.id,
                normalized.category
            );
        }

        if let Some(source) = normalized.referrer_category.as_deref() {
            self.transitions
                .record_transition(source, &normalized.category);
        }
        self.transitions.tick();

        if normalized.category != UNKNOWN_CATEGORY {
            self.temporal.record_duration(
                TemporalKey::new(normalized.day_of_week, normalized.hour),
                &normalized.category,
                normalized.event.duration,
            );
        }

        self.history.push(normalized);

        if !self.governor.should_detect(self.events_processed) {
            return;
        }
        let observations = match self.history.latest() {
            Some(current) => self.detectors.detect(DetectorInput {
                current,
                history: &self.history,
                patterns: &self.patterns,
            }),
            None => Vec::new(),
        };
        for observation in observations {
            self.patterns.upsert(observation);
        }
    }

    /// Ranked guesses for the next destination. Empty when nothing is known.
    pub fn predict(
        &self,
        current_url: &str,
        context: Option<&PredictionContext>,
    ) -> Vec<PatternPrediction> {
        let default_context = PredictionContext::default();
        let view = ModelView {
            transitions: &self.transitions,
            temporal: &self.temporal,
            history: &self.history,
            patterns: &self.patterns,
        };
        self.engine
            .predict(view, current_url, context.unwrap_or(&default_context))
    }

    pub fn top_patterns(&self, n: usize, min_confidence: f64) -> Vec<BrowsingPattern> {
        self.patterns.top_patterns(n, min_confidence)
    }

    /// Category distribution following `source`, highest first
    pub fn transitions_from(&self, source: &str) -> Vec<(String, f64)> {
        self.transitions.get_transitions(source)
    }

    pub fn history(&self) -> impl Iterator<Item = &NormalizedEvent> {
        self.history.iter()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let history_bytes: usize = self
            .history
            .iter()
            .map(|e| {
                std::mem::size_of::<NormalizedEvent>()
                    + e.event.url.len()
                    + e.event.referrer.as_ref().map_or(0, String::len)
                    + e.category.len()
            })
            .sum();

        PerformanceMetrics {
            pattern_count: self.patterns.len(),
            transition_model_size: self.transitions.size(),
            average_processing_time_ms: self.governor.average_ms(),
            estimated_memory_usage: history_bytes
                + self.transitions.estimated_bytes()
                + self.temporal.estimated_bytes()
                + self.patterns.estimated_bytes(),
            events_processed: self.events_processed,
            malformed_events: self.malformed_events,
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            detector_stride: self.governor.stride(),
        }
    }

    /// Capture the full model state
    pub fn export_state(&self) -> ModelSnapshot {
        ModelSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            exported_at: Utc::now(),
            patterns: self.patterns.patterns(),
            transitions: self.transitions.tables(),
            temporal: self.temporal.buckets(),
            history: HistorySnapshot {
                capacity: self.history.capacity(),
                events: self.history.iter().cloned().collect(),
            },
            session: self.cursor.clone(),
            events_processed: self.events_processed,
            malformed_events: self.malformed_events,
        }
    }

    /// Replace the full model state with `snapshot`. Nothing is merged.
    pub fn import_state(&mut self, snapshot: ModelSnapshot) -> Result<(), WayfindError> {
        snapshot.check_version()?;

        log::info!(
            "importing snapshot v{}: {} patterns, {} history events",
            snapshot.version,
            snapshot.patterns.len(),
            snapshot.history.events.len()
        );

        self.patterns.restore(snapshot.patterns);
        self.transitions.restore(snapshot.transitions);
        self.temporal.restore(snapshot.temporal);
        self.history
            .restore(snapshot.history.capacity, snapshot.history.events);
        self.cursor = snapshot.session;
        self.events_processed = snapshot.events_processed;
        self.malformed_events = snapshot.malformed_events;
        self.governor.reset();
        Ok(())
    }

    /// Save the model state to JSON
    pub fn export_json(&self) -> Result<String, WayfindError> {
        self.export_state().to_json()
    }

    /// Load model state from JSON
    pub fn import_json(&mut self, json: &str) -> Result<(), WayfindError> {
        let snapshot = ModelSnapshot::from_json(json)?;
        self.import_state(snapshot)
    }

    /// Forget everything learned; configuration is kept
    pub fn clear(&mut self) {
        *self = Self::build(self.config.clone());
    }
}

/// Thread-safe handle: one writer, many concurrent readers.
#[derive(Debug, Clone, Default)]
pub struct SharedRecognizer {
    inner: Arc<RwLock<PatternRecognizer>>,
}

impl SharedRecognizer {
    pub fn new(recognizer: PatternRecognizer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(recognizer)),
        }
    }

    pub fn ingest(&self, event: NavigationEvent) {
        self.write(|r| r.ingest(event))
    }

    pub fn predict(
        &self,
        current_url: &str,
        context: Option<&PredictionContext>,
    ) -> Vec<PatternPrediction> {
        self.read(|r| r.predict(current_url, context))
    }

    pub fn top_patterns(&self, n: usize, min_confidence: f64) -> Vec<BrowsingPattern> {
        self.read(|r| r.top_patterns(n, min_confidence))
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.read(PatternRecognizer::performance_metrics)
    }

    pub fn export_state(&self) -> ModelSnapshot {
        self.read(PatternRecognizer::export_state)
    }

    pub fn import_state(&self, snapshot: ModelSnapshot) -> Result<(), WayfindError> {
        self.write(|r| r.import_state(snapshot))
    }

    pub fn clear(&self) {
        self.write(PatternRecognizer::clear)
    }

    // A panic mid-ingest leaves every component internally consistent, so a
    // poisoned lock is still safe to use.
    fn read<T>(&self, f: impl FnOnce(&PatternRecognizer) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&*guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut PatternRecognizer) -> T) -> T {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    }
}
