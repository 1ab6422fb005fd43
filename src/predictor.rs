//! Prediction engine
//!
//! Combines the transition model, temporal store, pattern database and recent
//! history into a ranked list of next-destination guesses. Read-only: nothing it touches is
//! mutated, so identical state and arguments always yield identical output.

use crate::config::RecognizerConfig;
use crate::detectors::SEQUENCE_SEPARATOR;
use crate::history::HistoryBuffer;
use crate::normalizer::{category_for, NormalizedEvent};
use crate::patterns::PatternDatabase;
use crate::temporal::TemporalStore;
use crate::transition::TransitionModel;
use crate::types::{
    PatternPrediction, PatternType, PredictionContext, PredictionFactors, PredictionMetadata,
    PredictionType, UNKNOWN_CATEGORY,
};
use std::collections::{BTreeMap, BTreeSet};

/// Temporal predictions are discounted against direct transition evidence
const TEMPORAL_WEIGHT: f64 = 0.6;

/// Session durations within this fraction of the queried one count as matches
const SESSION_TOLERANCE: f64 = 0.2;

const MIN_SESSION_PRECEDENTS: usize = 3;
const MIN_SEARCH_PRECEDENTS: usize = 2;

/// Borrowed model state the engine reads
#[derive(Debug, Clone, Copy)]
pub struct ModelView<'a> {
    pub transitions: &'a TransitionModel,
    pub temporal: &'a TemporalStore,
    pub history: &'a HistoryBuffer,
    pub patterns: &'a PatternDatabase,
}

/// A single-signal guess before merging
#[derive(Debug, Clone)]
struct Candidate {
    target: String,
    confidence: f64,
    kind: PredictionType,
    factors: PredictionFactors,
}

#[derive(Debug, Clone)]
struct Merged {
    confidence: f64,
    kind: PredictionType,
    factors: PredictionFactors,
    sources: BTreeSet<PredictionType>,
}

#[derive(Debug, Clone)]
pub struct PredictionEngine {
    max_predictions: usize,
    markov_min_probability: f64,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl PredictionEngine {
    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self {
            max_predictions: config.max_predictions.max(1),
            markov_min_probability: config.markov_min_probability,
        }
    }

    /// Rank likely next destinations for a user currently on `current_url`
    pub fn predict(
        &self,
        view: ModelView<'_>,
        current_url: &str,
        context: &PredictionContext,
    ) -> Vec<PatternPrediction> {
        let current = category_for(current_url);

        let mut candidates = self.markov(view, &current);
        if let Some(hour) = context.time_of_day {
            candidates.extend(temporal(view, hour % 24));
        }
        if let Some(duration_ms) = context.session_duration_ms {
            candidates.extend(session(view, duration_ms));
        }
        if let Some(searches) = &context.recent_searches {
            candidates.extend(search(view, searches));
        }

        candidates.retain(|c| c.target != current && c.target != UNKNOWN_CATEGORY);
        self.rank(merge(candidates))
    }

    /// Targets reachable from the current category with enough probability.
    ///
    /// `historical_frequency` is the stronger of the transition probability and
    /// the best learned sequential pattern that steps from `current` to the
    /// target.
    fn markov(&self, view: ModelView<'_>, current: &str) -> Vec<Candidate> {
        view.transitions
            .get_transitions(current)
            .into_iter()
            .filter(|(_, probability)| *probability >= self.markov_min_probability)
            .map(|(target, probability)| {
                let learned = sequence_support(view.patterns, current, &target);
                Candidate {
                    target,
                    confidence: probability,
                    kind: PredictionType::Markov,
                    factors: PredictionFactors {
                        historical_frequency: probability.max(learned),
                        ..Default::default()
                    },
                }
            })
            .collect()
    }

    fn rank(&self, merged: BTreeMap<String, Merged>) -> Vec<PatternPrediction> {
        let mut predictions: Vec<PatternPrediction> = merged
            .into_iter()
            .map(|(target_url, m)| PatternPrediction {
                target_url,
                confidence: m.confidence.clamp(0.0, 1.0),
                prediction_type: m.kind,
                factors: m.factors,
                metadata: Some(PredictionMetadata {
                    sources: m.sources.into_iter().collect(),
                }),
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.target_url.cmp(&b.target_url))
        });
        predictions.truncate(self.max_predictions);
        predictions
    }
}

/// Highest confidence among sequential patterns containing the step
/// `from -> to`, or 0 when none does
fn sequence_support(patterns: &PatternDatabase, from: &str, to: &str) -> f64 {
    patterns
        .iter()
        .filter(|p| p.pattern_type == PatternType::Sequential)
        .filter(|p| {
            let steps: Vec<&str> = p.sequence.split(SEQUENCE_SEPARATOR).collect();
            steps.windows(2).any(|step| step[0] == from && step[1] == to)
        })
        .map(|p| p.confidence)
        .fold(0.0, f64::max)
}

/// Categories observed at similar hours, discounted by similarity
fn temporal(view: ModelView<'_>, hour: u8) -> Vec<Candidate> {
    view.temporal
        .get_similar_buckets(hour)
        .into_iter()
        .flat_map(|similar| {
            similar
                .bucket
                .category_shares()
                .into_iter()
                .map(move |(target, share)| Candidate {
                    target,
                    confidence: similar.similarity * TEMPORAL_WEIGHT * share,
                    kind: PredictionType::Temporal,
                    factors: PredictionFactors {
                        temporal_relevance: similar.similarity,
                        ..Default::default()
                    },
                })
        })
        .collect()
}

/// What followed earlier moments of a similar session length
fn session(view: ModelView<'_>, duration_ms: u64) -> Vec<Candidate> {
    let duration = duration_ms as f64;
    let low = duration * (1.0 - SESSION_TOLERANCE);
    let high = duration * (1.0 + SESSION_TOLERANCE);

    let followers: Vec<&NormalizedEvent> = view
        .history
        .iter()
        .zip(view.history.iter().skip(1))
        .filter(|(prev, next)| {
            let elapsed = prev.session_duration_ms as f64;
            prev.session == next.session && elapsed >= low && elapsed <= high
        })
        .map(|(_, next)| next)
        .collect();

    if followers.len() < MIN_SESSION_PRECEDENTS {
        return Vec::new();
    }
    relative_frequency(&followers)
        .into_iter()
        .map(|(target, share)| Candidate {
            target,
            confidence: share,
            kind: PredictionType::Session,
            factors: PredictionFactors {
                context_similarity: share,
                ..Default::default()
            },
        })
        .collect()
}

/// Destinations previously reached from referrers mentioning a recent search
fn search(view: ModelView<'_>, searches: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for term in searches {
        let term = term.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if term.is_empty() {
            continue;
        }
        let encodings = [term.clone(), term.replace(' ', "+"), term.replace(' ', "%20")];

        let matched: Vec<&NormalizedEvent> = view
            .history
            .iter()
            .filter(|e| {
                let referrer_hit = e.event.referrer.as_deref().is_some_and(|referrer| {
                    let referrer = referrer.to_lowercase();
                    encodings.iter().any(|encoded| referrer.contains(encoded.as_str()))
                });
                referrer_hit
                    || e.search_terms
                        .as_deref()
                        .is_some_and(|terms| terms.contains(term.as_str()))
            })
            .collect();

        if matched.len() < MIN_SEARCH_PRECEDENTS {
            continue;
        }
        candidates.extend(relative_frequency(&matched).into_iter().map(|(target, share)| {
            Candidate {
                target,
                confidence: share,
                kind: PredictionType::Search,
                factors: PredictionFactors {
                    context_similarity: share,
                    ..Default::default()
                },
            }
        }));
    }

    candidates
}

/// Share of events per category
fn relative_frequency(events: &[&NormalizedEvent]) -> Vec<(String, f64)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.category.as_str()).or_insert(0) += 1;
    }
    let total = events.len() as f64;
    counts
        .into_iter()
        .map(|(category, count)| (category.to_string(), count as f64 / total))
        .collect()
}

/// Combine candidates per target: maximum confidence, per-factor maximum.
/// The reported type is the signal that produced the winning confidence.
fn merge(candidates: Vec<Candidate>) -> BTreeMap<String, Merged> {
    let mut merged: BTreeMap<String, Merged> = BTreeMap::new();
    for candidate in candidates {
        match merged.get_mut(&candidate.target) {
            Some(existing) => {
                if candidate.confidence > existing.confidence {
                    existing.confidence = candidate.confidence;
                    existing.kind = candidate.kind;
                }
                existing.factors = existing.factors.max(candidate.factors);
                existing.sources.insert(candidate.kind);
            }
            None => {
                merged.insert(
                    candidate.target,
                    Merged {
                        confidence: candidate.confidence,
                        kind: candidate.kind,
                        factors: candidate.factors,
                        sources: BTreeSet::from([candidate.kind]),
                    },
                );
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{EventNormalizer, SessionCursor};
    use crate::temporal::TemporalKey;
    use crate::types::{BrowsingPattern, NavigationEvent};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    struct Model {
        transitions: TransitionModel,
        temporal: TemporalStore,
        history: HistoryBuffer,
        patterns: PatternDatabase,
        normalizer: EventNormalizer,
        cursor: SessionCursor,
    }

    impl Model {
        fn new() -> Self {
            Self {
                transitions: TransitionModel::default(),
                temporal: TemporalStore::default(),
                history: HistoryBuffer::new(1000, 500),
                patterns: PatternDatabase::default(),
                normalizer: EventNormalizer::default(),
                cursor: SessionCursor::default(),
            }
        }

        fn view(&self) -> ModelView<'_> {
            ModelView {
                transitions: &self.transitions,
                temporal: &self.temporal,
                history: &self.history,
                patterns: &self.patterns,
            }
        }

        fn push(&mut self, event: NavigationEvent) {
            let normalized = self.normalizer.normalize(event, &mut self.cursor);
            self.history.push(normalized);
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_markov_threshold_and_order() {
        let mut model = Model::new();
        for _ in 0..6 {
            model.transitions.record_transition("a.com", "b.com");
        }
        for _ in 0..3 {
            model.transitions.record_transition("a.com", "c.com");
        }
        model.transitions.record_transition("a.com", "d.com");

        let engine = PredictionEngine::default();
        let predictions = engine.predict(model.view(), "https://a.com/x", &PredictionContext::default());

        let targets: Vec<&str> = predictions.iter().map(|p| p.target_url.as_str()).collect();
        assert_eq!(targets, vec!["b.com", "c.com", "d.com"]);
        assert!((predictions[0].confidence - 0.6).abs() < 1e-9);
        assert_eq!(predictions[0].prediction_type, PredictionType::Markov);
        assert!((predictions[0].factors.historical_frequency - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_learned_sequence_raises_historical_frequency() {
        let mut model = Model::new();
        model.transitions.record_transition("a.com", "b.com");
        model.transitions.record_transition("a.com", "c.com");
        model.patterns.upsert(BrowsingPattern::new(
            PatternType::Sequential,
            ["a.com", "b.com", "c.com"].join(SEQUENCE_SEPARATOR),
            0.9,
            t0(),
        ));

        let predictions =
            PredictionEngine::default().predict(model.view(), "https://a.com", &PredictionContext::default());

        let b = predictions.iter().find(|p| p.target_url == "b.com").unwrap();
        assert!((b.confidence - 0.5).abs() < 1e-9);
        assert!((b.factors.historical_frequency - 0.9).abs() < 1e-9);

        // b.com -> c.com is in the pattern, a.com -> c.com is not
        let c = predictions.iter().find(|p| p.target_url == "c.com").unwrap();
        assert!((c.factors.historical_frequency - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_markov_below_threshold_dropped() {
        let mut model = Model::new();
        for _ in 0..19 {
            model.transitions.record_transition("a.com", "b.com");
        }
        model.transitions.record_transition("a.com", "rare.com");

        let predictions =
            PredictionEngine::default().predict(model.view(), "https://a.com", &PredictionContext::default());
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].target_url, "b.com");
    }

    #[test]
    fn test_temporal_weighting() {
        let mut model = Model::new();
        model
            .temporal
            .record_duration(TemporalKey::new(2, 14), "news.com", Some(1000));

        let context = PredictionContext::default().with_time_of_day(14);
        let predictions = PredictionEngine::default().predict(model.view(), "https://a.com", &context);

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].prediction_type, PredictionType::Temporal);
        assert!((predictions[0].confidence - TEMPORAL_WEIGHT).abs() < 1e-9);
        assert_eq!(predictions[0].factors.temporal_relevance, 1.0);
    }

    #[test]
    fn test_session_requires_three_precedents() {
        let mut model = Model::new();
        // Three sessions, each: start page, then mail.com two minutes in
        for session in 0..3 {
            let start = t0() + Duration::hours(2 * session);
            model.push(NavigationEvent::new("https://home.com", start));
            model.push(NavigationEvent::new("https://start.com", start + Duration::minutes(2)));
            model.push(NavigationEvent::new("https://mail.com", start + Duration::minutes(3)));
        }

        let engine = PredictionEngine::default();
        let context = PredictionContext::default().with_session_duration(120_000);
        let predictions = engine.predict(model.view(), "https://start.com", &context);
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].target_url, "mail.com");
        assert_eq!(predictions[0].prediction_type, PredictionType::Session);
        assert_eq!(predictions[0].confidence, 1.0);

        let mut sparse = Model::new();
        sparse.push(NavigationEvent::new("https://start.com", t0()));
        sparse.push(NavigationEvent::new("https://mail.com", t0() + Duration::minutes(1)));
        let predictions = engine.predict(sparse.view(), "https://start.com", &context);
        assert!(predictions.is_empty());
    }

    #[test]
    fn test_search_correlation() {
        let mut model = Model::new();
        let referrer = "https://www.google.com/search?q=rust+async";
        model.push(NavigationEvent::new("https://tokio.rs", t0()).with_referrer(referrer));
        model.push(
            NavigationEvent::new("https://tokio.rs/tutorial", t0() + Duration::minutes(1))
                .with_referrer(referrer),
        );
        model.push(
            NavigationEvent::new("https://docs.rs/futures", t0() + Duration::minutes(2))
                .with_referrer(referrer),
        );

        let context = PredictionContext::default().with_recent_searches(["Rust Async"]);
        let predictions = PredictionEngine::default().predict(model.view(), "https://google.com", &context);

        let targets: Vec<&str> = predictions.iter().map(|p| p.target_url.as_str()).collect();
        assert_eq!(targets, vec!["tokio.rs", "docs.rs"]);
        assert!((predictions[0].confidence - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(predictions[0].prediction_type, PredictionType::Search);
    }

    #[test]
    fn test_merge_takes_max_and_combines_factors() {
        let mut model = Model::new();
        model.transitions.record_transition("a.com", "b.com");
        model.transitions.record_transition("a.com", "c.com");
        model
            .temporal
            .record_duration(TemporalKey::new(1, 8), "b.com", None);

        let context = PredictionContext::default().with_time_of_day(8);
        let predictions = PredictionEngine::default().predict(model.view(), "https://a.com", &context);

        let b = predictions.iter().find(|p| p.target_url == "b.com").unwrap();
        // temporal 0.6 beats markov 0.5
        assert!((b.confidence - 0.6).abs() < 1e-9);
        assert_eq!(b.prediction_type, PredictionType::Temporal);
        assert!((b.factors.historical_frequency - 0.5).abs() < 1e-9);
        assert_eq!(b.factors.temporal_relevance, 1.0);
        assert_eq!(
            b.metadata.as_ref().unwrap().sources,
            vec![PredictionType::Markov, PredictionType::Temporal]
        );
        assert_eq!(predictions.len(), 2);
    }

    #[test]
    fn test_current_category_and_top_five() {
        let mut model = Model::new();
        for i in 0..8 {
            model
                .temporal
                .record_duration(TemporalKey::new(3, 10), &format!("site{i}.com"), None);
        }
        model
            .temporal
            .record_duration(TemporalKey::new(3, 10), "a.com", None);

        let context = PredictionContext::default().with_time_of_day(10);
        let predictions = PredictionEngine::default().predict(model.view(), "https://a.com", &context);
        assert_eq!(predictions.len(), 5);
        assert!(predictions.iter().all(|p| p.target_url != "a.com"));
    }

    #[test]
    fn test_empty_model_predicts_nothing() {
        let model = Model::new();
        let context = PredictionContext::default()
            .with_time_of_day(3)
            .with_session_duration(1000)
            .with_recent_searches(["anything"]);
        assert!(PredictionEngine::default()
            .predict(model.view(), "garbage url", &context)
            .is_empty());
    }
}
