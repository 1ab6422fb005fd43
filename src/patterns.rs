//! Pattern Database
//!
//! Keyed store of detected patterns. Re-observations raise frequency and
//! confidence; the store never holds more than `max_patterns` entries.
//! Maintenance runs opportunistically when an insert hits the cap: stale,
//! low-confidence patterns go first, then the weakest remaining entry.

use crate::config::{RecognizerConfig, MAX_PATTERN_RETENTION_DAYS};
use crate::types::{clamp_confidence, BrowsingPattern};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Observation contexts retained per pattern
const MAX_CONTEXTS: usize = 10;

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Reinforced,
}

#[derive(Debug, Clone)]
pub struct PatternDatabase {
    patterns: HashMap<String, BrowsingPattern>,
    max_patterns: usize,
    retention: Duration,
    prune_confidence: f64,
    confidence_step: f64,
}

impl Default for PatternDatabase {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl PatternDatabase {
    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self {
            patterns: HashMap::new(),
            max_patterns: config.max_patterns.max(1),
            retention: Duration::days(
                config
                    .pattern_retention_days
                    .clamp(1, MAX_PATTERN_RETENTION_DAYS),
            ),
            prune_confidence: config.pattern_prune_confidence,
            confidence_step: config.confidence_step,
        }
    }

    /// Insert a new pattern or reinforce the stored one with the same id.
    ///
    /// Reinforcement bumps frequency by one (or to the observed frequency when
    /// the detector reports a higher support) and nudges confidence up by the
    /// configured step (or to the observed confidence when higher).
    pub fn upsert(&mut self, observation: BrowsingPattern) -> UpsertOutcome {
        let step = self.confidence_step;
        if let Some(existing) = self.patterns.get_mut(&observation.id) {
            existing.frequency = (existing.frequency + 1).max(observation.frequency);
            existing.confidence =
                clamp_confidence((existing.confidence + step).max(observation.confidence));
            existing.last_seen = existing.last_seen.max(observation.last_seen);
            existing.contexts.extend(observation.contexts);
            let overflow = existing.contexts.len().saturating_sub(MAX_CONTEXTS);
            existing.contexts.drain(..overflow);
            return UpsertOutcome::Reinforced;
        }

        if self.patterns.len() >= self.max_patterns {
            self.maintain(observation.last_seen);
            while self.patterns.len() >= self.max_patterns {
                if !self.evict_weakest() {
                    break;
                }
            }
        }

        let mut pattern = observation;
        pattern.confidence = clamp_confidence(pattern.confidence);
        pattern.frequency = pattern.frequency.max(1);
        let overflow = pattern.contexts.len().saturating_sub(MAX_CONTEXTS);
        pattern.contexts.drain(..overflow);
        self.patterns.insert(pattern.id.clone(), pattern);
        UpsertOutcome::Created
    }

    /// Drop patterns that are both unseen beyond the retention window and
    /// below the prune confidence. Returns the number removed.
    pub fn maintain(&mut self, now: DateTime<Utc>) -> usize {
        let retention = self.retention;
        let floor = self.prune_confidence;
        let before = self.patterns.len();
        self.patterns
            .retain(|_, p| !(now - p.last_seen > retention && p.confidence < floor));
        let removed = before - self.patterns.len();
        if removed > 0 {
            log::debug!("pattern maintenance pruned {removed} stale patterns");
        }
        removed
    }

    /// Remove the least confident, stalest pattern
    fn evict_weakest(&mut self) -> bool {
        let weakest = self
            .patterns
            .values()
            .min_by(|a, b| weakness_order(a, b))
            .map(|p| p.id.clone());
        match weakest {
            Some(id) => {
                log::debug!("pattern database at capacity, evicting {id}");
                self.patterns.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Up to `n` patterns with `confidence >= min_confidence`, most confident
    /// first; ties go to the most recently seen.
    pub fn top_patterns(&self, n: usize, min_confidence: f64) -> Vec<BrowsingPattern> {
        let mut selected: Vec<&BrowsingPattern> = self
            .patterns
            .values()
            .filter(|p| p.confidence >= min_confidence)
            .collect();
        selected.sort_by(|a, b| weakness_order(b, a));
        selected.into_iter().take(n).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&BrowsingPattern> {
        self.patterns.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.patterns.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BrowsingPattern> {
        self.patterns.values()
    }

    /// Rough heap usage in bytes
    pub fn estimated_bytes(&self) -> usize {
        self.patterns
            .values()
            .map(|p| {
                std::mem::size_of::<BrowsingPattern>()
                    + p.id.len() * 2
                    + p.sequence.len()
                    + p.contexts.len() * std::mem::size_of::<crate::types::PatternContext>()
            })
            .sum()
    }

    /// All patterns ordered by id
    pub fn patterns(&self) -> Vec<BrowsingPattern> {
        let mut all: Vec<BrowsingPattern> = self.patterns.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Replace all patterns. Confidences are clamped and, past the cap, the
    /// weakest entries are dropped.
    pub fn restore(&mut self, patterns: Vec<BrowsingPattern>) {
        let mut patterns = patterns;
        patterns.sort_by(|a, b| weakness_order(b, a));
        patterns.truncate(self.max_patterns);

        self.patterns = patterns
            .into_iter()
            .map(|mut p| {
                p.confidence = clamp_confidence(p.confidence);
                (p.id.clone(), p)
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }
}

/// Ascending = weaker: lower confidence, then older, then id for determinism
fn weakness_order(a: &BrowsingPattern, b: &BrowsingPattern) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then_with(|| a.last_seen.cmp(&b.last_seen))
        .then_with(|| b.id.cmp(&a.id))
}
