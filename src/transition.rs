//! Markov transition model over category keys
//!
//! Raw transition counts accumulate between normalization passes. Every
//! `normalization_interval` ingested events the counts are decayed, weights
//! that fall below `min_transition_weight` are evicted, and each surviving
//! row is divided by its sum into a probability snapshot used for queries.

use crate::config::RecognizerConfig;
use crate::types::UNKNOWN_CATEGORY;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

type Row = BTreeMap<String, f64>;

/// Serializable form of the transition tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionTables {
    /// source -> target -> raw (decayed) count
    pub counts: BTreeMap<String, Row>,
    /// source -> target -> probability as of the last normalization pass
    pub probabilities: BTreeMap<String, Row>,
    #[serde(default)]
    pub events_since_normalization: u64,
}

#[derive(Debug, Clone)]
pub struct TransitionModel {
    counts: HashMap<String, Row>,
    probabilities: HashMap<String, Row>,
    events_since_normalization: u64,
    normalization_interval: u64,
    decay: f64,
    min_weight: f64,
}

impl Default for TransitionModel {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl TransitionModel {
    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self {
            counts: HashMap::new(),
            probabilities: HashMap::new(),
            events_since_normalization: 0,
            normalization_interval: config.normalization_interval.max(1),
            decay: config.transition_decay,
            min_weight: config.min_transition_weight,
        }
    }

    /// Record an observed move between categories.
    ///
    /// Self-transitions and transitions touching the `unknown` category carry
    /// no predictive signal and are ignored. Returns whether the count changed.
    pub fn record_transition(&mut self, source: &str, target: &str) -> bool {
        if source == target
            || source.is_empty()
            || target.is_empty()
            || source == UNKNOWN_CATEGORY
            || target == UNKNOWN_CATEGORY
        {
            return false;
        }

        *self
            .counts
            .entry(source.to_string())
            .or_default()
            .entry(target.to_string())
            .or_insert(0.0) += 1.0;
        true
    }

    /// Count one ingested event; runs a normalization pass when the interval
    /// elapses. Returns whether a pass ran.
    pub fn tick(&mut self) -> bool {
        self.events_since_normalization += 1;
        if self.events_since_normalization >= self.normalization_interval {
            self.normalize();
            true
        } else {
            false
        }
    }

    /// Decay, evict and renormalize every row
    pub fn normalize(&mut self) {
        let decay = self.decay;
        let min_weight = self.min_weight;

        for row in self.counts.values_mut() {
            for weight in row.values_mut() {
                *weight *= decay;
            }
            row.retain(|_, weight| *weight >= min_weight && *weight > 0.0);
        }
        let before = self.counts.len();
        self.counts.retain(|_, row| !row.is_empty());
        let evicted = before - self.counts.len();

        self.probabilities = self
            .counts
            .iter()
            .map(|(source, row)| (source.clone(), Self::distribution(row)))
            .collect();
        self.events_since_normalization = 0;

        log::debug!(
            "transition normalization: {} sources, {} entries, {} rows evicted",
            self.counts.len(),
            self.size(),
            evicted
        );
    }

    /// Probability distribution over targets for `source`, highest first.
    ///
    /// Uses the last normalization snapshot when the row is present there and
    /// falls back to normalizing raw counts on the fly otherwise.
    pub fn get_transitions(&self, source: &str) -> Vec<(String, f64)> {
        let distribution = match self.probabilities.get(source) {
            Some(row) => row.clone(),
            None => match self.counts.get(source) {
                Some(row) => Self::distribution(row),
                None => return Vec::new(),
            },
        };

        let mut ranked: Vec<(String, f64)> = distribution.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// Raw count for a single transition
    pub fn count(&self, source: &str, target: &str) -> f64 {
        self.counts
            .get(source)
            .and_then(|row| row.get(target))
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of (source, target) entries
    pub fn size(&self) -> usize {
        self.counts.values().map(|row| row.len()).sum()
    }

    pub fn source_count(&self) -> usize {
        self.counts.len()
    }

    /// Rough heap usage of both tables in bytes
    pub fn estimated_bytes(&self) -> usize {
        let table = |t: &HashMap<String, Row>| -> usize {
            t.iter()
                .map(|(source, row)| {
                    source.len()
                        + row
                            .keys()
                            .map(|target| target.len() + std::mem::size_of::<(String, f64)>())
                            .sum::<usize>()
                        + std::mem::size_of::<(String, Row)>()
                })
                .sum()
        };
        table(&self.counts) + table(&self.probabilities)
    }

    pub fn tables(&self) -> TransitionTables {
        let sorted = |t: &HashMap<String, Row>| -> BTreeMap<String, Row> {
            t.iter()
                .map(|(source, row)| (source.clone(), row.clone()))
                .collect()
        };
        TransitionTables {
            counts: sorted(&self.counts),
            probabilities: sorted(&self.probabilities),
            events_since_normalization: self.events_since_normalization,
        }
    }

    /// Replace all state with `tables`
    pub fn restore(&mut self, tables: TransitionTables) {
        let unsorted = |t: BTreeMap<String, Row>| t.into_iter().collect::<HashMap<String, Row>>();
        self.counts = unsorted(tables.counts);
        self.probabilities = unsorted(tables.probabilities);
        self.events_since_normalization = tables.events_since_normalization;
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.probabilities.clear();
        self.events_since_normalization = 0;
    }

    fn distribution(row: &Row) -> Row {
        let total: f64 = row.values().sum();
        if total <= 0.0 {
            return Row::new();
        }
        row.iter()
            .map(|(target, weight)| (target.clone(), weight / total))
            .collect()
    }
}
