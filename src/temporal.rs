//! Temporal store: observations bucketed by (day of week, hour)
//!
//! Each bucket keeps a rolling window of recent samples (category plus dwell
//! time when known); the oldest sample is evicted once the cap is reached.

use crate::config::RecognizerConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Bucket key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemporalKey {
    /// 0 = Sunday
    pub day_of_week: u8,
    /// 0-23
    pub hour: u8,
}

impl TemporalKey {
    pub fn new(day_of_week: u8, hour: u8) -> Self {
        Self {
            day_of_week: day_of_week % 7,
            hour: hour % 24,
        }
    }

    fn slot(&self) -> u16 {
        self.day_of_week as u16 * 24 + self.hour as u16
    }
}

/// One observation inside a bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSample {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalBucket {
    pub key: TemporalKey,
    pub samples: VecDeque<TemporalSample>,
}

impl TemporalBucket {
    fn new(key: TemporalKey) -> Self {
        Self {
            key,
            samples: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean dwell time over samples that carry one
    pub fn average_duration_ms(&self) -> Option<f64> {
        let durations: Vec<u64> = self.samples.iter().filter_map(|s| s.duration_ms).collect();
        if durations.is_empty() {
            return None;
        }
        Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64)
    }

    /// Share of samples per category, highest first
    pub fn category_shares(&self) -> Vec<(String, f64)> {
        if self.samples.is_empty() {
            return Vec::new();
        }
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for sample in &self.samples {
            *counts.entry(sample.category.as_str()).or_insert(0) += 1;
        }
        let total = self.samples.len() as f64;
        let mut shares: Vec<(String, f64)> = counts
            .into_iter()
            .map(|(category, count)| (category.to_string(), count as f64 / total))
            .collect();
        shares.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        shares
    }
}

/// A bucket that cleared the similarity threshold for a queried hour
#[derive(Debug, Clone, Copy)]
pub struct SimilarBucket<'a> {
    pub similarity: f64,
    pub bucket: &'a TemporalBucket,
}

#[derive(Debug, Clone)]
pub struct TemporalStore {
    buckets: BTreeMap<u16, TemporalBucket>,
    sample_cap: usize,
    similarity_threshold: f64,
    circular_hours: bool,
}

impl Default for TemporalStore {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl TemporalStore {
    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self {
            buckets: BTreeMap::new(),
            sample_cap: config.temporal_sample_cap.max(1),
            similarity_threshold: config.temporal_similarity_threshold,
            circular_hours: config.circular_hours,
        }
    }

    /// Record an observation in its (day, hour) bucket
    pub fn record_duration(&mut self, key: TemporalKey, category: &str, duration_ms: Option<u64>) {
        let bucket = self
            .buckets
            .entry(key.slot())
            .or_insert_with(|| TemporalBucket::new(key));
        while bucket.samples.len() >= self.sample_cap {
            bucket.samples.pop_front();
        }
        bucket.samples.push_back(TemporalSample {
            category: category.to_string(),
            duration_ms,
        });
    }

    pub fn bucket(&self, key: TemporalKey) -> Option<&TemporalBucket> {
        self.buckets.get(&key.slot())
    }

    /// Buckets, across all days, whose hour is similar to `hour`.
    /// Ordered by similarity, then by key.
    pub fn get_similar_buckets(&self, hour: u8) -> Vec<SimilarBucket<'_>> {
        let mut similar: Vec<SimilarBucket<'_>> = self
            .buckets
            .values()
            .filter(|bucket| !bucket.is_empty())
            .map(|bucket| SimilarBucket {
                similarity: hour_similarity(hour, bucket.key.hour, self.circular_hours),
                bucket,
            })
            .filter(|candidate| candidate.similarity >= self.similarity_threshold)
            .collect();
        similar.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.bucket.key.cmp(&b.bucket.key))
        });
        similar
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn sample_count(&self) -> usize {
        self.buckets.values().map(TemporalBucket::len).sum()
    }

    /// Rough heap usage in bytes
    pub fn estimated_bytes(&self) -> usize {
        self.buckets
            .values()
            .map(|bucket| {
                std::mem::size_of::<TemporalBucket>()
                    + bucket
                        .samples
                        .iter()
                        .map(|s| s.category.len() + std::mem::size_of::<TemporalSample>())
                        .sum::<usize>()
            })
            .sum()
    }

    /// All non-empty buckets in key order
    pub fn buckets(&self) -> Vec<TemporalBucket> {
        self.buckets.values().cloned().collect()
    }

    /// Replace all buckets; samples beyond the cap are dropped oldest first
    pub fn restore(&mut self, buckets: Vec<TemporalBucket>) {
        self.buckets.clear();
        for mut bucket in buckets {
            bucket.key = TemporalKey::new(bucket.key.day_of_week, bucket.key.hour);
            while bucket.samples.len() > self.sample_cap {
                bucket.samples.pop_front();
            }
            self.buckets.insert(bucket.key.slot(), bucket);
        }
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

/// Similarity between two hours: `1 - distance / 12`, floored at zero.
///
/// With `circular` the distance wraps around midnight, so 23:00 and 01:00 are
/// two hours apart instead of twenty-two.
pub fn hour_similarity(a: u8, b: u8, circular: bool) -> f64 {
    let mut distance = (a as i32 - b as i32).abs();
    if circular {
        distance = distance.min(24 - distance);
    }
    (1.0 - distance as f64 / 12.0).max(0.0)
}
