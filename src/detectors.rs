//! Pattern detectors
//!
//! Four independent scanners read the current model state and propose pattern
//! observations. They never touch each other's output; observations are merged
//! by the Pattern Database. Missing signal means no observation, never an error.

use crate::config::RecognizerConfig;
use crate::history::HistoryBuffer;
use crate::normalizer::{NormalizedEvent, ReferrerKind};
use crate::patterns::PatternDatabase;
use crate::types::{BrowsingPattern, PatternContext, PatternType, UNKNOWN_CATEGORY};
use std::collections::BTreeMap;

/// Initial confidence of a new sequential pattern
const SEQUENTIAL_INITIAL_CONFIDENCE: f64 = 0.3;

/// Temporal confidence at minimum support; grows per extra supporting event
const TEMPORAL_BASE_CONFIDENCE: f64 = 0.3;
const TEMPORAL_SUPPORT_STEP: f64 = 0.05;

/// Category confidence at the share threshold
const CATEGORY_BASE_CONFIDENCE: f64 = 0.35;

const SEARCH_INITIAL_CONFIDENCE: f64 = 0.4;

/// Fewer events than this make category shares meaningless
const MIN_CATEGORY_SAMPLES: usize = 5;

/// Separator between steps of an encoded category path
pub const SEQUENCE_SEPARATOR: &str = " -> ";

const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// State the detectors read. `history` already contains `current` as its
/// latest entry.
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput<'a> {
    pub current: &'a NormalizedEvent,
    pub history: &'a HistoryBuffer,
    pub patterns: &'a PatternDatabase,
}

impl DetectorInput<'_> {
    fn context(&self) -> PatternContext {
        PatternContext {
            time_of_day: self.current.hour,
            session_duration_ms: self.current.session_duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternDetectors {
    sequence_window: usize,
    sequence_length: usize,
    category_window: usize,
    category_min_share: f64,
    temporal_min_support: usize,
}

impl Default for PatternDetectors {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl PatternDetectors {
    pub fn from_config(config: &RecognizerConfig) -> Self {
        Self {
            sequence_window: config.sequence_window,
            sequence_length: config.sequence_length.max(2),
            category_window: config.category_window,
            category_min_share: config.category_min_share,
            temporal_min_support: config.temporal_min_support.max(1),
        }
    }

    /// Run every detector
    pub fn detect(&self, input: DetectorInput<'_>) -> Vec<BrowsingPattern> {
        let mut found: Vec<BrowsingPattern> = [self.sequential(input), self.temporal(input)]
            .into_iter()
            .flatten()
            .collect();
        found.extend(self.category(input));
        found.extend(self.search(input));
        found
    }

    /// Repeating category subsequence ending at the current event.
    ///
    /// Emits when the trailing subsequence occurs at least twice in the recent
    /// window, or when it is already a known pattern.
    pub fn sequential(&self, input: DetectorInput<'_>) -> Option<BrowsingPattern> {
        let window: Vec<&str> = input
            .history
            .recent(self.sequence_window)
            .map(|e| e.category.as_str())
            .collect();
        if window.len() < self.sequence_length {
            return None;
        }

        let trailing = &window[window.len() - self.sequence_length..];
        if trailing.contains(&UNKNOWN_CATEGORY) {
            return None;
        }

        let sequence = trailing.join(SEQUENCE_SEPARATOR);
        let occurrences = window
            .windows(self.sequence_length)
            .filter(|candidate| *candidate == trailing)
            .count();
        let known = input
            .patterns
            .contains(&BrowsingPattern::key(PatternType::Sequential, &sequence));

        if occurrences < 2 && !known {
            return None;
        }

        Some(
            BrowsingPattern::new(
                PatternType::Sequential,
                sequence,
                SEQUENTIAL_INITIAL_CONFIDENCE,
                input.current.event.timestamp,
            )
            .with_context(input.context()),
        )
    }

    /// Habitual activity in the current (day, hour) slot
    pub fn temporal(&self, input: DetectorInput<'_>) -> Option<BrowsingPattern> {
        let current = input.current;
        let support = input
            .history
            .iter()
            .filter(|e| e.day_of_week == current.day_of_week && e.hour == current.hour)
            .count();
        if support < self.temporal_min_support {
            return None;
        }

        let extra = (support - self.temporal_min_support) as f64;
        let confidence = TEMPORAL_BASE_CONFIDENCE + TEMPORAL_SUPPORT_STEP * extra;

        Some(
            BrowsingPattern::new(
                PatternType::Temporal,
                temporal_sequence(current.day_of_week, current.hour),
                confidence,
                current.event.timestamp,
            )
            .with_frequency(support as u64)
            .with_context(input.context()),
        )
    }

    /// Every category holding at least `category_min_share` of the recent
    /// window, in category order. The dominant category need not be the
    /// current one.
    pub fn category(&self, input: DetectorInput<'_>) -> Vec<BrowsingPattern> {
        let window: Vec<&NormalizedEvent> = input.history.recent(self.category_window).collect();
        if window.is_empty() || window.len() < MIN_CATEGORY_SAMPLES.min(self.category_window) {
            return Vec::new();
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for event in &window {
            if event.category != UNKNOWN_CATEGORY {
                *counts.entry(event.category.as_str()).or_default() += 1;
            }
        }

        let total = window.len() as f64;
        counts
            .into_iter()
            .filter_map(|(category, hits)| {
                let share = hits as f64 / total;
                if share < self.category_min_share {
                    return None;
                }
                let confidence = CATEGORY_BASE_CONFIDENCE + 0.5 * (share - self.category_min_share);
                Some(
                    BrowsingPattern::new(
                        PatternType::Category,
                        category.to_string(),
                        confidence,
                        input.current.event.timestamp,
                    )
                    .with_context(input.context()),
                )
            })
            .collect()
    }

    /// Search engine referral leading to a browse destination
    pub fn search(&self, input: DetectorInput<'_>) -> Option<BrowsingPattern> {
        let current = input.current;
        if current.referrer_kind != ReferrerKind::SearchEngine
            || current.category == UNKNOWN_CATEGORY
        {
            return None;
        }
        let terms = current.search_terms.as_deref()?;

        Some(
            BrowsingPattern::new(
                PatternType::Search,
                search_sequence(terms, &current.category),
                SEARCH_INITIAL_CONFIDENCE,
                current.event.timestamp,
            )
            .with_context(input.context()),
        )
    }
}

/// Encoded sequence of a temporal pattern, e.g. `tue@14`
pub fn temporal_sequence(day_of_week: u8, hour: u8) -> String {
    format!("{}@{:02}", DAY_NAMES[(day_of_week % 7) as usize], hour % 24)
}

/// Encoded sequence of a search-to-browse pattern
pub fn search_sequence(terms: &str, category: &str) -> String {
    format!("search:{terms}{SEQUENCE_SEPARATOR}browse:{category}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{EventNormalizer, SessionCursor};
    use crate::types::NavigationEvent;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    struct Fixture {
        normalizer: EventNormalizer,
        cursor: SessionCursor,
        history: HistoryBuffer,
        patterns: PatternDatabase,
        detectors: PatternDetectors,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                normalizer: EventNormalizer::default(),
                cursor: SessionCursor::default(),
                history: HistoryBuffer::new(1000, 500),
                patterns: PatternDatabase::default(),
                detectors: PatternDetectors::default(),
            }
        }

        fn push(&mut self, event: NavigationEvent) -> Vec<BrowsingPattern> {
            let normalized = self.normalizer.normalize(event, &mut self.cursor);
            self.history.push(normalized);
            let current = self.history.latest().unwrap();
            let input = DetectorInput {
                current,
                history: &self.history,
                patterns: &self.patterns,
            };
            let found = self.detectors.detect(input);
            for pattern in &found {
                self.patterns.upsert(pattern.clone());
            }
            found
        }
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 16, 14, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn of_type(found: &[BrowsingPattern], kind: PatternType) -> Option<&BrowsingPattern> {
        found.iter().find(|p| p.pattern_type == kind)
    }

    #[test]
    fn test_sequential_requires_repeat() {
        let mut fx = Fixture::new();
        let path = ["a.com", "b.com", "c.com"];

        for (i, host) in path.iter().enumerate() {
            let found = fx.push(NavigationEvent::new(format!("https://{host}"), at(i as i64)));
            assert!(of_type(&found, PatternType::Sequential).is_none());
        }

        let last = path
            .iter()
            .enumerate()
            .map(|(i, host)| fx.push(NavigationEvent::new(format!("https://{host}"), at(10 + i as i64))))
            .last()
            .unwrap();
        let sequential = of_type(&last, PatternType::Sequential).unwrap();
        assert_eq!(sequential.sequence, "a.com -> b.com -> c.com");
        assert_eq!(sequential.confidence, SEQUENTIAL_INITIAL_CONFIDENCE);
    }

    #[test]
    fn test_sequential_skips_unknown() {
        let mut fx = Fixture::new();
        for i in 0..6 {
            let found = fx.push(NavigationEvent::new("not a url", at(i)));
            assert!(of_type(&found, PatternType::Sequential).is_none());
            assert!(of_type(&found, PatternType::Category).is_none());
        }
    }

    #[test]
    fn test_temporal_support_threshold() {
        let mut fx = Fixture::new();
        for i in 0..4 {
            let found = fx.push(NavigationEvent::new(format!("https://s{i}.example.com"), at(i)));
            assert!(of_type(&found, PatternType::Temporal).is_none());
        }

        let found = fx.push(NavigationEvent::new("https://s5.example.com", at(5)));
        let temporal = of_type(&found, PatternType::Temporal).unwrap();
        assert_eq!(temporal.sequence, "tue@14");
        assert_eq!(temporal.frequency, 5);
        assert_eq!(temporal.confidence, TEMPORAL_BASE_CONFIDENCE);
    }

    #[test]
    fn test_category_share() {
        let mut fx = Fixture::new();
        let hosts = ["a.com", "b.com", "c.com", "d.com", "a.com"];
        let found = hosts
            .iter()
            .enumerate()
            .map(|(i, host)| fx.push(NavigationEvent::new(format!("https://{host}"), at(i as i64))))
            .last()
            .unwrap();
        // a.com holds 2/5 = 40% of the window
        let category = of_type(&found, PatternType::Category).unwrap();
        assert_eq!(category.sequence, "a.com");
        assert!((category.confidence - (CATEGORY_BASE_CONFIDENCE + 0.05)).abs() < 1e-9);

        // 2/6 still clears the threshold; e.com at 1/6 does not
        let found = fx.push(NavigationEvent::new("https://e.com", at(10)));
        let categories: Vec<&str> = found
            .iter()
            .filter(|p| p.pattern_type == PatternType::Category)
            .map(|p| p.sequence.as_str())
            .collect();
        assert_eq!(categories, vec!["a.com"]);
    }

    #[test]
    fn test_category_dominant_while_browsing_elsewhere() {
        let mut fx = Fixture::new();
        for i in 0..6 {
            fx.push(NavigationEvent::new("https://a.com", at(i)));
        }
        let before = fx.patterns.get("category:a.com").unwrap().frequency;

        for (i, host) in ["b.com", "c.com", "d.com", "e.com"].iter().enumerate() {
            let found = fx.push(NavigationEvent::new(format!("https://{host}"), at(10 + i as i64)));
            let categories: Vec<&str> = found
                .iter()
                .filter(|p| p.pattern_type == PatternType::Category)
                .map(|p| p.sequence.as_str())
                .collect();
            assert_eq!(categories, vec!["a.com"]);
        }

        // Reinforced on every event even though none of them were a.com
        let after = fx.patterns.get("category:a.com").unwrap().frequency;
        assert_eq!(after, before + 4);
    }

    #[test]
    fn test_category_emits_every_qualifying_category() {
        let mut fx = Fixture::new();
        let hosts = ["a.com", "b.com", "a.com", "b.com", "c.com"];
        let found = hosts
            .iter()
            .enumerate()
            .map(|(i, host)| fx.push(NavigationEvent::new(format!("https://{host}"), at(i as i64))))
            .last()
            .unwrap();
        let categories: Vec<&str> = found
            .iter()
            .filter(|p| p.pattern_type == PatternType::Category)
            .map(|p| p.sequence.as_str())
            .collect();
        assert_eq!(categories, vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_search_to_browse() {
        let mut fx = Fixture::new();
        let found = fx.push(
            NavigationEvent::new("https://doc.rust-lang.org/book", at(0))
                .with_referrer("https://duckduckgo.com/?q=rust+book"),
        );
        let search = of_type(&found, PatternType::Search).unwrap();
        assert_eq!(search.sequence, "search:rust book -> browse:doc.rust-lang.org");
        assert_eq!(search.confidence, SEARCH_INITIAL_CONFIDENCE);
    }

    #[test]
    fn test_search_requires_search_engine_referrer() {
        let mut fx = Fixture::new();
        let found = fx.push(
            NavigationEvent::new("https://doc.rust-lang.org/book", at(0))
                .with_referrer("https://news.example.com/?q=rust")
                .with_search_terms("rust"),
        );
        assert!(of_type(&found, PatternType::Search).is_none());

        let no_referrer = fx.push(NavigationEvent::new("https://doc.rust-lang.org", at(1)));
        assert!(of_type(&no_referrer, PatternType::Search).is_none());
    }

    #[test]
    fn test_temporal_sequence_encoding() {
        assert_eq!(temporal_sequence(0, 7), "sun@07");
        assert_eq!(temporal_sequence(6, 23), "sat@23");
    }
}
