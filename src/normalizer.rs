//! Navigation event normalization
//!
//! Converts raw navigation events into their canonical form: a category key
//! derived from the hostname, a referrer classification, local day/hour and
//! session position.

use crate::config::{RecognizerConfig, MAX_SESSION_GAP_MINUTES};
use crate::types::{NavigationEvent, UNKNOWN_CATEGORY};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Domain labels recognised as search engines
const SEARCH_ENGINE_LABELS: &[&str] = &[
    "google",
    "bing",
    "duckduckgo",
    "yahoo",
    "baidu",
    "yandex",
    "ecosia",
    "startpage",
];

/// Query parameters that carry search terms, in lookup order
const SEARCH_QUERY_PARAMS: &[&str] = &["q", "query", "search", "p"];

/// How the user arrived at a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferrerKind {
    /// No usable referrer
    #[default]
    None,
    /// Referrer shares the destination category
    Internal,
    /// Referrer is a known search engine
    SearchEngine,
    /// Any other site
    External,
}

/// A navigation event in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub event: NavigationEvent,
    /// Category key of the destination URL
    pub category: String,
    /// Category key of the referrer, when it parses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_category: Option<String>,
    pub referrer_kind: ReferrerKind,
    /// Terms pulled from a search-engine referrer or the event metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_terms: Option<String>,
    /// Local day of week, 0 = Sunday
    pub day_of_week: u8,
    /// Local hour, 0-23
    pub hour: u8,
    /// Session ordinal
    pub session: u64,
    /// Elapsed session time at this event
    pub session_duration_ms: u64,
    /// False when the URL or referrer could not be parsed
    pub well_formed: bool,
}

/// Tracks session boundaries across the event stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCursor {
    pub session: u64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl SessionCursor {
    /// Advance to `at`, opening a new session after an inactivity gap.
    /// Returns the session ordinal and the elapsed session time.
    pub fn advance(&mut self, at: DateTime<Utc>, gap: Duration) -> (u64, u64) {
        let new_session = match (self.started_at, self.last_seen) {
            (Some(_), Some(last)) => at - last > gap,
            _ => true,
        };

        if new_session {
            if self.started_at.is_some() {
                self.session += 1;
            }
            self.started_at = Some(at);
        }
        // Out-of-order events never move the cursor backwards
        self.last_seen = Some(self.last_seen.map_or(at, |last| last.max(at)));

        let elapsed = self
            .started_at
            .map(|start| (at - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        (self.session, elapsed)
    }
}

/// Normalizer for navigation events
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    offset: FixedOffset,
    session_gap: Duration,
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::from_config(&RecognizerConfig::default())
    }
}

impl EventNormalizer {
    pub fn from_config(config: &RecognizerConfig) -> Self {
        let offset =
            FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            session_gap: Duration::minutes(
                config
                    .session_gap_minutes
                    .clamp(1, MAX_SESSION_GAP_MINUTES),
            ),
        }
    }

    /// Normalize one event. Never fails: unparseable URLs fall back to the
    /// `unknown` category and clear `well_formed`.
    pub fn normalize(&self, event: NavigationEvent, cursor: &mut SessionCursor) -> NormalizedEvent {
        let destination = parse_url(&event.url);
        let category = destination
            .as_ref()
            .and_then(category_of)
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

        let referrer = event
            .referrer
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| (r, parse_url(r)));

        let referrer_ok = referrer.as_ref().map_or(true, |(_, parsed)| parsed.is_some());
        let referrer_category = referrer
            .as_ref()
            .and_then(|(_, parsed)| parsed.as_ref())
            .and_then(category_of);

        let referrer_kind = match referrer_category.as_deref() {
            None => ReferrerKind::None,
            Some(r) if r == category => ReferrerKind::Internal,
            Some(r) if is_search_engine(r) => ReferrerKind::SearchEngine,
            Some(_) => ReferrerKind::External,
        };

        let search_terms = match (&referrer_kind, &referrer) {
            (ReferrerKind::SearchEngine, Some((_, Some(url)))) => extract_search_terms(url),
            _ => None,
        }
        .or_else(|| event.metadata.search_terms.as_deref().and_then(clean_terms));

        let local = event.timestamp.with_timezone(&self.offset);
        let (session, session_duration_ms) = cursor.advance(event.timestamp, self.session_gap);

        NormalizedEvent {
            category,
            referrer_category,
            referrer_kind,
            search_terms,
            day_of_week: local.weekday().num_days_from_sunday() as u8,
            hour: local.hour() as u8,
            session,
            session_duration_ms,
            well_formed: destination.is_some() && referrer_ok,
            event,
        }
    }
}

/// Derive the category key for a URL string, `unknown` when it cannot be parsed
pub fn category_for(url: &str) -> String {
    parse_url(url)
        .as_ref()
        .and_then(category_of)
        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
}

/// Parse a URL, accepting bare hostnames such as `example.com/path`
fn parse_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase)
            if !raw.contains(char::is_whitespace) && !raw.starts_with('/') =>
        {
            Url::parse(&format!("https://{raw}")).ok()
        }
        Err(_) => None,
    }
}

fn category_of(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Whether a category key belongs to a known search engine.
///
/// Matches on any label except the top-level one, so `google.co.uk` and
/// `search.yahoo.com` both qualify.
pub fn is_search_engine(category: &str) -> bool {
    let labels: Vec<&str> = category.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels[..labels.len() - 1]
        .iter()
        .any(|label| SEARCH_ENGINE_LABELS.contains(label))
}

fn extract_search_terms(url: &Url) -> Option<String> {
    SEARCH_QUERY_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, _)| key == param)
            .and_then(|(_, value)| clean_terms(&value))
    })
}

/// Lowercase and collapse whitespace; empty terms are dropped
fn clean_terms(raw: &str) -> Option<String> {
    let terms = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if terms.is_empty() {
        None
    } else {
        Some(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        // 2024-01-16 is a Tuesday
        Utc.with_ymd_and_hms(2024, 1, 16, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_category_strips_www_and_lowercases() {
        assert_eq!(category_for("https://WWW.Example.com/path?x=1"), "example.com");
        assert_eq!(category_for("http://docs.rs/serde"), "docs.rs");
        assert_eq!(category_for("example.org/page"), "example.org");
    }

    #[test]
    fn test_malformed_url_is_unknown() {
        assert_eq!(category_for("not a url"), UNKNOWN_CATEGORY);
        assert_eq!(category_for(""), UNKNOWN_CATEGORY);
        assert_eq!(category_for("file:///etc/hosts"), UNKNOWN_CATEGORY);
    }

    #[test]
    fn test_normalize_malformed_event_still_recorded() {
        let normalizer = EventNormalizer::default();
        let mut cursor = SessionCursor::default();
        let event = NavigationEvent::new("not a url", at(9, 0));

        let normalized = normalizer.normalize(event, &mut cursor);
        assert_eq!(normalized.category, UNKNOWN_CATEGORY);
        assert!(!normalized.well_formed);
    }

    #[test]
    fn test_search_engine_referrer_terms() {
        let normalizer = EventNormalizer::default();
        let mut cursor = SessionCursor::default();
        let event = NavigationEvent::new("https://doc.rust-lang.org/book", at(9, 0))
            .with_referrer("https://www.google.com/search?q=Rust+Borrow%20Checker");

        let normalized = normalizer.normalize(event, &mut cursor);
        assert_eq!(normalized.referrer_kind, ReferrerKind::SearchEngine);
        assert_eq!(normalized.referrer_category.as_deref(), Some("google.com"));
        assert_eq!(normalized.search_terms.as_deref(), Some("rust borrow checker"));
    }

    #[test]
    fn test_search_param_fallback_order() {
        let url = Url::parse("https://search.yahoo.com/search?fr=x&p=weather+today").unwrap();
        assert_eq!(extract_search_terms(&url).as_deref(), Some("weather today"));

        let empty = Url::parse("https://duckduckgo.com/?q=").unwrap();
        assert_eq!(extract_search_terms(&empty), None);
    }

    #[test]
    fn test_referrer_kinds() {
        let normalizer = EventNormalizer::default();
        let mut cursor = SessionCursor::default();

        let internal = normalizer.normalize(
            NavigationEvent::new("https://example.com/b", at(9, 0))
                .with_referrer("https://www.example.com/a"),
            &mut cursor,
        );
        assert_eq!(internal.referrer_kind, ReferrerKind::Internal);

        let external = normalizer.normalize(
            NavigationEvent::new("https://example.com/b", at(9, 1))
                .with_referrer("https://news.ycombinator.com"),
            &mut cursor,
        );
        assert_eq!(external.referrer_kind, ReferrerKind::External);
        assert!(external.search_terms.is_none());

        let none = normalizer.normalize(
            NavigationEvent::new("https://example.com/b", at(9, 2)).with_referrer("  "),
            &mut cursor,
        );
        assert_eq!(none.referrer_kind, ReferrerKind::None);
        assert!(none.well_formed);
    }

    #[test]
    fn test_is_search_engine() {
        assert!(is_search_engine("google.com"));
        assert!(is_search_engine("google.co.uk"));
        assert!(is_search_engine("search.yahoo.com"));
        assert!(!is_search_engine("google"));
        assert!(!is_search_engine("notgoogle.com"));
        assert!(!is_search_engine("example.bing"));
    }

    #[test]
    fn test_day_and_hour_with_offset() {
        let config = RecognizerConfig {
            utc_offset_minutes: -5 * 60,
            ..Default::default()
        };
        let normalizer = EventNormalizer::from_config(&config);
        let mut cursor = SessionCursor::default();

        // 03:00 UTC Tuesday is 22:00 Monday at UTC-5
        let normalized =
            normalizer.normalize(NavigationEvent::new("https://example.com", at(3, 0)), &mut cursor);
        assert_eq!(normalized.day_of_week, 1);
        assert_eq!(normalized.hour, 22);
    }

    #[test]
    fn test_session_cursor_gap() {
        let mut cursor = SessionCursor::default();
        let gap = Duration::minutes(30);

        assert_eq!(cursor.advance(at(9, 0), gap), (0, 0));
        assert_eq!(cursor.advance(at(9, 10), gap), (0, 600_000));
        assert_eq!(cursor.advance(at(9, 30), gap), (0, 1_800_000));
        // 31 minutes of silence opens a new session
        assert_eq!(cursor.advance(at(10, 1), gap), (1, 0));
    }

    #[test]
    fn test_session_cursor_out_of_order() {
        let mut cursor = SessionCursor::default();
        let gap = Duration::minutes(30);

        cursor.advance(at(9, 10), gap);
        let (session, elapsed) = cursor.advance(at(9, 5), gap);
        assert_eq!(session, 0);
        assert_eq!(elapsed, 0);
        assert_eq!(cursor.last_seen, Some(at(9, 10)));
    }
}
