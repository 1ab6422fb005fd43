//! Parsing of navigation events arriving as JSON
//!
//! Collaborators hand events over either as a JSON array or as NDJSON (one
//! event per line). Missing ids are filled with a fresh UUID by the event type
//! itself; everything else optional is left absent.

use crate::error::WayfindError;
use crate::normalizer::category_for;
use crate::types::{NavigationEvent, UNKNOWN_CATEGORY};

/// Adapter for converting JSON payloads into navigation events
pub struct EventAdapter;

impl EventAdapter {
    /// Parse a single JSON object
    pub fn parse_event(json: &str) -> Result<NavigationEvent, WayfindError> {
        let event: NavigationEvent = serde_json::from_str(json)?;
        Ok(event)
    }

    /// Parse a JSON string containing an array of events
    pub fn parse_array(json: &str) -> Result<Vec<NavigationEvent>, WayfindError> {
        let events: Vec<NavigationEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON); blank lines are skipped
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<NavigationEvent>, WayfindError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<NavigationEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(WayfindError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Parse either form, choosing by the first non-blank character
    pub fn parse(input: &str) -> Result<Vec<NavigationEvent>, WayfindError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Events whose URL will fall back to the `unknown` category
    pub fn validate_events(events: &[NavigationEvent]) -> Vec<ValidationIssue> {
        events
            .iter()
            .enumerate()
            .filter(|(_, event)| category_for(&event.url) == UNKNOWN_CATEGORY)
            .map(|(index, event)| ValidationIssue {
                index,
                event_id: event.id.clone(),
                message: format!("unparseable url {:?}", event.url),
            })
            .collect()
    }
}

/// An event that will be ingested with degraded signal
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub index: usize,
    pub event_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array() {
        let json = r#"[
            {"url": "https://a.com", "timestamp": "2024-01-16T14:00:00Z"},
            {"id": "e2", "url": "https://b.com", "timestamp": "2024-01-16T14:01:00Z", "type": "search"}
        ]"#;
        let events = EventAdapter::parse_array(json).unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events[0].id.is_empty());
        assert_eq!(events[1].id, "e2");
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"url\": \"https://a.com\", \"timestamp\": \"2024-01-16T14:00:00Z\"}\n\n{oops}\n";
        let err = EventAdapter::parse_ndjson(ndjson).unwrap_err();
        match err {
            WayfindError::ParseError(msg) => assert!(msg.contains("line 3"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_detects_format() {
        let ndjson = "{\"url\": \"https://a.com\", \"timestamp\": \"2024-01-16T14:00:00Z\"}\n\
                      {\"url\": \"https://b.com\", \"timestamp\": \"2024-01-16T14:01:00Z\"}";
        assert_eq!(EventAdapter::parse(ndjson).unwrap().len(), 2);
        assert_eq!(EventAdapter::parse("  []").unwrap().len(), 0);
    }

    #[test]
    fn test_missing_timestamp_is_error() {
        assert!(matches!(
            EventAdapter::parse_event(r#"{"url": "https://a.com"}"#),
            Err(WayfindError::JsonError(_))
        ));
    }

    #[test]
    fn test_validate_flags_unparseable_urls() {
        let events = EventAdapter::parse_array(
            r#"[
                {"id": "ok", "url": "https://a.com", "timestamp": "2024-01-16T14:00:00Z"},
                {"id": "bad", "url": "not a url", "timestamp": "2024-01-16T14:01:00Z"}
            ]"#,
        )
        .unwrap();
        let issues = EventAdapter::validate_events(&events);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].event_id, "bad");
        assert_eq!(issues[0].index, 1);
    }
}
