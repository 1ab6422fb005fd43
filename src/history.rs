//! Bounded FIFO of recent normalized events
//!
//! Capacity starts at the configured maximum and can be lowered toward a floor
//! by the Performance Governor; it never grows past the initial value.

use crate::normalizer::NormalizedEvent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBuffer {
    events: VecDeque<NormalizedEvent>,
    capacity: usize,
    max_capacity: usize,
    floor: usize,
}

impl HistoryBuffer {
    /// Create a buffer; `floor` is clamped into `1..=capacity`
    pub fn new(capacity: usize, floor: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            max_capacity: capacity,
            floor: floor.clamp(1, capacity),
        }
    }

    /// Append an event, evicting the oldest entries at capacity
    pub fn push(&mut self, event: NormalizedEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Lower capacity by `step` (not below the floor). Returns the new capacity.
    pub fn shrink(&mut self, step: usize) -> usize {
        self.capacity = self.capacity.saturating_sub(step).max(self.floor);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        self.capacity
    }

    /// Raise capacity by `step` (not above the initial capacity). Returns the new capacity.
    pub fn grow(&mut self, step: usize) -> usize {
        self.capacity = self.capacity.saturating_add(step).min(self.max_capacity);
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    pub fn at_floor(&self) -> bool {
        self.capacity == self.floor
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &NormalizedEvent> + ExactSizeIterator {
        self.events.iter()
    }

    /// The most recent `n` events, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &NormalizedEvent> {
        self.events.iter().skip(self.events.len().saturating_sub(n))
    }

    pub fn latest(&self) -> Option<&NormalizedEvent> {
        self.events.back()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Replace contents with `events` (oldest first) at `capacity`, clamped to
    /// the floor and the initial capacity. Only the newest events are kept.
    pub fn restore(&mut self, capacity: usize, events: Vec<NormalizedEvent>) {
        self.capacity = capacity.clamp(self.floor, self.max_capacity);
        let skip = events.len().saturating_sub(self.capacity);
        self.events = events.into_iter().skip(skip).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::{EventNormalizer, SessionCursor};
    use crate::types::NavigationEvent;
    use chrono::{Duration, TimeZone, Utc};

    fn events(n: usize) -> Vec<NormalizedEvent> {
        let normalizer = EventNormalizer::default();
        let mut cursor = SessionCursor::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let event = NavigationEvent::new(
                    format!("https://site{i}.example.com"),
                    start + Duration::seconds(i as i64),
                )
                .with_id(format!("evt-{i}"));
                normalizer.normalize(event, &mut cursor)
            })
            .collect()
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = HistoryBuffer::new(3, 1);
        for event in events(5) {
            buffer.push(event);
        }

        assert_eq!(buffer.len(), 3);
        let ids: Vec<_> = buffer.iter().map(|e| e.event.id.as_str()).collect();
        assert_eq!(ids, vec!["evt-2", "evt-3", "evt-4"]);
    }

    #[test]
    fn test_shrink_respects_floor_and_truncates() {
        let mut buffer = HistoryBuffer::new(10, 4);
        for event in events(10) {
            buffer.push(event);
        }

        assert_eq!(buffer.shrink(5), 5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.latest().unwrap().event.id, "evt-9");

        assert_eq!(buffer.shrink(5), 4);
        assert!(buffer.at_floor());
        assert_eq!(buffer.shrink(5), 4);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_grow_capped_at_initial_capacity() {
        let mut buffer = HistoryBuffer::new(10, 2);
        buffer.shrink(6);
        assert_eq!(buffer.grow(3), 7);
        assert_eq!(buffer.grow(30), 10);
        assert_eq!(buffer.max_capacity(), 10);
    }

    #[test]
    fn test_recent_window() {
        let mut buffer = HistoryBuffer::new(10, 1);
        for event in events(6) {
            buffer.push(event);
        }

        let recent: Vec<_> = buffer.recent(2).map(|e| e.event.id.as_str()).collect();
        assert_eq!(recent, vec!["evt-4", "evt-5"]);
        assert_eq!(buffer.recent(50).count(), 6);
    }

    #[test]
    fn test_restore_clamps_capacity() {
        let mut buffer = HistoryBuffer::new(10, 4);
        buffer.restore(2, events(8));
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.iter().next().unwrap().event.id, "evt-4");

        buffer.restore(50, events(3));
        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.len(), 3);
    }
}
