//! Bounded history of delivered events.

use std::collections::VecDeque;

use maestro_core::EventType;

use crate::event::Event;

/// Default number of events kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Filter applied when reading event history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only return events of this type.
    pub event_type: Option<EventType>,
    /// Only return events from this source.
    pub source: Option<String>,
    /// Return at most this many events (the most recent ones).
    pub limit: Option<usize>,
}

impl HistoryFilter {
    /// Create a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one event type.
    #[must_use]
    pub fn with_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    /// Restrict to one source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Limit the number of returned events.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &Event) -> bool {
        self.event_type.is_none_or(|t| t == event.event_type)
            && self.source.as_deref().is_none_or(|s| s == event.source)
    }
}

/// Ring buffer of the most recent delivered events.
#[derive(Debug)]
pub struct EventHistory {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventHistory {
    /// Create a history holding at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Append an event, evicting the oldest ones past capacity.
    pub fn push(&mut self, event: Event) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Events matching the filter, oldest first.
    #[must_use]
    pub fn query(&self, filter: &HistoryFilter) -> Vec<Event> {
        let matching: Vec<&Event> = self.events.iter().filter(|e| filter.matches(e)).collect();
        let skip = filter
            .limit
            .map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of stored events.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every stored event.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, n: i64) -> Event {
        Event::new(event_type, "test").with_field("n", n)
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = EventHistory::new(3);
        for n in 0..5 {
            history.push(event(EventType::UserAction, n));
        }

        assert_eq!(history.len(), 3);
        let kept: Vec<_> = history
            .query(&HistoryFilter::new())
            .iter()
            .map(|e| e.data["n"].as_i64().unwrap())
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn test_history_zero_capacity() {
        let mut history = EventHistory::new(0);
        history.push(event(EventType::UserAction, 1));
        assert!(history.is_empty());
    }

    #[test]
    fn test_query_filters_and_limits() {
        let mut history = EventHistory::new(10);
        history.push(event(EventType::UserAction, 1));
        history.push(event(EventType::DataSaved, 2));
        history.push(event(EventType::UserAction, 3));
        history.push(event(EventType::UserAction, 4));

        let filter = HistoryFilter::new()
            .with_type(EventType::UserAction)
            .with_limit(2);
        let found: Vec<_> = history
            .query(&filter)
            .iter()
            .map(|e| e.data["n"].as_i64().unwrap())
            .collect();
        assert_eq!(found, vec![3, 4]);

        let by_source = HistoryFilter::new().with_source("elsewhere");
        assert!(history.query(&by_source).is_empty());
    }
}
