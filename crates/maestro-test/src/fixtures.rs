//! Test fixtures for common types.

use serde_json::Value;

use maestro_core::{Data, EventType};
use maestro_events::Event;

/// Build a payload map from `(key, value)` pairs.
#[must_use]
pub fn test_data<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Data {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Create a test event of the given type from source `"test"`.
#[must_use]
pub fn test_event(event_type: EventType) -> Event {
    Event::new(event_type, "test")
}

/// Create a test event carrying a payload.
#[must_use]
pub fn test_event_with<'a>(
    event_type: EventType,
    pairs: impl IntoIterator<Item = (&'a str, Value)>,
) -> Event {
    test_event(event_type).with_data(test_data(pairs))
}
