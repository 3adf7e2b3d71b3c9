//! Event type for the Maestro event bus.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use maestro_core::{CoreResult, Data, EventId, EventType, Priority, Timestamp, from_data, to_data};

/// A typed, timestamped notification.
///
/// Everything except `processed`, `result` and `error` is fixed once the
/// event is published; those three are filled in by the bus after delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// Kind of event, used to select subscribers.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event payload.
    #[serde(default)]
    pub data: Data,
    /// Delivery priority for the async queue.
    #[serde(default)]
    pub priority: Priority,
    /// Component that produced the event.
    pub source: String,
    /// Intended recipient, if any.
    #[serde(default)]
    pub target: Option<String>,
    /// When the event was created.
    pub timestamp: Timestamp,
    /// Whether the event has been delivered.
    #[serde(default)]
    pub processed: bool,
    /// Values returned by successful handlers.
    #[serde(default)]
    pub result: Option<Value>,
    /// Joined failure messages from handlers that failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with normal priority and an empty payload.
    #[must_use]
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            data: Data::new(),
            priority: Priority::Normal,
            source: source.into(),
            target: None,
            timestamp: Utc::now(),
            processed: false,
            result: None,
            error: None,
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    /// Insert one payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Convert to the map representation.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload value cannot be serialized.
    pub fn to_map(&self) -> CoreResult<Data> {
        to_data(self)
    }

    /// Rebuild an event from its map representation.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or malformed.
    pub fn from_map(map: Data) -> CoreResult<Self> {
        from_data(map)
    }
}
