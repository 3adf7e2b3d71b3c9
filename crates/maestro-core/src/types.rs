//! Common types used throughout Maestro.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Opaque string-keyed payload carried by events, requests, responses and
/// workflow contexts. Its schema belongs to whoever produces it.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// UTC point in time used for event, response and history timestamps.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Localised display names keyed by locale tag (`"en"`, `"fr"`, ...).
pub type DisplayNames = BTreeMap<String, String>;

/// Build a [`DisplayNames`] map from `(locale, name)` pairs.
#[must_use]
pub fn display_names<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> DisplayNames {
    pairs
        .into_iter()
        .map(|(locale, name)| (locale.to_string(), name.to_string()))
        .collect()
}

/// Serialize a value into its [`Data`] map representation.
///
/// # Errors
///
/// Returns an error if serialization fails or the value is not a struct/map.
pub fn to_data<T: Serialize>(value: &T) -> CoreResult<Data> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(CoreError::NotAMap(other.to_string())),
    }
}

/// Rebuild a value from its [`Data`] map representation.
///
/// # Errors
///
/// Returns an error if the map does not describe a valid `T`.
pub fn from_data<T: for<'de> Deserialize<'de>>(data: Data) -> CoreResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(data))?)
}

/// Urgency of an event or request.
///
/// Ordering follows urgency: `Low < Normal < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Should be handled ahead of normal traffic.
    High,
    /// Handled before everything else.
    Urgent,
}

impl Priority {
    /// Numeric weight of the priority (1 for `Low` up to 4 for `Urgent`).
    #[must_use]
    pub fn weight(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// Unique identifier for a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new random event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event:{}", self.0)
    }
}

/// Unique identifier for a coordinator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request:{}", self.0)
    }
}

/// Unique identifier for one run of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Create a new random instance ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance:{}", self.0)
    }
}
