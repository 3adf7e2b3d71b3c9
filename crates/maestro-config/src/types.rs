//! Configuration struct definitions.
//!
//! Every section uses `#[serde(default)]`, so a partial file only needs the
//! fields it changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event bus settings.
    pub events: EventsSection,
    /// Request coordinator settings.
    pub coordinator: CoordinatorSection,
    /// Workflow engine settings.
    pub workflows: WorkflowsSection,
    /// Shutdown behavior.
    pub shutdown: ShutdownSection,
    /// Logging and tracing.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// EventsSection
// ---------------------------------------------------------------------------

/// Event bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    /// Number of delivered events kept in the history ring.
    pub history_capacity: usize,
    /// How often the async consumer checks for a stop signal while idle.
    pub poll_interval_ms: u64,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            poll_interval_ms: 100,
        }
    }
}

impl EventsSection {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// CoordinatorSection
// ---------------------------------------------------------------------------

/// Request coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    /// How often the request worker checks for a stop signal while idle.
    pub queue_poll_interval_ms: u64,
    /// Request type to capability names, replacing the built-in mapping for
    /// that request type. An empty list removes the mapping.
    pub capability_overrides: BTreeMap<String, Vec<String>>,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            queue_poll_interval_ms: 100,
            capability_overrides: BTreeMap::new(),
        }
    }
}

impl CoordinatorSection {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// WorkflowsSection
// ---------------------------------------------------------------------------

/// Workflow engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsSection {
    /// Workflows allowed to execute at once.
    pub max_concurrent: usize,
    /// Finished runs kept in the engine history.
    pub history_capacity: usize,
    /// Runs allowed to sit waiting for user input before the oldest is
    /// cancelled.
    pub max_parked: usize,
}

impl Default for WorkflowsSection {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            history_capacity: 1000,
            max_parked: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// ShutdownSection
// ---------------------------------------------------------------------------

/// Shutdown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSection {
    /// How long to wait for each background task to stop.
    pub join_timeout_ms: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            join_timeout_ms: 2000,
        }
    }
}

impl ShutdownSection {
    /// Join timeout as a [`Duration`].
    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"` (human-friendly), `"compact"` (one-line),
    /// `"json"` (structured), or `"full"` (verbose).
    pub format: String,
    /// Per-crate tracing directives (e.g. `["maestro_events=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: Config = toml::from_str("[events]\npoll_interval_ms = 50").unwrap();
        assert_eq!(config.events.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.events.history_capacity, 1000);
        assert_eq!(config.workflows, WorkflowsSection::default());
    }

    #[test]
    fn test_capability_overrides_parse() {
        let config: Config = toml::from_str(
            r#"
            [coordinator.capability_overrides]
            query_data = ["database_read", "file_processing"]
            send_notification = []
        "#,
        )
        .unwrap();
        let overrides = &config.coordinator.capability_overrides;
        assert_eq!(overrides["query_data"].len(), 2);
        assert!(overrides["send_notification"].is_empty());
    }
}
