//! Registry bookkeeping for agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use maestro_core::{AgentCapability, CoreResult, Data, DisplayNames, from_data, to_data};

/// Availability of an agent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered but not accepting work.
    Inactive,
    /// Available for dispatch.
    #[default]
    Active,
    /// Currently handling a task.
    Busy,
    /// Last dispatch left the agent in an error state.
    Error,
    /// Administratively disabled.
    Disabled,
}

impl AgentStatus {
    /// Lowercase name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Busy => "busy",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the registry knows about an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Registry id.
    pub id: String,
    /// Display names keyed by locale.
    #[serde(default)]
    pub names: DisplayNames,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Declared capabilities.
    pub capabilities: BTreeSet<AgentCapability>,
    /// Current status.
    pub status: AgentStatus,
    /// Tie-break for capability lookup; higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Number of recorded dispatches.
    #[serde(default)]
    pub usage_count: u64,
    /// Number of recorded failed dispatches.
    #[serde(default)]
    pub error_count: u64,
    /// Mean dispatch latency in milliseconds.
    #[serde(default)]
    pub avg_response_time_ms: f64,
    /// Free-form metadata supplied at registration.
    #[serde(default)]
    pub metadata: Data,
    /// When the agent was registered.
    pub registered_at: DateTime<Utc>,
    /// When the agent last handled a task.
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl AgentInfo {
    /// Create info for a freshly registered agent.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        capabilities: BTreeSet<AgentCapability>,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            names: DisplayNames::new(),
            description: String::new(),
            capabilities,
            status: AgentStatus::Active,
            priority,
            usage_count: 0,
            error_count: 0,
            avg_response_time_ms: 0.0,
            metadata: Data::new(),
            registered_at: Utc::now(),
            last_used: None,
        }
    }

    /// Check whether the agent declares a capability.
    #[must_use]
    pub fn has_capability(&self, capability: AgentCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Fold one dispatch into the counters.
    ///
    /// The mean is updated incrementally so it never depends on a stored sum.
    #[allow(clippy::cast_precision_loss, clippy::arithmetic_side_effects)]
    pub fn record(&mut self, latency_ms: f64, success: bool) {
        self.usage_count = self.usage_count.saturating_add(1);
        if !success {
            self.error_count = self.error_count.saturating_add(1);
        }
        let n = self.usage_count as f64;
        self.avg_response_time_ms += (latency_ms - self.avg_response_time_ms) / n;
        self.last_used = Some(Utc::now());
    }

    /// Fraction of dispatches that succeeded, or `None` before any dispatch.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::arithmetic_side_effects)]
    pub fn success_rate(&self) -> Option<f64> {
        if self.usage_count == 0 {
            return None;
        }
        let ok = self.usage_count.saturating_sub(self.error_count) as f64;
        Some(ok / self.usage_count as f64)
    }

    /// Convert to the map representation.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be serialized.
    pub fn to_map(&self) -> CoreResult<Data> {
        to_data(self)
    }

    /// Rebuild from the map representation.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or malformed.
    pub fn from_map(map: Data) -> CoreResult<Self> {
        from_data(map)
    }
}

/// Aggregate view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStatistics {
    /// Number of registered agents.
    pub total_agents: usize,
    /// Agent count per status.
    pub by_status: BTreeMap<AgentStatus, usize>,
    /// Agent count per capability.
    pub by_capability: BTreeMap<AgentCapability, usize>,
    /// Sum of usage counts.
    pub total_usage: u64,
    /// Sum of error counts.
    pub total_errors: u64,
    /// Number of capability lookups served.
    pub capability_lookups: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::display_names;
    use serde_json::json;

    #[test]
    fn test_new_agent_is_active() {
        let info = AgentInfo::new("db", BTreeSet::from([AgentCapability::DatabaseRead]), 3);
        assert_eq!(info.status, AgentStatus::Active);
        assert!(info.has_capability(AgentCapability::DatabaseRead));
        assert!(!info.has_capability(AgentCapability::Notification));
        assert!(info.success_rate().is_none());
    }

    #[test]
    fn test_record_running_mean() {
        let mut info = AgentInfo::new("a", BTreeSet::new(), 0);
        let latencies = [10.0, 20.0, 60.0, 5.5, 104.5];
        let mut sum = 0.0;
        for (i, latency) in latencies.iter().enumerate() {
            info.record(*latency, i != 2);
            sum += latency;
            #[allow(clippy::cast_precision_loss)]
            let mean = sum / (i + 1) as f64;
            assert!((info.avg_response_time_ms - mean).abs() < 1e-9);
        }
        assert_eq!(info.usage_count, 5);
        assert_eq!(info.error_count, 1);
        assert!(info.last_used.is_some());
        assert!((info.success_rate().unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_agent_info_map_round_trip() {
        let mut info = AgentInfo::new(
            "mailer",
            BTreeSet::from([AgentCapability::Notification, AgentCapability::Scheduling]),
            7,
        );
        info.names = display_names([("en", "Mailer"), ("fr", "Courrier")]);
        info.description = "Sends notifications".to_string();
        info.status = AgentStatus::Busy;
        info.record(12.5, true);
        info.record(7.5, false);
        info.metadata.insert("version".to_string(), json!("1.2"));

        let map = info.to_map().unwrap();
        assert_eq!(map.get("status"), Some(&json!("busy")));

        let restored = AgentInfo::from_map(map).unwrap();
        assert_eq!(restored, info);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AgentStatus::Disabled.to_string(), "disabled");
        assert_eq!(AgentStatus::default(), AgentStatus::Active);
    }
}
