//! Closed sets of event and request kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Every kind of event that can travel over the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // ========== Domain traffic ==========
    /// A new email arrived.
    EmailReceived,
    /// An email finished analysis.
    EmailAnalyzed,
    /// The user submitted data for storage.
    DataSubmitted,
    /// Data was persisted.
    DataSaved,
    /// A pattern was detected.
    PatternDetected,
    /// Data needs validation.
    ValidationRequested,
    /// A report was requested.
    ReportRequested,
    /// A file was uploaded.
    FileUploaded,
    /// A notification should be sent.
    NotificationRequested,
    /// The user performed an action in the UI.
    UserAction,

    // ========== Agent lifecycle ==========
    /// An agent was registered.
    AgentRegistered,
    /// An agent was unregistered.
    AgentUnregistered,
    /// An agent changed status.
    AgentStatusChanged,

    // ========== Workflow lifecycle ==========
    /// A workflow instance started.
    WorkflowStarted,
    /// A workflow instance completed.
    WorkflowCompleted,
    /// A workflow instance failed.
    WorkflowFailed,
    /// A workflow instance was cancelled.
    WorkflowCancelled,

    // ========== System ==========
    /// A component reported an unexpected error.
    SystemError,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [Self; 18] = [
        Self::EmailReceived,
        Self::EmailAnalyzed,
        Self::DataSubmitted,
        Self::DataSaved,
        Self::PatternDetected,
        Self::ValidationRequested,
        Self::ReportRequested,
        Self::FileUploaded,
        Self::NotificationRequested,
        Self::UserAction,
        Self::AgentRegistered,
        Self::AgentUnregistered,
        Self::AgentStatusChanged,
        Self::WorkflowStarted,
        Self::WorkflowCompleted,
        Self::WorkflowFailed,
        Self::WorkflowCancelled,
        Self::SystemError,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailReceived => "email_received",
            Self::EmailAnalyzed => "email_analyzed",
            Self::DataSubmitted => "data_submitted",
            Self::DataSaved => "data_saved",
            Self::PatternDetected => "pattern_detected",
            Self::ValidationRequested => "validation_requested",
            Self::ReportRequested => "report_requested",
            Self::FileUploaded => "file_uploaded",
            Self::NotificationRequested => "notification_requested",
            Self::UserAction => "user_action",
            Self::AgentRegistered => "agent_registered",
            Self::AgentUnregistered => "agent_unregistered",
            Self::AgentStatusChanged => "agent_status_changed",
            Self::WorkflowStarted => "workflow_started",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::SystemError => "system_error",
        }
    }

    /// Check if this event reports on the runtime itself rather than
    /// carrying domain traffic.
    #[must_use]
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Self::AgentRegistered
                | Self::AgentUnregistered
                | Self::AgentStatusChanged
                | Self::WorkflowStarted
                | Self::WorkflowCompleted
                | Self::WorkflowFailed
                | Self::WorkflowCancelled
                | Self::SystemError
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| CoreError::UnknownName {
                kind: "event type",
                value: s.to_string(),
            })
    }
}

/// Every kind of unit of work the coordinator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Analyse an email.
    AnalyzeEmail,
    /// Look for patterns in stored data.
    DetectPatterns,
    /// Persist data.
    SaveData,
    /// Query stored data.
    QueryData,
    /// Validate data.
    ValidateData,
    /// Send a notification.
    SendNotification,
    /// Produce a report.
    GenerateReport,
    /// Process an uploaded file.
    ProcessFile,
    /// Schedule deferred work.
    ScheduleTask,
    /// Application-defined work with no default routing.
    Custom,
}

impl RequestType {
    /// Every request type, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::AnalyzeEmail,
        Self::DetectPatterns,
        Self::SaveData,
        Self::QueryData,
        Self::ValidateData,
        Self::SendNotification,
        Self::GenerateReport,
        Self::ProcessFile,
        Self::ScheduleTask,
        Self::Custom,
    ];

    /// Stable snake_case name. This is the task type string handed to
    /// `Agent::handle`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzeEmail => "analyze_email",
            Self::DetectPatterns => "detect_patterns",
            Self::SaveData => "save_data",
            Self::QueryData => "query_data",
            Self::ValidateData => "validate_data",
            Self::SendNotification => "send_notification",
            Self::GenerateReport => "generate_report",
            Self::ProcessFile => "process_file",
            Self::ScheduleTask => "schedule_task",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| CoreError::UnknownName {
                kind: "request type",
                value: s.to_string(),
            })
    }
}
