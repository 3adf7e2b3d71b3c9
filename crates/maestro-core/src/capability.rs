//! Agent capabilities, the unit of routing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A named skill an agent declares.
///
/// Capabilities carry no data; routing only compares identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    /// Read records from the application database.
    DatabaseRead,
    /// Write records to the application database.
    DatabaseWrite,
    /// Classify and extract fields from incoming email.
    EmailAnalysis,
    /// Detect recurring patterns across analysed data.
    PatternDetection,
    /// Deliver user notifications.
    Notification,
    /// Produce reports.
    ReportGeneration,
    /// Validate submitted data.
    DataValidation,
    /// Import and transform files.
    FileProcessing,
    /// Schedule deferred work.
    Scheduling,
    /// Prompt the user for input.
    UserInteraction,
}

impl AgentCapability {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::DatabaseRead,
        Self::DatabaseWrite,
        Self::EmailAnalysis,
        Self::PatternDetection,
        Self::Notification,
        Self::ReportGeneration,
        Self::DataValidation,
        Self::FileProcessing,
        Self::Scheduling,
        Self::UserInteraction,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DatabaseRead => "database_read",
            Self::DatabaseWrite => "database_write",
            Self::EmailAnalysis => "email_analysis",
            Self::PatternDetection => "pattern_detection",
            Self::Notification => "notification",
            Self::ReportGeneration => "report_generation",
            Self::DataValidation => "data_validation",
            Self::FileProcessing => "file_processing",
            Self::Scheduling => "scheduling",
            Self::UserInteraction => "user_interaction",
        }
    }
}

impl fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentCapability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| CoreError::UnknownName {
                kind: "capability",
                value: s.to_string(),
            })
    }
}
