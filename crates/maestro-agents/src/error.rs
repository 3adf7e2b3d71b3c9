//! Agent and registry error types.

use thiserror::Error;

/// Errors raised by an agent while handling a task.
///
/// Expected business failures should be returned as data by the agent; these
/// variants are for failures the caller cannot recover from on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The agent does not support the requested task type.
    #[error("unsupported task type: {0}")]
    Unsupported(String),

    /// The task data was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The agent failed while processing the task.
    #[error("{0}")]
    Failed(String),
}

impl AgentError {
    /// Create a processing failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors returned by the agent registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No agent is registered under this id.
    #[error("agent not found: {agent_id}")]
    AgentNotFound {
        /// The agent ID.
        agent_id: String,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
