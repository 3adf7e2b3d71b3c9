//! Workflow error types.

use thiserror::Error;

use maestro_core::InstanceId;

/// Failure reported by a step handler or condition checker.
///
/// Step failures are retried and recorded in the workflow history; they never
/// propagate out of the execution loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StepError {
    /// Human-readable failure description.
    pub message: String,
}

impl StepError {
    /// Create a step error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors returned by the workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No factory is registered under this workflow id.
    #[error("unknown workflow: {workflow_id}")]
    UnknownWorkflow {
        /// The workflow ID.
        workflow_id: String,
    },

    /// No instance with this id is running or waiting.
    #[error("workflow instance not found: {instance_id}")]
    InstanceNotFound {
        /// The instance ID.
        instance_id: InstanceId,
    },

    /// The workflow has no step with this id.
    #[error("unknown step {step_id} in workflow {workflow_id}")]
    UnknownStep {
        /// The workflow ID.
        workflow_id: String,
        /// The step ID.
        step_id: String,
    },

    /// The workflow definition is inconsistent.
    #[error("invalid workflow {workflow_id}: {reason}")]
    InvalidWorkflow {
        /// The workflow ID.
        workflow_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No tokio runtime is available to run the workflow.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// The engine is shutting down.
    #[error("workflow engine is shut down")]
    ShutDown,
}

/// Result type for workflow engine operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
