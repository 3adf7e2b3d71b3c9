//! Coordinator error types.

use thiserror::Error;

/// Errors that can occur when operating the coordinator.
///
/// Routing and dispatch failures are never reported through this type; they
/// come back as a failed [`Response`](crate::Response).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The request worker is already running.
    #[error("request worker already running")]
    AlreadyRunning,

    /// The request worker did not stop within the join timeout.
    #[error("request worker did not stop within {timeout_ms}ms")]
    WorkerJoinTimeout {
        /// Join timeout in milliseconds.
        timeout_ms: u64,
    },

    /// No tokio runtime is available to host the worker.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
