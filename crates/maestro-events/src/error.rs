//! Event bus error types.

use thiserror::Error;

/// Error returned by an event handler.
///
/// Handlers report expected failures through this type; the bus records the
/// message in the delivery result and keeps delivering to the remaining
/// subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable failure description.
    pub message: String,
}

impl HandlerError {
    /// Create a handler error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors that can occur when operating the event bus.
#[derive(Debug, Error)]
pub enum EventError {
    /// The async queue consumer is already running.
    #[error("async consumer already running")]
    ConsumerAlreadyRunning,

    /// The async queue consumer did not stop within the join timeout.
    #[error("async consumer did not stop within {timeout_ms}ms")]
    ConsumerJoinTimeout {
        /// Join timeout in milliseconds.
        timeout_ms: u64,
    },

    /// No tokio runtime is available to host the consumer.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for event bus operations.
pub type EventResult<T> = Result<T, EventError>;
