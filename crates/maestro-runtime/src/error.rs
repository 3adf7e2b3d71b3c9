//! Runtime error types.

use thiserror::Error;

/// Errors that can occur while assembling or running the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or validated.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] maestro_config::ConfigError),

    /// Logging could not be set up.
    #[error("Telemetry error: {0}")]
    TelemetryError(#[from] maestro_telemetry::TelemetryError),

    /// A configured name did not parse.
    #[error("Invalid value in {field}: {source}")]
    InvalidValue {
        /// Config field holding the value.
        field: String,
        /// Parse failure.
        #[source]
        source: maestro_core::CoreError,
    },

    /// Event bus error.
    #[error("Event bus error: {0}")]
    EventError(#[from] maestro_events::EventError),

    /// Agent registry error.
    #[error("Registry error: {0}")]
    RegistryError(#[from] maestro_agents::RegistryError),

    /// Coordinator error.
    #[error("Coordinator error: {0}")]
    CoordinatorError(#[from] maestro_coordinator::CoordinatorError),

    /// Workflow engine error.
    #[error("Workflow error: {0}")]
    WorkflowError(#[from] maestro_workflow::WorkflowError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
