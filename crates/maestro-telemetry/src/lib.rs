//! Maestro Telemetry - Logging for the Maestro runtime.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - Rolling file output through `tracing-appender`
//! - With the `config` feature, conversion from the `[logging]` section of
//!   `maestro-config`
//!
//! # Example
//!
//! ```rust,no_run
//! use maestro_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), maestro_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("maestro_events=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("Logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
