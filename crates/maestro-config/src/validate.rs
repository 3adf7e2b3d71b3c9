//! Post-merge configuration validation.
//!
//! Validates that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound for any history ring.
const MAX_HISTORY_CAPACITY: usize = 1_000_000;

/// Upper bound for poll intervals (one minute).
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Upper bound for the shutdown join timeout (five minutes).
const MAX_JOIN_TIMEOUT_MS: u64 = 300_000;

/// Upper bound for concurrently executing workflows.
const MAX_CONCURRENT_WORKFLOWS: usize = 4096;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_events(config)?;
    validate_coordinator(config)?;
    validate_workflows(config)?;
    validate_shutdown(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message,
    }
}

fn check_range<T>(field: &str, value: T, min: T, max: T) -> ConfigResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(invalid(
            field,
            format!("{value} is out of range; must be between {min} and {max}"),
        ));
    }
    Ok(())
}

fn validate_events(config: &Config) -> ConfigResult<()> {
    let e = &config.events;
    check_range(
        "events.history_capacity",
        e.history_capacity,
        1,
        MAX_HISTORY_CAPACITY,
    )?;
    check_range(
        "events.poll_interval_ms",
        e.poll_interval_ms,
        1,
        MAX_POLL_INTERVAL_MS,
    )
}

fn validate_coordinator(config: &Config) -> ConfigResult<()> {
    let c = &config.coordinator;
    check_range(
        "coordinator.queue_poll_interval_ms",
        c.queue_poll_interval_ms,
        1,
        MAX_POLL_INTERVAL_MS,
    )?;

    for (request_type, capabilities) in &c.capability_overrides {
        if request_type.trim().is_empty() {
            return Err(invalid(
                "coordinator.capability_overrides",
                "request type must not be empty".to_owned(),
            ));
        }
        if capabilities.iter().any(|cap| cap.trim().is_empty()) {
            return Err(invalid(
                &format!("coordinator.capability_overrides.{request_type}"),
                "capability names must not be empty".to_owned(),
            ));
        }
    }
    Ok(())
}

fn validate_workflows(config: &Config) -> ConfigResult<()> {
    let w = &config.workflows;
    check_range(
        "workflows.max_concurrent",
        w.max_concurrent,
        1,
        MAX_CONCURRENT_WORKFLOWS,
    )?;
    check_range(
        "workflows.history_capacity",
        w.history_capacity,
        1,
        MAX_HISTORY_CAPACITY,
    )?;
    check_range("workflows.max_parked", w.max_parked, 1, MAX_HISTORY_CAPACITY)
}

fn validate_shutdown(config: &Config) -> ConfigResult<()> {
    check_range(
        "shutdown.join_timeout_ms",
        config.shutdown.join_timeout_ms,
        1,
        MAX_JOIN_TIMEOUT_MS,
    )
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}
