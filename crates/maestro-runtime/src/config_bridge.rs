//! Bridge from `maestro_config::Config` to component settings.
//!
//! The config crate has no dependencies on other internal crates; this module
//! turns its plain values into the types each component expects.

use std::str::FromStr;

use maestro_config::Config;
use maestro_coordinator::{CoordinatorConfig, RoutingTable};
use maestro_core::{AgentCapability, CoreError};
use maestro_events::BusConfig;
use maestro_telemetry::LogConfig;
use maestro_workflow::EngineConfig;

use crate::error::{RuntimeError, RuntimeResult};

/// Event bus settings.
#[must_use]
pub fn to_bus_config(cfg: &Config) -> BusConfig {
    BusConfig {
        history_capacity: cfg.events.history_capacity,
        poll_interval: cfg.events.poll_interval(),
        join_timeout: cfg.shutdown.join_timeout(),
    }
}

/// Coordinator settings.
#[must_use]
pub fn to_coordinator_config(cfg: &Config) -> CoordinatorConfig {
    CoordinatorConfig {
        queue_poll_interval: cfg.coordinator.queue_poll_interval(),
        join_timeout: cfg.shutdown.join_timeout(),
    }
}

/// Default routing with the configured capability overrides applied.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidValue`] for an unknown request type or
/// capability name.
pub fn to_routing_table(cfg: &Config) -> RuntimeResult<RoutingTable> {
    let mut routing = RoutingTable::default();
    for (request_type, capabilities) in &cfg.coordinator.capability_overrides {
        let field = format!("coordinator.capability_overrides.{request_type}");
        let request_type = parse(&field, request_type)?;
        let capabilities = capabilities
            .iter()
            .map(|name| parse::<AgentCapability>(&field, name))
            .collect::<RuntimeResult<Vec<_>>>()?;
        routing.set_capabilities(request_type, capabilities);
    }
    Ok(routing)
}

/// Workflow engine settings.
#[must_use]
pub fn to_engine_config(cfg: &Config) -> EngineConfig {
    EngineConfig {
        max_concurrent: cfg.workflows.max_concurrent,
        history_capacity: cfg.workflows.history_capacity,
        max_parked: cfg.workflows.max_parked,
        join_timeout: cfg.shutdown.join_timeout(),
    }
}

/// Logging settings.
///
/// # Errors
///
/// Returns an error if the configured log format is unknown.
pub fn to_log_config(cfg: &Config) -> RuntimeResult<LogConfig> {
    Ok(LogConfig::from_section(&cfg.logging)?)
}

fn parse<T>(field: &str, value: &str) -> RuntimeResult<T>
where
    T: FromStr<Err = CoreError>,
{
    value.parse().map_err(|source| RuntimeError::InvalidValue {
        field: field.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::RequestType;
    use std::time::Duration;

    #[test]
    fn test_component_settings() {
        let mut cfg = Config::default();
        cfg.events.poll_interval_ms = 25;
        cfg.shutdown.join_timeout_ms = 500;
        cfg.workflows.max_concurrent = 3;
        cfg.workflows.max_parked = 7;

        let bus = to_bus_config(&cfg);
        assert_eq!(bus.poll_interval, Duration::from_millis(25));
        assert_eq!(bus.join_timeout, Duration::from_millis(500));

        let engine = to_engine_config(&cfg);
        assert_eq!(engine.max_concurrent, 3);
        assert_eq!(engine.max_parked, 7);
        assert_eq!(engine.join_timeout, Duration::from_millis(500));

        assert_eq!(
            to_coordinator_config(&cfg).queue_poll_interval,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_routing_overrides() {
        let mut cfg = Config::default();
        cfg.coordinator.capability_overrides.insert(
            "query_data".to_owned(),
            vec!["file_processing".to_owned()],
        );
        cfg.coordinator
            .capability_overrides
            .insert("send_notification".to_owned(), Vec::new());

        let routing = to_routing_table(&cfg).unwrap();
        assert_eq!(
            routing.required_capabilities(RequestType::QueryData),
            Some(&[AgentCapability::FileProcessing][..])
        );
        assert_eq!(routing.required_capabilities(RequestType::SendNotification), None);
    }

    #[test]
    fn test_routing_override_unknown_capability() {
        let mut cfg = Config::default();
        cfg.coordinator
            .capability_overrides
            .insert("query_data".to_owned(), vec!["telepathy".to_owned()]);
        assert!(matches!(
            to_routing_table(&cfg),
            Err(RuntimeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_log_config() {
        let mut cfg = Config::default();
        cfg.logging.format = "json".to_owned();
        let log = to_log_config(&cfg).unwrap();
        assert_eq!(log.format, maestro_telemetry::LogFormat::Json);
    }
}
