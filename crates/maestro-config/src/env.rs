//! Environment variable fallbacks.
//!
//! `MAESTRO_*` variables are **fallback**, not override: they only apply to
//! fields that no config file set.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// Environment variable naming an alternate directory holding `config.toml`.
pub const HOME_VAR: &str = "MAESTRO_HOME";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Integer,
    Text,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: FieldKind,
}

/// All supported `MAESTRO_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "MAESTRO_LOG_LEVEL",
        field_path: "logging.level",
        kind: FieldKind::Text,
    },
    EnvMapping {
        var_name: "MAESTRO_LOG_FORMAT",
        field_path: "logging.format",
        kind: FieldKind::Text,
    },
    EnvMapping {
        var_name: "MAESTRO_EVENTS_HISTORY_CAPACITY",
        field_path: "events.history_capacity",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "MAESTRO_EVENTS_POLL_INTERVAL_MS",
        field_path: "events.poll_interval_ms",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "MAESTRO_COORDINATOR_POLL_INTERVAL_MS",
        field_path: "coordinator.queue_poll_interval_ms",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "MAESTRO_WORKFLOWS_MAX_CONCURRENT",
        field_path: "workflows.max_concurrent",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "MAESTRO_WORKFLOWS_HISTORY_CAPACITY",
        field_path: "workflows.history_capacity",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "MAESTRO_WORKFLOWS_MAX_PARKED",
        field_path: "workflows.max_parked",
        kind: FieldKind::Integer,
    },
    EnvMapping {
        var_name: "MAESTRO_SHUTDOWN_JOIN_TIMEOUT_MS",
        field_path: "shutdown.join_timeout_ms",
        kind: FieldKind::Integer,
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a numeric field receives a value
/// that is not an integer.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if matches!(
            sources.get(mapping.field_path),
            Some(ConfigLayer::User | ConfigLayer::File)
        ) {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        let value = match mapping.kind {
            FieldKind::Text => toml::Value::String(raw.clone()),
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(toml::Value::Integer)
                .map_err(|e| ConfigError::EnvError {
                    var_name: mapping.var_name.to_owned(),
                    message: format!("expected an integer, got '{raw}': {e}"),
                })?,
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        set_field(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

/// Set a dotted field in the TOML tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_apply_env_fallbacks() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::Defaults);
        let env = make_env(&[
            ("MAESTRO_LOG_LEVEL", "debug"),
            ("MAESTRO_WORKFLOWS_MAX_CONCURRENT", "4"),
        ]);

        let count = apply_env_fallbacks(&mut merged, &mut sources, &env).unwrap();

        assert_eq!(count, 2);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(merged["workflows"]["max_concurrent"].as_integer(), Some(4));
        assert_eq!(sources.get("logging.level"), Some(&ConfigLayer::Environment));
    }

    #[test]
    fn test_env_fallback_skips_file_values() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);

        let env = make_env(&[("MAESTRO_LOG_LEVEL", "debug")]);
        let count = apply_env_fallbacks(&mut merged, &mut sources, &env).unwrap();

        assert_eq!(count, 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn test_env_integer_rejected() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = FieldSources::new();
        let env = make_env(&[("MAESTRO_SHUTDOWN_JOIN_TIMEOUT_MS", "soon")]);

        let result = apply_env_fallbacks(&mut merged, &mut sources, &env);
        assert!(matches!(result, Err(ConfigError::EnvError { .. })));
    }
}
