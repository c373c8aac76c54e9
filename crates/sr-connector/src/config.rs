//! Connector registry: configs from a JSON file or from the environment.
//!
//! # JSON file
//! Either a bare array of connector objects or `{"connectors": [...]}`.
//!
//! # Environment scheme
//! `ENABLED_CONNECTORS=weather,news` enumerates names; each connector is
//! then described by `CONNECTOR_<NAME>_TYPE`, `CONNECTOR_<NAME>_OUTPUT_STREAM`,
//! `CONNECTOR_<NAME>_POLL_INTERVAL_MS`, `CONNECTOR_<NAME>_REQUEST_TIMEOUT_MS`,
//! `CONNECTOR_<NAME>_MAX_RETRIES`, `CONNECTOR_<NAME>_LEASE_TTL_SECONDS`, and
//! `CONNECTOR_<NAME>_CONFIG` (provider config as inline JSON). `<NAME>` is
//! the name uppercased with `-` mapped to `_`.
//!
//! # `${VAR}` substitution
//! Every string value (from either source) has `${VAR}` spans replaced
//! with the named environment variable; unset variables substitute empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

fn default_enabled() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    60_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_lease_ttl_seconds() -> u64 {
    60
}

/// Per-connector publish retry schedule override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorRetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

/// One connector registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub connector_type: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Defaults to `raw-input-signals` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_stream: Option<String>,
    #[serde(default = "default_lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<ConnectorRetryConfig>,
    #[serde(default)]
    pub provider_config: Value,
}

impl ConnectorConfig {
    pub fn output_stream(&self) -> &str {
        self.output_stream
            .as_deref()
            .unwrap_or(sr_types::streams::RAW_INPUT_SIGNALS)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot read registry file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("registry parse error: {0}")]
    Parse(String),
    #[error("connector '{name}' is missing {field}")]
    MissingField { name: String, field: String },
}

/// Load the registry from a JSON file, applying `${VAR}` substitution.
pub fn load_from_file(path: &Path) -> Result<Vec<ConnectorConfig>, RegistryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut value: Value =
        serde_json::from_str(&raw).map_err(|e| RegistryError::Parse(e.to_string()))?;
    substitute_env(&mut value);

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("connectors") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(RegistryError::Parse(
                    "expected an array or {\"connectors\": [...]}".to_owned(),
                ))
            }
        },
        _ => {
            return Err(RegistryError::Parse(
                "expected an array or {\"connectors\": [...]}".to_owned(),
            ))
        }
    };

    entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value(entry).map_err(|e| RegistryError::Parse(e.to_string()))
        })
        .collect()
}

/// Load the registry from `ENABLED_CONNECTORS` + `CONNECTOR_<NAME>_*`.
pub fn load_from_env() -> Result<Vec<ConnectorConfig>, RegistryError> {
    let enabled = std::env::var("ENABLED_CONNECTORS").unwrap_or_default();
    let mut configs = Vec::new();
    for name in enabled.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        configs.push(config_from_env(name)?);
    }
    Ok(configs)
}

fn config_from_env(name: &str) -> Result<ConnectorConfig, RegistryError> {
    let prefix = format!(
        "CONNECTOR_{}_",
        name.to_ascii_uppercase().replace('-', "_")
    );
    let var = |suffix: &str| std::env::var(format!("{}{}", prefix, suffix)).ok();

    let connector_type = var("TYPE").ok_or_else(|| RegistryError::MissingField {
        name: name.to_owned(),
        field: format!("{}TYPE", prefix),
    })?;

    let provider_config = match var("CONFIG") {
        Some(raw) => {
            let mut value: Value = serde_json::from_str(&raw).map_err(|e| {
                RegistryError::Parse(format!("{}CONFIG: {}", prefix, e))
            })?;
            substitute_env(&mut value);
            value
        }
        None => Value::Null,
    };

    Ok(ConnectorConfig {
        name: name.to_owned(),
        connector_type: substitute_env_str(&connector_type),
        enabled: var("ENABLED").map_or(true, |v| v != "false" && v != "0"),
        poll_interval_ms: var("POLL_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_poll_interval_ms),
        request_timeout_ms: var("REQUEST_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_request_timeout_ms),
        max_retries: var("MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_max_retries),
        output_stream: var("OUTPUT_STREAM").map(|v| substitute_env_str(&v)),
        lease_ttl_seconds: var("LEASE_TTL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_lease_ttl_seconds),
        retry: None,
        provider_config,
    })
}

/// Replace `${VAR}` spans in every string value, recursively.
pub fn substitute_env(value: &mut Value) {
    match value {
        Value::String(s) => *s = substitute_env_str(s),
        Value::Array(items) => items.iter_mut().for_each(substitute_env),
        Value::Object(map) => map.values_mut().for_each(substitute_env),
        _ => {}
    }
}

fn substitute_env_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var_name = &after[..end];
                out.push_str(&std::env::var(var_name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated span: keep it literal.
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
