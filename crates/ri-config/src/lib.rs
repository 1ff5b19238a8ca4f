//! Layered configuration for the gateway binary: built-in defaults, an
//! optional TOML file, environment variable overrides (flat names, not
//! nested), then explicit CLI-flag overrides applied last.
//!
//! Grounded on the server's `config::Config::builder()` + `ConfigOverrides`
//! pattern, generalised from a nested `server.*`/`database.*` shape to the
//! broker's flat `GATEWAY_*`/`REGISTRY_*` environment variable names.

use std::time::Duration;

use config::{Config, ConfigError as BuilderError, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

/// Raw, string-typed view of the configuration as loaded from file/env —
/// duration fields stay as strings (`"30s"`) until [`GatewayConfig::parse`]
/// turns them into [`Duration`]s.
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    gateway_addr: String,
    gateway_poll_timeout: String,
    slack_signing_secret: Option<String>,
    discord_public_key: Option<String>,
    registry_heartbeat_interval: String,
    registry_heartbeat_timeout: String,
    registry_stale_timeout: String,
    gateway_queue_capacity: usize,
    gateway_response_timeout: String,
    gateway_max_body_bytes: usize,
    gateway_log_format: String,
    gateway_log_level: String,
    gateway_otlp_endpoint: Option<String>,
    gateway_shutdown_grace: String,
}

/// Fully resolved broker configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: String,
    pub poll_timeout: Duration,
    pub slack_signing_secret: Option<String>,
    pub discord_public_key: Option<String>,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub stale_timeout: Duration,
    pub queue_capacity: usize,
    pub response_timeout: Duration,
    pub max_body_bytes: usize,
    pub log_format: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub shutdown_grace: Duration,
}

/// CLI-flag overrides, applied after file and environment sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<String>,
    pub addr: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

const DEFAULTS_TOML: &str = r#"
gateway_addr = ":8080"
gateway_poll_timeout = "30s"
registry_heartbeat_interval = "10s"
registry_heartbeat_timeout = "25s"
registry_stale_timeout = "60s"
gateway_queue_capacity = 100
gateway_response_timeout = "30s"
gateway_max_body_bytes = 1048576
gateway_log_format = "pretty"
gateway_log_level = "info"
gateway_shutdown_grace = "10s"
"#;

/// Load configuration: built-in defaults, then an optional TOML file (path
/// from `overrides.config_path` or `RI_BROKER_CONFIG_PATH`), then
/// environment variables, then `overrides`.
pub fn load(overrides: ConfigOverrides) -> Result<GatewayConfig, ConfigError> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULTS_TOML, FileFormat::Toml));

    let config_path = overrides
        .config_path
        .clone()
        .or_else(|| std::env::var("RI_BROKER_CONFIG_PATH").ok());
    if let Some(path) = config_path {
        builder = builder.add_source(File::new(&path, FileFormat::Toml).required(false));
    }

    builder = builder.add_source(Environment::default());

    if let Some(addr) = overrides.addr {
        builder = builder.set_override("gateway_addr", addr)?;
    }
    if let Some(log_level) = overrides.log_level {
        builder = builder.set_override("gateway_log_level", log_level)?;
    }
    if let Some(log_format) = overrides.log_format {
        builder = builder.set_override("gateway_log_format", log_format)?;
    }

    let raw: RawConfig = builder.build()?.try_deserialize()?;
    GatewayConfig::parse(raw)
}

impl GatewayConfig {
    fn parse(raw: RawConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            addr: raw.gateway_addr,
            poll_timeout: parse_duration(&raw.gateway_poll_timeout)?,
            slack_signing_secret: raw.slack_signing_secret,
            discord_public_key: raw.discord_public_key,
            heartbeat_interval: parse_duration(&raw.registry_heartbeat_interval)?,
            heartbeat_timeout: parse_duration(&raw.registry_heartbeat_timeout)?,
            stale_timeout: parse_duration(&raw.registry_stale_timeout)?,
            queue_capacity: raw.gateway_queue_capacity,
            response_timeout: parse_duration(&raw.gateway_response_timeout)?,
            max_body_bytes: raw.gateway_max_body_bytes,
            log_format: raw.gateway_log_format,
            log_level: raw.gateway_log_level,
            otlp_endpoint: raw.gateway_otlp_endpoint,
            shutdown_grace: parse_duration(&raw.gateway_shutdown_grace)?,
        })
    }
}

/// Parses `"30s"`, `"500ms"`, or a bare integer (seconds) into a [`Duration`].
fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if let Some(prefix) = value.strip_suffix("ms") {
        let millis: u64 = prefix
            .trim()
            .parse()
            .map_err(|_| ConfigError::Message(format!("invalid duration: {value}")))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(prefix) = value.strip_suffix('s') {
        let secs: u64 = prefix
            .trim()
            .parse()
            .map_err(|_| ConfigError::Message(format!("invalid duration: {value}")))?;
        return Ok(Duration::from_secs(secs));
    }
    let secs: u64 = value
        .parse()
        .map_err(|_| ConfigError::Message(format!("invalid duration: {value}")))?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_configuration() {
        let config = load(ConfigOverrides::default()).expect("config loads");
        assert_eq!(config.addr, ":8080");
        assert_eq!(config.poll_timeout, Duration::from_secs(30));
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_body_bytes, 1_048_576);
    }

    #[test]
    fn applies_cli_overrides() {
        let overrides = ConfigOverrides {
            addr: Some(":9090".to_string()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        let config = load(overrides).expect("config loads with overrides");
        assert_eq!(config.addr, ":9090");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn parse_duration_accepts_seconds_milliseconds_and_bare_integers() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("soon").is_err());
    }
}
