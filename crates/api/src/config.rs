//! Environment-driven configuration.
//!
//! All knobs are read from the process environment at startup. Invalid
//! values are configuration errors, never silent fallbacks; unset keys use
//! the documented defaults.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BULWARK_BIND_ADDR` | `127.0.0.1:8090` | status server bind address |
//! | `BULWARK_ENV` | `development` | environment label in `/health` |
//! | `BULWARK_RETRY_MAX_RETRIES` | `3` | retries after the initial attempt |
//! | `BULWARK_RETRY_BASE_DELAY_MS` | `500` | backoff base delay |
//! | `BULWARK_RETRY_MAX_DELAY_MS` | `60000` | backoff delay cap |
//! | `BULWARK_BREAKER_FAILURE_THRESHOLD` | `5` | failures that open a circuit |
//! | `BULWARK_BREAKER_WINDOW_SECS` | `300` | trailing failure window |
//! | `BULWARK_BREAKER_COOLDOWN_SECS` | `600` | open-circuit cooldown |
//! | `BULWARK_HEALTH_INTERVAL_SECS` | `30` | health sweep interval |
//! | `BULWARK_PROBES` | (empty) | monitored resources, see below |
//!
//! `BULWARK_PROBES` is a comma-separated list of `name=target` entries
//! where the target is `http(s)://…` or `tcp://host:port`; a `!` suffix on
//! the name marks the dependency critical for readiness, e.g.
//! `db!=tcp://localhost:5432,docs=https://example.com/health`.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bulwark_common::resilience::{CircuitBreakerConfig, RetryConfig};
use bulwark_health::{HttpProbe, MonitorConfig, Resource, TcpProbe};
use thiserror::Error;

/// Configuration error raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid { key: key.to_string(), message: message.into() }
    }
}

/// Settings for the HTTP status server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub environment: String,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = match env::var("BULWARK_BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::invalid("BULWARK_BIND_ADDR", "not a socket address"))?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 8090)),
        };

        let environment =
            env::var("BULWARK_ENV").unwrap_or_else(|_| "development".to_string());

        Ok(Self { bind_addr, environment })
    }
}

/// Resilience and monitoring settings shared by embedding applications.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub monitor: MonitorConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let retry = RetryConfig::builder()
            .max_retries(env_u32("BULWARK_RETRY_MAX_RETRIES", 3)?)
            .base_delay(Duration::from_millis(env_u64("BULWARK_RETRY_BASE_DELAY_MS", 500)?))
            .max_delay(Duration::from_millis(env_u64("BULWARK_RETRY_MAX_DELAY_MS", 60_000)?))
            .build()
            .map_err(|e| ConfigError::invalid("BULWARK_RETRY_*", e.to_string()))?;

        let breaker = CircuitBreakerConfig::builder()
            .failure_threshold(env_u32("BULWARK_BREAKER_FAILURE_THRESHOLD", 5)?)
            .failure_window(Duration::from_secs(env_u64("BULWARK_BREAKER_WINDOW_SECS", 300)?))
            .cooldown(Duration::from_secs(env_u64("BULWARK_BREAKER_COOLDOWN_SECS", 600)?))
            .build()
            .map_err(|e| ConfigError::invalid("BULWARK_BREAKER_*", e.to_string()))?;

        let monitor = MonitorConfig::new()
            .with_interval(Duration::from_secs(env_u64("BULWARK_HEALTH_INTERVAL_SECS", 30)?));

        Ok(Self { retry, breaker, monitor })
    }
}

/// Build the monitored resource list from `BULWARK_PROBES`.
pub fn probes_from_env() -> Result<Vec<Resource>, ConfigError> {
    match env::var("BULWARK_PROBES") {
        Ok(spec) => parse_probes(&spec),
        Err(_) => Ok(Vec::new()),
    }
}

/// Parse a comma-separated `name=target` probe list.
pub fn parse_probes(spec: &str) -> Result<Vec<Resource>, ConfigError> {
    let mut resources = Vec::new();

    for entry in spec.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (name, target) = entry.split_once('=').ok_or_else(|| {
            ConfigError::invalid("BULWARK_PROBES", format!("entry '{entry}' is not name=target"))
        })?;

        let (name, critical) = match name.strip_suffix('!') {
            Some(stripped) => (stripped, true),
            None => (name, false),
        };

        if name.is_empty() {
            return Err(ConfigError::invalid(
                "BULWARK_PROBES",
                format!("entry '{entry}' has an empty name"),
            ));
        }

        let resource = if target.starts_with("http://") || target.starts_with("https://") {
            Resource::new(name, Arc::new(HttpProbe::new(target)))
        } else if let Some(addr) = target.strip_prefix("tcp://") {
            Resource::new(name, Arc::new(TcpProbe::new(addr)))
        } else {
            return Err(ConfigError::invalid(
                "BULWARK_PROBES",
                format!("target '{target}' must be http(s):// or tcp://"),
            ));
        };

        resources.push(resource.critical(critical));
    }

    Ok(resources)
}

fn env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::invalid(key, "not an unsigned integer")),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::invalid(key, "not an unsigned integer")),
        Err(_) => Ok(default),
    }
}
