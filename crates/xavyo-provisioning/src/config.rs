//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Settings of the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Upper bound of one connector call, in seconds.
    #[serde(default = "default_connector_timeout_secs")]
    pub connector_timeout_secs: u64,

    /// Batches executed concurrently by the worker pool.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Sleep between polls when no batch is ready, in milliseconds.
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Ready batches fetched per poll.
    #[serde(default = "default_worker_batch_size")]
    pub worker_batch_size: usize,

    /// Deltas requested per sync page.
    #[serde(default = "default_sync_page_size")]
    pub sync_page_size: usize,
}

fn default_connector_timeout_secs() -> u64 {
    30
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_worker_batch_size() -> usize {
    10
}

fn default_sync_page_size() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connector_timeout_secs: default_connector_timeout_secs(),
            worker_concurrency: default_worker_concurrency(),
            worker_poll_interval_ms: default_worker_poll_interval_ms(),
            worker_batch_size: default_worker_batch_size(),
            sync_page_size: default_sync_page_size(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let connector_timeout_secs = parse_positive(
            &reader,
            "PROVISIONING_CONNECTOR_TIMEOUT_SECS",
            default_connector_timeout_secs(),
        )?;
        let worker_concurrency = parse_positive(
            &reader,
            "PROVISIONING_WORKER_CONCURRENCY",
            default_worker_concurrency(),
        )?;
        let worker_poll_interval_ms = parse_positive(
            &reader,
            "PROVISIONING_WORKER_POLL_INTERVAL_MS",
            default_worker_poll_interval_ms(),
        )?;
        let worker_batch_size = parse_positive(
            &reader,
            "PROVISIONING_WORKER_BATCH_SIZE",
            default_worker_batch_size(),
        )?;
        let sync_page_size = parse_positive(&reader, "SYNC_PAGE_SIZE", default_sync_page_size())?;

        Ok(Self {
            connector_timeout_secs,
            worker_concurrency,
            worker_poll_interval_ms,
            worker_batch_size,
            sync_page_size,
        })
    }

    #[must_use]
    pub fn connector_timeout(&self) -> Duration {
        Duration::from_secs(self.connector_timeout_secs)
    }
}

fn parse_positive<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = reader(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string()))?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue(
            key.into(),
            "must be greater than zero".into(),
        ));
    }
    Ok(value)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
