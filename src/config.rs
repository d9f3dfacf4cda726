use crate::gateway::DEFAULT_GATEWAY_TIMEOUT;
use crate::storage::{DEFAULT_LOCK_TIMEOUT, DurabilityMode};
use crate::validation::DEFAULT_MAX_NAME_LENGTH;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Endpoint tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Longest accepted input name, in characters
    pub max_name_length: usize,

    /// How long a pipeline waits for a record's row lock
    pub lock_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self {
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set the name length limit
    pub fn max_name_length(mut self, limit: usize) -> Self {
        self.max_name_length = limit;
        self
    }

    /// Set the row lock wait
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_name_length == 0 {
            return Err("max_name_length must be > 0".to_string());
        }
        if self.lock_timeout.is_zero() {
            return Err("lock_timeout must be > 0".to_string());
        }
        Ok(())
    }
}

/// Process configuration read from `ROWGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Durable storage directory; memory-only when unset.
    pub data_dir: Option<PathBuf>,
    pub durability: DurabilityMode,
    pub endpoint: EndpointConfig,
    /// Remote gateway; the fixed-status gateway is used when unset.
    pub gateway_url: Option<String>,
    pub gateway_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = value("ROWGATE_BIND_ADDR", "127.0.0.1:18080")
            .parse::<SocketAddr>()
            .context("ROWGATE_BIND_ADDR must be a valid host:port")?;

        let durability = value("ROWGATE_DURABILITY", "sync")
            .parse::<DurabilityMode>()
            .map_err(anyhow::Error::msg)
            .context("ROWGATE_DURABILITY must be one of sync, async, none")?;

        let max_name_length = value("ROWGATE_MAX_NAME_LENGTH", &DEFAULT_MAX_NAME_LENGTH.to_string())
            .parse::<usize>()
            .context("ROWGATE_MAX_NAME_LENGTH must be a positive integer")?;

        let lock_timeout_ms = value(
            "ROWGATE_LOCK_TIMEOUT_MS",
            &DEFAULT_LOCK_TIMEOUT.as_millis().to_string(),
        )
        .parse::<u64>()
        .context("ROWGATE_LOCK_TIMEOUT_MS must be milliseconds")?;

        let gateway_timeout_ms = value(
            "ROWGATE_GATEWAY_TIMEOUT_MS",
            &DEFAULT_GATEWAY_TIMEOUT.as_millis().to_string(),
        )
        .parse::<u64>()
        .context("ROWGATE_GATEWAY_TIMEOUT_MS must be milliseconds")?;

        let endpoint = EndpointConfig::new()
            .max_name_length(max_name_length)
            .lock_timeout(Duration::from_millis(lock_timeout_ms));
        endpoint
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid endpoint configuration")?;

        Ok(Self {
            bind_addr,
            data_dir: optional("ROWGATE_DATA_DIR").map(PathBuf::from),
            durability,
            endpoint,
            gateway_url: optional("ROWGATE_GATEWAY_URL"),
            gateway_timeout: Duration::from_millis(gateway_timeout_ms),
        })
    }
}
