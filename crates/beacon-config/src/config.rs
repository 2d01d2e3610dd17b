//! Configuration sections
//!
//! Every section implements `Default` and is `#[serde(default)]`, so a file
//! only needs the keys it changes.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub store: StoreConfig,
    pub pool: PoolSettings,
    pub bus: BusConfig,
    pub logging: LoggingConfig,
}

/// SQLite database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    pub wal_mode: bool,
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
    pub cache_size: i64,
    pub mmap_size: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./beacon.db"),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
            cache_size: -16_000,
            mmap_size: 0,
        }
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub thread_name: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            thread_name: "beacon-worker".to_string(),
        }
    }
}

/// MQTT connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    /// Generated per process when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    /// Bound on each subscribe, unsubscribe and publish
    pub request_timeout_ms: u64,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub event_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: 30,
            clean_session: true,
            request_timeout_ms: 3_000,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            event_capacity: 256,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub ansi: bool,
    /// Include the event target (module path)
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            target: false,
        }
    }
}

impl BeaconConfig {
    /// Reject settings that parse but cannot work
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path is empty".into()));
        }
        if self.pool.workers == 0 {
            return Err(ConfigError::Invalid("pool.workers must be at least 1".into()));
        }
        if self.pool.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pool.queue_capacity must be at least 1".into(),
            ));
        }
        if self.bus.host.trim().is_empty() {
            return Err(ConfigError::Invalid("bus.host is empty".into()));
        }
        if self.bus.port == 0 {
            return Err(ConfigError::Invalid("bus.port must be non-zero".into()));
        }
        if self.bus.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "bus.request_timeout_ms must be non-zero".into(),
            ));
        }
        if self.bus.event_capacity < 2 {
            return Err(ConfigError::Invalid(
                "bus.event_capacity must be at least 2".into(),
            ));
        }
        if self.bus.reconnect_initial_ms > self.bus.reconnect_max_ms {
            return Err(ConfigError::Invalid(
                "bus.reconnect_initial_ms exceeds bus.reconnect_max_ms".into(),
            ));
        }
        if self.bus.username.is_none() && self.bus.password.is_some() {
            return Err(ConfigError::Invalid(
                "bus.password set without bus.username".into(),
            ));
        }
        Ok(())
    }
}
