//! Loading configuration from TOML and the environment

use crate::config::BeaconConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub const ENV_DB_PATH: &str = "BEACON_DB_PATH";
pub const ENV_WORKERS: &str = "BEACON_WORKERS";
pub const ENV_MQTT_HOST: &str = "BEACON_MQTT_HOST";
pub const ENV_MQTT_PORT: &str = "BEACON_MQTT_PORT";
pub const ENV_LOG: &str = "BEACON_LOG";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read a TOML file without applying overrides or validation
    pub async fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<BeaconConfig> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<BeaconConfig> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(config: &BeaconConfig) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(config)?)
    }

    pub async fn save_to_file(config: &BeaconConfig, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = Self::to_toml_string(config)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// File (or defaults when `path` is `None`), then environment overrides,
    /// then validation
    pub async fn load(path: Option<&Path>) -> ConfigResult<BeaconConfig> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path).await?,
            None => BeaconConfig::default(),
        };
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        info!(
            db = %config.store.path.display(),
            workers = config.pool.workers,
            mqtt_host = %config.bus.host,
            mqtt_port = config.bus.port,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Apply `BEACON_*` environment variables on top of `config`
    pub fn apply_env_overrides(config: &mut BeaconConfig) -> ConfigResult<()> {
        if let Some(path) = env_var(ENV_DB_PATH) {
            config.store.path = PathBuf::from(path);
        }
        if let Some(workers) = parse_env::<usize>(ENV_WORKERS)? {
            config.pool.workers = workers;
        }
        if let Some(host) = env_var(ENV_MQTT_HOST) {
            config.bus.host = host;
        }
        if let Some(port) = parse_env::<u16>(ENV_MQTT_PORT)? {
            config.bus.port = port;
        }
        if let Some(level) = env_var(ENV_LOG) {
            config.logging.level = level;
        }
        Ok(())
    }
}

fn env_var(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_env<T>(var: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = env_var(var) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => Err(ConfigError::InvalidEnv {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
