//! # Beacon Configuration
//!
//! Typed settings for the store, the worker pool, the MQTT bus and logging.
//! Loaded from TOML, then overridden from `BEACON_*` environment variables.
//!
//! ```rust,no_run
//! use beacon_config::ConfigLoader;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load(Some(Path::new("beacon.toml"))).await?;
//!     println!("{} workers", config.pool.workers);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::*;
pub use error::{ConfigError, ConfigResult};
pub use loader::*;
