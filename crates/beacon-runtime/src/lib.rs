//! Beacon runtime
//!
//! Wires the record store, the task pool and the message router into one
//! owned [`Runtime`]. Inbound bus messages are matched to handlers, each
//! handler runs on a pool worker, and handlers persist through the store or
//! publish back through the router.
//!
//! ```rust,no_run
//! use beacon_runtime::{logging, Runtime};
//! use beacon_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load(None).await?;
//!     logging::init(&config.logging);
//!
//!     let runtime = Runtime::start(config).await?;
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await
//! }
//! ```

pub mod logging;
mod runtime;

pub use runtime::Runtime;

pub use beacon_bus as bus;
pub use beacon_config as config;
pub use beacon_pool as pool;
pub use beacon_store as store;
