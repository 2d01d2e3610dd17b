//! Beacon message bus
//!
//! Topic-filter pub/sub over a persistent broker connection. The [`Router`]
//! keeps a registry of filter patterns and handlers, replays it whenever the
//! transport reconnects, and runs each matching handler as a task on a shared
//! [`beacon_pool::TaskPool`].
//!
//! ## Transports
//!
//! - [`MqttTransport`] - rumqttc client with bounded reconnect backoff
//! - [`LoopbackBroker`] - in-process broker for tests and embedding
//!
//! ## Example
//!
//! ```no_run
//! use beacon_bus::{LoopbackBroker, Message, Router, RouterConfig};
//! use beacon_pool::{PoolConfig, TaskPool};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let broker = LoopbackBroker::new();
//! let (transport, events) = broker.connect(64);
//! let pool = Arc::new(TaskPool::open(PoolConfig::default())?);
//! let router = Arc::new(Router::new(Arc::new(transport), pool, RouterConfig::default()));
//!
//! router
//!     .subscribe("sensors/+/temp", |message: &Message| -> anyhow::Result<()> {
//!         println!("{}: {:?}", message.topic, message.payload_str());
//!         Ok(())
//!     })
//!     .await?;
//!
//! let driver = Arc::clone(&router);
//! tokio::spawn(async move { driver.run(events).await });
//! router.publish("sensors/17/temp", &21.5).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod loopback;
mod message;
mod mqtt;
mod registry;
mod router;
pub mod topic;
mod transport;

pub use error::{BusError, BusResult};
pub use loopback::{LoopbackBroker, LoopbackTransport};
pub use message::{Message, MessageHandler};
pub use mqtt::{MqttSettings, MqttTransport, ReconnectBackoff};
pub use router::{ConnectionState, Router, RouterConfig};
pub use topic::TopicFilter;
pub use transport::{BusEvent, BusTransport};
