//! Broker connection seam

use crate::error::BusResult;
use crate::message::Message;
use async_trait::async_trait;

/// Connection lifecycle and inbound traffic reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Connecting,
    Connected,
    Disconnected { reason: String },
    Message(Message),
}

/// A live connection to a broker.
///
/// Every call returns once the request has been handed to the client, not
/// when the broker acknowledges it. Delivery is at most once.
#[async_trait]
pub trait BusTransport: Send + Sync + 'static {
    async fn subscribe(&self, filter: &str) -> BusResult<()>;

    async fn unsubscribe(&self, filter: &str) -> BusResult<()>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Stop the connection; further calls fail
    async fn disconnect(&self) -> BusResult<()> {
        Ok(())
    }
}
