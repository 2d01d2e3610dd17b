//! In-process broker.
//!
//! `LoopbackBroker` routes publishes to every connected `LoopbackTransport`
//! with a matching filter, using the same topic rules as a real broker. Each
//! transport can drop and re-establish its connection on demand, and records
//! how many live calls it received so reconnect behavior can be asserted.
//!
//! A dropped connection loses its server-side subscriptions, like a clean
//! MQTT session.

use crate::error::{BusError, BusResult};
use crate::message::Message;
use crate::topic::{validate_topic_name, TopicFilter};
use crate::transport::{BusEvent, BusTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct Client {
    id: u64,
    online: bool,
    filters: Vec<TopicFilter>,
    events: mpsc::Sender<BusEvent>,
}

impl Client {
    fn notify(&self, event: BusEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(client = self.id, error = %e, "Loopback event dropped");
        }
    }
}

#[derive(Default)]
struct BrokerInner {
    clients: Mutex<Vec<Client>>,
    next_id: AtomicU64,
}

impl BrokerInner {
    fn with_client<T>(&self, id: u64, f: impl FnOnce(&mut Client) -> T) -> Option<T> {
        self.clients.lock().iter_mut().find(|c| c.id == id).map(f)
    }
}

/// Shared in-process broker; clones refer to the same broker
#[derive(Clone, Default)]
pub struct LoopbackBroker {
    inner: Arc<BrokerInner>,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection. The returned channel immediately carries
    /// `Connecting` and `Connected`, so `capacity` must be at least 2.
    pub fn connect(&self, capacity: usize) -> (LoopbackTransport, mpsc::Receiver<BusEvent>) {
        let (events, receiver) = mpsc::channel(capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Client {
            id,
            online: true,
            filters: Vec::new(),
            events,
        };
        client.notify(BusEvent::Connecting);
        client.notify(BusEvent::Connected);
        self.inner.clients.lock().push(client);
        debug!(client = id, "Loopback client connected");

        let transport = LoopbackTransport {
            broker: Arc::clone(&self.inner),
            id,
            calls: Mutex::new(CallLog::default()),
        };
        (transport, receiver)
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().len()
    }

    fn deliver(inner: &BrokerInner, topic: &str, payload: &[u8]) -> usize {
        let clients = inner.clients.lock();
        let mut delivered = 0;
        for client in clients.iter().filter(|c| c.online) {
            if client.filters.iter().any(|f| f.matches(topic)) {
                client.notify(BusEvent::Message(Message::new(topic, payload)));
                delivered += 1;
            }
        }
        delivered
    }
}

#[derive(Debug, Default)]
struct CallLog {
    subscribes: HashMap<String, usize>,
    unsubscribes: HashMap<String, usize>,
    publishes: usize,
}

/// One connection to a `LoopbackBroker`
pub struct LoopbackTransport {
    broker: Arc<BrokerInner>,
    id: u64,
    calls: Mutex<CallLog>,
}

impl LoopbackTransport {
    fn ensure_online(&self) -> BusResult<()> {
        match self.broker.with_client(self.id, |c| c.online) {
            Some(true) => Ok(()),
            Some(false) => Err(BusError::Connection("loopback connection is down".into())),
            None => Err(BusError::Connection("loopback client disconnected".into())),
        }
    }

    /// Drop the connection as if the network failed
    pub fn simulate_disconnect(&self, reason: &str) {
        self.broker.with_client(self.id, |client| {
            client.online = false;
            client.filters.clear();
            client.notify(BusEvent::Disconnected {
                reason: reason.to_string(),
            });
        });
    }

    /// Re-establish a dropped connection with an empty session
    pub fn simulate_reconnect(&self) {
        self.broker.with_client(self.id, |client| {
            client.online = true;
            client.notify(BusEvent::Connecting);
            client.notify(BusEvent::Connected);
        });
    }

    pub fn is_online(&self) -> bool {
        self.ensure_online().is_ok()
    }

    /// Live subscribe calls received for `filter`
    pub fn subscribe_calls(&self, filter: &str) -> usize {
        self.calls.lock().subscribes.get(filter).copied().unwrap_or(0)
    }

    pub fn unsubscribe_calls(&self, filter: &str) -> usize {
        self.calls.lock().unsubscribes.get(filter).copied().unwrap_or(0)
    }

    pub fn publish_calls(&self) -> usize {
        self.calls.lock().publishes
    }

    /// Filters the broker currently holds for this connection
    pub fn live_filters(&self) -> Vec<String> {
        self.broker
            .with_client(self.id, |c| {
                c.filters.iter().map(|f| f.as_str().to_string()).collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl BusTransport for LoopbackTransport {
    async fn subscribe(&self, filter: &str) -> BusResult<()> {
        let compiled = TopicFilter::new(filter)?;
        self.ensure_online()?;
        *self
            .calls
            .lock()
            .subscribes
            .entry(filter.to_string())
            .or_insert(0) += 1;
        self.broker.with_client(self.id, |client| {
            if !client.filters.iter().any(|f| f.as_str() == filter) {
                client.filters.push(compiled);
            }
        });
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> BusResult<()> {
        self.ensure_online()?;
        *self
            .calls
            .lock()
            .unsubscribes
            .entry(filter.to_string())
            .or_insert(0) += 1;
        self.broker.with_client(self.id, |client| {
            client.filters.retain(|f| f.as_str() != filter);
        });
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        validate_topic_name(topic)?;
        self.ensure_online()?;
        self.calls.lock().publishes += 1;
        let delivered = LoopbackBroker::deliver(&self.broker, topic, &payload);
        debug!(topic, delivered, "Loopback publish");
        Ok(())
    }

    async fn disconnect(&self) -> BusResult<()> {
        self.broker.clients.lock().retain(|c| c.id != self.id);
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.broker.clients.lock().retain(|c| c.id != self.id);
    }
}
