//! Pub/sub router.
//!
//! The router owns the filter registry and the connection state. Inbound
//! messages are matched against every registered filter and each matching
//! handler runs as a separate task on the shared `TaskPool`, so the delivery
//! path only matches and enqueues.
//!
//! The registry is the source of truth for subscriptions. Subscribing while
//! disconnected only updates the registry; every `Connected` event replays
//! the registry as live subscribes.

use crate::error::{BusError, BusResult};
use crate::message::{Message, MessageHandler};
use crate::registry::SubscriptionRegistry;
use crate::topic::{validate_topic_name, TopicFilter};
use crate::transport::{BusEvent, BusTransport};
use beacon_pool::{PoolError, Task, TaskHandle, TaskPool};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Connection state as seen by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Upper bound for each subscribe, unsubscribe and publish call
    pub request_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
        }
    }
}

pub struct Router {
    transport: Arc<dyn BusTransport>,
    registry: SubscriptionRegistry,
    pool: Arc<TaskPool>,
    state: watch::Sender<ConnectionState>,
    config: RouterConfig,
}

impl Router {
    pub fn new(transport: Arc<dyn BusTransport>, pool: Arc<TaskPool>, config: RouterConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            registry: SubscriptionRegistry::new(),
            pool,
            state,
            config,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Registered filter patterns
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.patterns()
    }

    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    /// Returns false when the router is closed
    fn set_state(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == next {
                return false;
            }
            debug!(from = ?*current, to = ?next, "Connection state changed");
            *current = next;
            true
        });
        self.state() != ConnectionState::Closed || next == ConnectionState::Closed
    }

    async fn bounded<F>(&self, operation: &'static str, call: F) -> BusResult<()>
    where
        F: Future<Output = BusResult<()>>,
    {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Timeout {
                operation,
                after_ms: self.config.request_timeout.as_millis() as u64,
            }),
        }
    }

    /// Register `handler` for `pattern`, replacing any previous handler.
    ///
    /// The registry is updated whatever the connection state. A live
    /// subscribe is only issued while connected; its failure is returned but
    /// the registration stays and is replayed on the next connect.
    pub async fn subscribe<H: MessageHandler>(&self, pattern: &str, handler: H) -> BusResult<()> {
        self.subscribe_shared(pattern, Arc::new(handler)).await
    }

    pub async fn subscribe_shared(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> BusResult<()> {
        if self.state() == ConnectionState::Closed {
            return Err(BusError::Closed);
        }
        let filter = TopicFilter::new(pattern)?;
        let replaced = self.registry.insert(filter, handler);
        debug!(pattern, replaced, "Handler registered");

        if !self.is_connected() {
            return Ok(());
        }
        self.bounded("subscribe", self.transport.subscribe(pattern))
            .await
            .inspect_err(|e| warn!(pattern, error = %e, "Live subscribe failed"))
    }

    /// Remove the handler for `pattern`; returns whether one was registered
    pub async fn unsubscribe(&self, pattern: &str) -> BusResult<bool> {
        if self.state() == ConnectionState::Closed {
            return Err(BusError::Closed);
        }
        let removed = self.registry.remove(pattern);
        if !removed || !self.is_connected() {
            return Ok(removed);
        }
        self.bounded("unsubscribe", self.transport.unsubscribe(pattern))
            .await
            .inspect_err(|e| warn!(pattern, error = %e, "Live unsubscribe failed"))?;
        Ok(true)
    }

    pub fn on_connecting(&self) {
        self.set_state(ConnectionState::Connecting);
    }

    /// Mark the connection up and replay every registered filter.
    ///
    /// Returns the number of filters subscribed live. The state flips before
    /// the snapshot is taken, so a concurrent `subscribe` is never missed; it
    /// may at worst be subscribed twice.
    pub async fn on_connected(&self) -> usize {
        if !self.set_state(ConnectionState::Connected) {
            return 0;
        }

        let patterns = self.registry.patterns();
        let mut replayed = 0;
        for pattern in &patterns {
            match self
                .bounded("subscribe", self.transport.subscribe(pattern))
                .await
            {
                Ok(()) => replayed += 1,
                Err(e) => warn!(pattern = %pattern, error = %e, "Replay subscribe failed"),
            }
        }
        info!(replayed, registered = patterns.len(), "Subscriptions replayed");
        replayed
    }

    pub fn on_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    /// Submit one task per handler whose filter matches `topic`
    pub async fn dispatch(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Vec<TaskHandle> {
        self.dispatch_message(Message::new(topic, payload)).await
    }

    /// Queue `message` for every matching handler.
    ///
    /// When the pool queue is full this waits for a free slot, so a slow
    /// pool backpressures whoever feeds the router, including [`Router::run`].
    pub async fn dispatch_message(&self, message: Message) -> Vec<TaskHandle> {
        let handlers = self.registry.matching(&message.topic);
        if handlers.is_empty() {
            trace!(topic = %message.topic, "No handler for topic");
            return Vec::new();
        }

        let message = Arc::new(message);
        let mut handles = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let task = || {
                let delivered = Arc::clone(&message);
                let handler = Arc::clone(&handler);
                Task::new(format!("dispatch {}", message.topic), move || {
                    handler.handle(&delivered)
                })
            };
            let submitted = match self.pool.try_submit(task()) {
                Err(PoolError::QueueFull(capacity)) => {
                    warn!(
                        topic = %message.topic,
                        capacity,
                        "Task queue full, dispatch waiting for a free slot"
                    );
                    self.pool.submit_async(task()).await
                }
                other => other,
            };
            match submitted {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(topic = %message.topic, error = %e, "Dispatch rejected by pool");
                    break;
                }
            }
        }
        handles
    }

    /// Serialize `value` as JSON and publish it at most once
    pub async fn publish<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> BusResult<()> {
        let payload = serde_json::to_vec(value)
            .map_err(BusError::from)
            .inspect_err(|e| warn!(topic, error = %e, "Publish payload not serializable"))?;
        self.publish_raw(topic, payload).await
    }

    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        if self.state() == ConnectionState::Closed {
            return Err(BusError::Closed);
        }
        validate_topic_name(topic)?;
        self.bounded("publish", self.transport.publish(topic, payload))
            .await
            .inspect_err(|e| warn!(topic, error = %e, "Publish failed"))
    }

    /// Apply transport events until the channel ends or the router closes
    pub async fn run(&self, mut events: mpsc::Receiver<BusEvent>) {
        while let Some(event) = events.recv().await {
            if self.state() == ConnectionState::Closed {
                break;
            }
            match event {
                BusEvent::Connecting => self.on_connecting(),
                BusEvent::Connected => {
                    self.on_connected().await;
                }
                BusEvent::Disconnected { reason } => {
                    warn!(reason = %reason, "Bus connection lost");
                    self.on_disconnected();
                }
                BusEvent::Message(message) => {
                    self.dispatch_message(message).await;
                }
            }
        }
        debug!("Router drive loop finished");
    }

    /// Close the router: clear the registry, disconnect, drain the pool.
    ///
    /// Terminal and idempotent.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.set_state(ConnectionState::Closed);
        self.registry.clear();

        if let Err(e) = self.bounded("disconnect", self.transport.disconnect()).await {
            warn!(error = %e, "Transport disconnect failed");
        }

        let pool = Arc::clone(&self.pool);
        if let Err(e) = tokio::task::spawn_blocking(move || pool.close()).await {
            warn!(error = %e, "Closing task pool failed");
        }
        info!("Router closed");
    }
}
