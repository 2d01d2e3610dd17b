//! MQTT transport backed by rumqttc

use crate::error::{BusError, BusResult};
use crate::message::Message;
use crate::topic::{validate_topic_name, TopicFilter};
use crate::transport::{BusEvent, BusTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded exponential delay between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ReconnectBackoff {
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Connection settings for `MqttTransport`
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    /// Generated when absent
    pub client_id: Option<String>,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub credentials: Option<(String, String)>,
    /// Pending client requests before calls start waiting
    pub request_capacity: usize,
    /// Buffered events before the event loop waits for the router.
    ///
    /// The router waits on the task pool when its queue is full, so once
    /// this buffer fills too the event loop stops polling the broker. Size
    /// it for the longest expected burst of inbound messages.
    pub event_capacity: usize,
    pub backoff: ReconnectBackoff,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            clean_session: true,
            credentials: None,
            request_capacity: 64,
            event_capacity: 256,
            backoff: ReconnectBackoff::default(),
        }
    }
}

impl MqttSettings {
    fn options(&self) -> MqttOptions {
        let client_id = self
            .client_id
            .clone()
            .unwrap_or_else(|| format!("beacon-{}", uuid::Uuid::new_v4().simple()));
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(self.clean_session);
        if let Some((user, password)) = &self.credentials {
            options.set_credentials(user.clone(), password.clone());
        }
        options
    }
}

/// A persistent MQTT connection.
///
/// The rumqttc event loop runs on its own task; it reconnects with bounded
/// backoff and reports lifecycle changes and inbound publishes as
/// `BusEvent`s. Requests made while disconnected are queued by the client.
pub struct MqttTransport {
    client: AsyncClient,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Start the event loop; must be called inside a tokio runtime
    pub fn connect(settings: MqttSettings) -> BusResult<(Self, mpsc::Receiver<BusEvent>)> {
        if settings.host.is_empty() {
            return Err(BusError::Connection("MQTT host is empty".into()));
        }

        let (client, eventloop) = AsyncClient::new(settings.options(), settings.request_capacity);
        let (events, receiver) = mpsc::channel(settings.event_capacity);
        let shutdown = CancellationToken::new();

        info!(host = %settings.host, port = settings.port, "Starting MQTT event loop");
        let driver = tokio::spawn(drive(eventloop, events, shutdown.clone(), settings.backoff));

        Ok((
            Self {
                client,
                shutdown,
                driver: Mutex::new(Some(driver)),
            },
            receiver,
        ))
    }
}

async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::Sender<BusEvent>,
    shutdown: CancellationToken,
    backoff: ReconnectBackoff,
) {
    let mut delay = backoff.initial;
    let mut connected = false;

    if events.send(BusEvent::Connecting).await.is_err() {
        return;
    }

    loop {
        let polled = tokio::select! {
            _ = shutdown.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        let event = match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected = true;
                delay = backoff.initial;
                info!("MQTT connected");
                Some(BusEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => Some(BusEvent::Message(
                Message::new(publish.topic, publish.payload.to_vec()),
            )),
            Ok(_) => None,
            Err(e) => {
                if connected {
                    connected = false;
                    if events
                        .send(BusEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "MQTT connection error");

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = backoff.next(delay);
                Some(BusEvent::Connecting)
            }
        };

        if let Some(event) = event {
            if events.send(event).await.is_err() {
                debug!("Event receiver dropped; stopping MQTT event loop");
                break;
            }
        }
    }

    debug!("MQTT event loop stopped");
}

#[async_trait]
impl BusTransport for MqttTransport {
    async fn subscribe(&self, filter: &str) -> BusResult<()> {
        TopicFilter::new(filter)?;
        self.client.subscribe(filter, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> BusResult<()> {
        self.client.unsubscribe(filter).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        validate_topic_name(topic)?;
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> BusResult<()> {
        // The event loop may already be gone
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request not sent");
        }
        self.shutdown.cancel();
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                warn!(error = %e, "MQTT event loop task failed");
            }
        }
        Ok(())
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
