//! Inbound messages and the handler seam

use crate::error::BusResult;
use serde::de::DeserializeOwned;

/// A message delivered on a concrete topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Decode the payload as JSON
    pub fn json<T: DeserializeOwned>(&self) -> BusResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// The payload as text, if it is valid UTF-8
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Handles messages for a topic filter.
///
/// Handlers run on pool workers, never on the bus delivery path, so they may
/// block on storage or other I/O.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, message: &Message) -> anyhow::Result<()> {
        self(message)
    }
}
