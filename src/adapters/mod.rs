//! Adapter interfaces for the message bus.
//!
//! The router depends only on the [`Transport`] trait. Two adapters are
//! provided: an MQTT client for production and an in-memory transport
//! for tests and local runs.

pub mod memory;
pub mod mqtt;

use async_trait::async_trait;
use thiserror::Error;

// Re-export the adapters
pub use memory::{InMemoryTransport, PublishedMessage};
pub use mqtt::MqttTransport;

/// Connection result code reported by a broker on success
pub const CONNACK_ACCEPTED: u8 = 0;

/// Something the transport received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Broker acknowledged the connection with a result code (`0` = accepted)
    ConnAck(u8),

    /// A message arrived on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("not connected")]
    NotConnected,

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Publish/subscribe transport capability
///
/// Implementations are shared between the receive loop and concurrently
/// running message handlers, so every method takes `&self`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Open a connection to the broker
    async fn connect(&self, host: &str, port: u16) -> Result<(), TransportError>;

    /// Subscribe to a topic filter (may contain `+` or `#` wildcards)
    async fn subscribe(&self, topic_filter: &str) -> Result<(), TransportError>;

    /// Publish a payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Wait for the next event; `Ok(None)` means the connection closed normally
    async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError>;
}

/// Check whether a topic matches an MQTT topic filter
///
/// `+` matches exactly one level and `#` (last level only) matches any
/// number of remaining levels, including none.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
