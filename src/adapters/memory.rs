//! In-memory transport for tests and single-process runs.
//!
//! The transport is scripted up front (inbound messages, connection
//! failures, broker result code) and records everything the router does
//! with it, so behaviour can be asserted without a broker:
//! - Connect attempts, in order
//! - Subscriptions
//! - Published messages
//!
//! Once the connection is acknowledged, queued messages are delivered in
//! order, skipping any that match no subscription. When the queue is
//! drained `next_event` reports a normal close. Publishing stays possible
//! after that so handlers still in flight can finish.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{topic_matches, Transport, TransportError, TransportEvent, CONNACK_ACCEPTED};

/// A message the router published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Payload as UTF-8 text
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

#[derive(Default)]
struct State {
    connected: bool,
    conn_ack_pending: bool,
    conn_ack_code: u8,
    failing_connects: u32,
    connect_attempts: Vec<(String, u16)>,
    inbound: VecDeque<(String, Vec<u8>)>,
    subscriptions: Vec<String>,
    published: Vec<PublishedMessage>,
    /// Reason and number of sessions still to drop
    lose_connection: Option<(String, u32)>,
}

/// Scripted, inspectable transport
///
/// Clones share the same state, so a test can keep a handle while the
/// router owns another.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
}

impl InMemoryTransport {
    /// Create a transport that accepts the first connection
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `count` connect calls
    pub fn fail_connects(&self, count: u32) -> &Self {
        self.lock().failing_connects = count;
        self
    }

    /// Fail every connect call
    pub fn fail_all_connects(&self) -> &Self {
        self.fail_connects(u32::MAX)
    }

    /// Acknowledge connections with a non-zero result code
    pub fn reject_with(&self, code: u8) -> &Self {
        self.lock().conn_ack_code = code;
        self
    }

    /// Drop the connection with an error once the inbound queue is drained
    pub fn lose_connection_after_delivery(&self, reason: impl Into<String>) -> &Self {
        self.drop_sessions(1, reason)
    }

    /// Drop the next `count` sessions with an error once the inbound queue
    /// is drained; later sessions close normally
    pub fn drop_sessions(&self, count: u32, reason: impl Into<String>) -> &Self {
        self.lock().lose_connection = (count > 0).then(|| (reason.into(), count));
        self
    }

    /// Queue an inbound message
    pub fn push_message(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> &Self {
        self.lock()
            .inbound
            .push_back((topic.into(), payload.into()));
        self
    }

    /// Every connect call made so far, as `(host, port)`
    pub fn connect_attempts(&self) -> Vec<(String, u16)> {
        self.lock().connect_attempts.clone()
    }

    /// Every topic filter subscribed so far
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    /// Every message published so far
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.connect_attempts.push((host.to_string(), port));

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::Connect {
                host: host.to_string(),
                port,
                reason: "connection refused".to_string(),
            });
        }

        state.connected = true;
        state.conn_ack_pending = true;
        Ok(())
    }

    async fn subscribe(&self, topic_filter: &str) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.subscriptions.push(topic_filter.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }

        if state.conn_ack_pending {
            state.conn_ack_pending = false;
            return Ok(Some(TransportEvent::ConnAck(state.conn_ack_code)));
        }

        // A rejected session never delivers messages
        if state.conn_ack_code == CONNACK_ACCEPTED {
            while let Some((topic, payload)) = state.inbound.pop_front() {
                let subscribed = state
                    .subscriptions
                    .iter()
                    .any(|filter| topic_matches(filter, &topic));
                if subscribed {
                    return Ok(Some(TransportEvent::Message { topic, payload }));
                }
            }
        }

        match state.lose_connection.take() {
            Some((reason, remaining)) => {
                if remaining > 1 {
                    state.lose_connection = Some((reason.clone(), remaining - 1));
                }
                Err(TransportError::ConnectionLost(reason))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connack_precedes_messages() {
        let transport = InMemoryTransport::new();
        transport.push_message("in/a", b"{}".to_vec());

        transport.connect("localhost", 1883).await.unwrap();
        transport.subscribe("in/+").await.unwrap();

        assert_eq!(
            transport.next_event().await.unwrap(),
            Some(TransportEvent::ConnAck(0))
        );
        assert_eq!(
            transport.next_event().await.unwrap(),
            Some(TransportEvent::Message {
                topic: "in/a".to_string(),
                payload: b"{}".to_vec(),
            })
        );
        assert_eq!(transport.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsubscribed_messages_are_skipped() {
        let transport = InMemoryTransport::new();
        transport
            .push_message("in/other", b"1".to_vec())
            .push_message("in/mine", b"2".to_vec());

        transport.connect("localhost", 1883).await.unwrap();
        transport.subscribe("in/mine").await.unwrap();
        transport.next_event().await.unwrap();

        match transport.next_event().await.unwrap() {
            Some(TransportEvent::Message { topic, .. }) => assert_eq!(topic, "in/mine"),
            other => panic!("Expected message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let transport = InMemoryTransport::new();
        transport.fail_connects(2);

        assert!(transport.connect("h", 1).await.is_err());
        assert!(transport.connect("h", 1).await.is_err());
        assert!(transport.connect("h", 1).await.is_ok());
        assert_eq!(transport.connect_attempts().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let transport = InMemoryTransport::new();
        let result = transport.publish("out/a", b"{}".to_vec()).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_drop_sessions_counts_down() {
        let transport = InMemoryTransport::new();
        transport.drop_sessions(2, "flaky link");

        for _ in 0..2 {
            transport.connect("h", 1).await.unwrap();
            assert_eq!(
                transport.next_event().await.unwrap(),
                Some(TransportEvent::ConnAck(0))
            );
            assert!(matches!(
                transport.next_event().await,
                Err(TransportError::ConnectionLost(_))
            ));
        }

        transport.connect("h", 1).await.unwrap();
        transport.next_event().await.unwrap();
        assert_eq!(transport.next_event().await.unwrap(), None);
    }
}
