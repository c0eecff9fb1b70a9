//! MQTT adapter built on `rumqttc`.
//!
//! `rumqttc` connects lazily, on the first poll of its event loop, so
//! `connect` drives the loop until the broker answers. A refused
//! connection is surfaced as a non-zero [`TransportEvent::ConnAck`]
//! rather than an error. Messages are exchanged at QoS 0, not retained.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use uuid::Uuid;

use super::{Transport, TransportError, TransportEvent};

/// Capacity of the request channel between client handles and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// MQTT transport
pub struct MqttTransport {
    client_id: String,
    keep_alive: Duration,
    /// Cloned out for publishing, so handlers never wait on the event loop
    client: Mutex<Option<AsyncClient>>,
    event_loop: AsyncMutex<Option<EventLoop>>,
    /// Connection acknowledgement observed while connecting
    pending: Mutex<Option<TransportEvent>>,
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransport {
    /// Create a transport with a random client id
    pub fn new() -> Self {
        Self::with_client_id(format!("winter-supplement-{}", Uuid::new_v4().simple()))
    }

    /// Create a transport with a fixed client id
    pub fn with_client_id(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            client: Mutex::new(None),
            event_loop: AsyncMutex::new(None),
            pending: Mutex::new(None),
        }
    }

    /// Client id presented to the broker
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn client_slot(&self) -> MutexGuard<'_, Option<AsyncClient>> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pending_slot(&self) -> MutexGuard<'_, Option<TransportEvent>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn client(&self) -> Result<AsyncClient, TransportError> {
        self.client_slot()
            .clone()
            .ok_or(TransportError::NotConnected)
    }
}

/// Reason reported when the broker's first event is not a ConnAck
fn first_event_error(event: &Event) -> String {
    format!("expected ConnAck as first event, got {:?}", event)
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn connect(&self, host: &str, port: u16) -> Result<(), TransportError> {
        let mut options = MqttOptions::new(self.client_id.as_str(), host, port);
        options.set_keep_alive(self.keep_alive);

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let acknowledgement = match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => ack.code as u8,
            Ok(event) => {
                debug!(?event, "Unexpected first event from broker");
                return Err(TransportError::Connect {
                    host: host.to_string(),
                    port,
                    reason: first_event_error(&event),
                });
            }
            Err(ConnectionError::ConnectionRefused(code)) => {
                // The session is unusable; report the code and close
                *self.pending_slot() = Some(TransportEvent::ConnAck(code as u8));
                *self.client_slot() = None;
                *self.event_loop.lock().await = None;
                return Ok(());
            }
            Err(e) => {
                return Err(TransportError::Connect {
                    host: host.to_string(),
                    port,
                    reason: e.to_string(),
                })
            }
        };

        *self.pending_slot() = Some(TransportEvent::ConnAck(acknowledgement));
        *self.client_slot() = Some(client);
        *self.event_loop.lock().await = Some(event_loop);
        Ok(())
    }

    async fn subscribe(&self, topic_filter: &str) -> Result<(), TransportError> {
        self.client()?
            .subscribe(topic_filter, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::Subscribe {
                topic: topic_filter.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client()?
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn next_event(&self) -> Result<Option<TransportEvent>, TransportError> {
        let pending = self.pending_slot().take();
        if let Some(event) = pending {
            return Ok(Some(event));
        }

        let mut guard = self.event_loop.lock().await;
        let Some(event_loop) = guard.as_mut() else {
            return Ok(None);
        };

        let next = loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    break Ok(Some(TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    }))
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    break Ok(Some(TransportEvent::ConnAck(ack.code as u8)))
                }
                Ok(Event::Incoming(Packet::Disconnect)) => break Ok(None),
                Ok(_) => {}
                Err(e) => break Err(TransportError::ConnectionLost(e.to_string())),
            }
        };

        if !matches!(next, Ok(Some(_))) {
            *guard = None;
            *self.client_slot() = None;
        }

        next
    }
}
