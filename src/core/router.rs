//! Message router for the supplement service.
//!
//! Owns the bus connection lifecycle (connect with bounded retry,
//! subscribe on acknowledgement) and dispatches every inbound message to
//! its own handling task. Failures while handling a message are logged
//! and the message is dropped; they never reach the receive loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{Transport, TransportError, TransportEvent, CONNACK_ACCEPTED};
use crate::config::Config;

use super::calculator::{self, CalculateFn};
use super::schema::{validate_input, validate_output, SchemaViolation};

/// Lifecycle of the bus connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    /// Connection attempts exhausted; no further attempts are made
    Failed,
}

/// Reasons a single message is dropped without a response
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Invalid payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Input validation failed: {0}")]
    InvalidInput(#[source] SchemaViolation),

    #[error("Output validation failed: {0}")]
    InvalidOutput(#[source] SchemaViolation),

    #[error("Error processing message: {0}")]
    Computation(String),

    #[error("Error processing message: {0}")]
    Publish(#[source] TransportError),
}

/// Correlation id of a message: the last `/`-separated segment of its topic
pub fn correlation_id(topic: &str) -> &str {
    topic.rsplit('/').next().unwrap_or(topic)
}

/// Parse, validate, calculate and re-validate one payload.
///
/// Returns the serialized result ready for publishing. A panicking engine
/// becomes [`ProcessingError::Computation`]; the process-wide panic hook
/// still runs first, so the panic is also printed to stderr.
pub fn compute_response(payload: &[u8], engine: CalculateFn) -> Result<Vec<u8>, ProcessingError> {
    let record: serde_json::Value =
        serde_json::from_slice(payload).map_err(ProcessingError::MalformedPayload)?;
    debug!(input = %record, "Received input data");

    let request = validate_input(&record).map_err(ProcessingError::InvalidInput)?;
    debug!("Input data validated successfully");

    let result = panic::catch_unwind(AssertUnwindSafe(|| engine(&request)))
        .map_err(|panic| ProcessingError::Computation(panic_message(panic)))?;
    debug!(id = %result.id, ?result, "Calculated supplement");

    let output = serde_json::to_value(&result)
        .map_err(|e| ProcessingError::Computation(e.to_string()))?;
    validate_output(&output).map_err(ProcessingError::InvalidOutput)?;
    debug!("Output data validated successfully");

    // Serialize the struct, not the Value, to keep wire field order
    serde_json::to_vec(&result).map_err(|e| ProcessingError::Computation(e.to_string()))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "calculation panicked".to_string()
    }
}

/// Per-message protocol, cheap to clone into handling tasks
pub struct MessageHandler<T: Transport> {
    config: Arc<Config>,
    transport: Arc<T>,
    engine: CalculateFn,
}

impl<T: Transport> Clone for MessageHandler<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            engine: self.engine,
        }
    }
}

impl<T: Transport> MessageHandler<T> {
    /// Create a handler using the standard calculation engine
    pub fn new(config: Arc<Config>, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            engine: calculator::calculate,
        }
    }

    /// Handle one message, logging and swallowing any failure
    pub async fn on_message(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.process(topic, payload).await {
            error!(correlation_id = correlation_id(topic), "{}", e);
        }
    }

    /// Handle one message and publish its result.
    ///
    /// Returns the output topic the result was published to. The output
    /// topic is built from the topic's correlation id, not the payload's `id`.
    #[instrument(name = "message", skip(self, payload), fields(correlation_id = correlation_id(topic)))]
    pub async fn process(&self, topic: &str, payload: &[u8]) -> Result<String, ProcessingError> {
        let correlation_id = correlation_id(topic);
        debug!("Extracted topic ID: {}", correlation_id);

        let response = compute_response(payload, self.engine)?;

        let output_topic = self.config.output_topic(correlation_id);
        debug!(%output_topic, "Publishing result");
        self.transport
            .publish(&output_topic, response)
            .await
            .map_err(ProcessingError::Publish)?;

        info!("Published result for ID: {}", correlation_id);
        Ok(output_topic)
    }
}

/// Owns the bus connection and its receive loop
pub struct Router<T: Transport> {
    config: Arc<Config>,
    transport: Arc<T>,
    handler: MessageHandler<T>,
    state: ConnectionState,
    /// Set once the broker accepts the current session
    session_accepted: bool,
}

impl<T: Transport + 'static> Router<T> {
    /// Create a router over a transport
    pub fn new(config: Config, transport: T) -> Self {
        let config = Arc::new(config);
        let transport = Arc::new(transport);
        let handler = MessageHandler::new(Arc::clone(&config), Arc::clone(&transport));

        Self {
            config,
            transport,
            handler,
            state: ConnectionState::Disconnected,
            session_accepted: false,
        }
    }

    /// Replace the calculation engine
    pub fn with_engine(mut self, engine: CalculateFn) -> Self {
        self.handler.engine = engine;
        self
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The per-message handler
    pub fn handler(&self) -> &MessageHandler<T> {
        &self.handler
    }

    /// Connect with bounded retry and run the receive loop.
    ///
    /// Returns once the connection closes normally (`Disconnected`) or
    /// `max_retries` consecutive attempts fail (`Failed`). A session the
    /// broker accepted and later lost is reconnected with a fresh budget.
    pub async fn connect(&mut self) -> ConnectionState {
        let max_retries = self.config.max_retries;
        let retry_delay = self.config.retry_delay;
        let host = self.config.broker.clone();
        let port = self.config.port;

        let mut attempt = 0;
        while attempt < max_retries {
            attempt += 1;
            self.state = ConnectionState::Connecting;
            self.session_accepted = false;
            info!(
                transport = self.transport.name(),
                "Attempting to connect to {}:{} (attempt {})", host, port, attempt
            );

            let outcome = match self.transport.connect(&host, port).await {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    info!("Successfully connected to broker");
                    self.receive_loop().await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    info!("Connection closed");
                    self.state = ConnectionState::Disconnected;
                    return self.state;
                }
                Err(e) if self.session_accepted => {
                    warn!("Connection lost: {}", e);
                    self.state = ConnectionState::Disconnected;
                    attempt = 0;
                }
                Err(e) => error!("Connection attempt failed: {}", e),
            }

            if attempt < max_retries {
                info!("Retrying in {} seconds...", retry_delay.as_secs());
                tokio::time::sleep(retry_delay).await;
            }
        }

        error!("Maximum connection attempts reached. Exiting.");
        self.state = ConnectionState::Failed;
        self.state
    }

    async fn receive_loop(&mut self) -> Result<(), TransportError> {
        let mut in_flight = JoinSet::new();

        let outcome = loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }

            match self.transport.next_event().await {
                Ok(Some(TransportEvent::ConnAck(code))) => self.on_connect(code).await,
                Ok(Some(TransportEvent::Message { topic, payload })) => {
                    let handler = self.handler.clone();
                    in_flight.spawn(async move { handler.on_message(&topic, &payload).await });
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        // Let messages already received finish before returning
        while let Some(joined) = in_flight.join_next().await {
            log_join_error(joined);
        }

        outcome
    }

    async fn on_connect(&mut self, code: u8) {
        if code != CONNACK_ACCEPTED {
            error!("Failed to connect. Return code: {}", code);
            self.state = ConnectionState::Disconnected;
            return;
        }

        info!("Connected to broker successfully");
        self.state = ConnectionState::Connected;
        self.session_accepted = true;

        let filter = self.config.subscription_filter();
        if self.config.topic_id.is_some() {
            info!("Subscribing to specific topic: {}", filter);
        } else {
            info!("Subscribing to all topics: {}", filter);
        }

        match self.transport.subscribe(&filter).await {
            Ok(()) => self.state = ConnectionState::Subscribed,
            Err(e) => error!("Subscription failed: {}", e),
        }
    }
}

fn log_join_error(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!("Error processing message: handler panicked"),
        Err(e) => warn!("Message handler did not complete: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTransport;
    use crate::domain::{CalculationRequest, CalculationResult};

    #[test]
    fn test_correlation_id_is_last_segment() {
        assert_eq!(correlation_id("BRE/calculateWinterSupplementInput/abc"), "abc");
        assert_eq!(correlation_id("abc"), "abc");
        assert_eq!(correlation_id("prefix/"), "");
    }

    #[test]
    fn test_compute_response_wire_format() {
        let payload = br#"{"id":"x","numberOfChildren":0,"familyComposition":"couple","familyUnitInPayForDecember":true}"#;
        let response = compute_response(payload, calculator::calculate).unwrap();

        assert_eq!(
            String::from_utf8(response).unwrap(),
            r#"{"id":"x","isEligible":true,"baseAmount":120.0,"childrenAmount":0.0,"supplementAmount":120.0}"#
        );
    }

    #[test]
    fn test_engine_panic_becomes_computation_error() {
        fn exploding(_: &CalculationRequest) -> CalculationResult {
            panic!("Unexpected error")
        }

        let payload = br#"{"id":"x","numberOfChildren":1,"familyComposition":"single","familyUnitInPayForDecember":true}"#;
        match compute_response(payload, exploding) {
            Err(ProcessingError::Computation(message)) => assert_eq!(message, "Unexpected error"),
            other => panic!("Expected computation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_router_is_disconnected() {
        let router = Router::new(Config::default(), InMemoryTransport::new());
        assert_eq!(router.state(), ConnectionState::Disconnected);
    }
}
