//! winter_supplement - Message-driven Winter Supplement calculator
//!
//! Computes eligibility and payment amounts for the Winter Supplement.
//! Requests arrive on an MQTT input topic and results are published to
//! the matching output topic.
//!
//! # Architecture
//!
//! Each message is handled independently:
//! - The correlation id is taken from the last segment of the topic
//! - The payload is parsed and validated against the input schema
//! - The supplement is calculated and the result validated
//! - The result is published to `<output-topic-base><correlation-id>`
//!
//! Any failure drops the message; nothing is published for it.
//!
//! # Modules
//!
//! - `adapters`: Transport capability (MQTT, in-memory)
//! - `core`: Calculator, schema validation, message router
//! - `domain`: Request and result records
//! - `config`: Service configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve requests for every correlation id
//! winter-supplement serve --broker localhost
//!
//! # Calculate one request offline
//! echo '{"id":"a","numberOfChildren":1,"familyComposition":"single","familyUnitInPayForDecember":true}' \
//!     | winter-supplement calculate
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{InMemoryTransport, MqttTransport, Transport, TransportError, TransportEvent};
pub use config::Config;
pub use crate::core::{ConnectionState, MessageHandler, ProcessingError, Router, SchemaViolation};
pub use domain::{CalculationRequest, CalculationResult, FamilyComposition};
