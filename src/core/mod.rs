//! Core calculation pipeline.
//!
//! This module contains:
//! - Calculator: The pure supplement calculation
//! - Schema: Structural validation of input and output records
//! - Router: Connection lifecycle and per-message handling

pub mod calculator;
pub mod router;
pub mod schema;

// Re-export commonly used types
pub use calculator::{calculate, calculate_with_rates, CalculateFn, SupplementRates};
pub use router::{
    compute_response, correlation_id, ConnectionState, MessageHandler, ProcessingError, Router,
};
pub use schema::{validate_input, validate_output, SchemaViolation, INPUT_FIELDS, OUTPUT_FIELDS};
