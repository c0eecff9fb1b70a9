//! Domain types for the supplement calculator.
//!
//! This module contains the two per-message records:
//! - CalculationRequest: A household's eligibility data
//! - CalculationResult: The computed eligibility and amounts

pub mod request;
pub mod result;

// Re-export commonly used types
pub use request::{CalculationRequest, FamilyComposition};
pub use result::CalculationResult;
