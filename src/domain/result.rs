//! Outbound calculation results.

use serde::{Deserialize, Serialize};

/// Eligibility and payment amounts for one request.
///
/// `supplement_amount` is always `base_amount + children_amount`; an
/// ineligible result carries zero for all three amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    /// Copied unchanged from the request
    pub id: String,

    pub is_eligible: bool,

    pub base_amount: f64,

    pub children_amount: f64,

    pub supplement_amount: f64,
}

impl CalculationResult {
    /// An ineligible result: all amounts are zero
    pub fn ineligible(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_eligible: false,
            base_amount: 0.0,
            children_amount: 0.0,
            supplement_amount: 0.0,
        }
    }

    /// An eligible result; the supplement is the sum of both parts
    pub fn eligible(id: impl Into<String>, base_amount: f64, children_amount: f64) -> Self {
        Self {
            id: id.into(),
            is_eligible: true,
            base_amount,
            children_amount,
            supplement_amount: base_amount + children_amount,
        }
    }
}
