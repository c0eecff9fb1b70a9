//! Winter Supplement calculation engine.
//!
//! A pure function from a validated request to a result. No rounding is
//! applied to the amounts.

use crate::domain::{CalculationRequest, CalculationResult, FamilyComposition};

/// Fixed supplement rates, in currency units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplementRates {
    /// Base amount for a single-person household
    pub single: f64,

    /// Base amount for a couple
    pub couple: f64,

    /// Amount per dependent child
    pub child_rate: f64,
}

impl SupplementRates {
    /// Rates in effect for the supplement
    pub const STANDARD: Self = Self {
        single: 60.0,
        couple: 120.0,
        child_rate: 20.0,
    };

    /// Base amount for a household composition
    pub fn base_for(&self, composition: FamilyComposition) -> f64 {
        match composition {
            FamilyComposition::Single => self.single,
            FamilyComposition::Couple => self.couple,
        }
    }
}

impl Default for SupplementRates {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Signature of a calculation engine, as used by the message handler
pub type CalculateFn = fn(&CalculationRequest) -> CalculationResult;

/// Calculate eligibility and amounts with the standard rates
pub fn calculate(request: &CalculationRequest) -> CalculationResult {
    calculate_with_rates(request, &SupplementRates::STANDARD)
}

/// Calculate eligibility and amounts with the given rates
pub fn calculate_with_rates(
    request: &CalculationRequest,
    rates: &SupplementRates,
) -> CalculationResult {
    if !request.family_unit_in_pay_for_december {
        return CalculationResult::ineligible(request.id.clone());
    }

    let base_amount = rates.base_for(request.family_composition);
    // f64 keeps very large child counts finite instead of wrapping
    let children_amount = request.number_of_children as f64 * rates.child_rate;

    CalculationResult::eligible(request.id.clone(), base_amount, children_amount)
}
