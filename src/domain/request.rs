//! Inbound calculation requests.
//!
//! A request is built by the schema validator from a parsed payload and is
//! never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A household's eligibility data, keyed by correlation id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRequest {
    /// Correlation identifier, echoed verbatim in the result
    pub id: String,

    /// Number of dependent children
    pub number_of_children: u64,

    /// Household composition
    pub family_composition: FamilyComposition,

    /// Whether the family unit is in pay for December (the eligibility gate)
    pub family_unit_in_pay_for_december: bool,
}

impl CalculationRequest {
    /// Create a new request
    pub fn new(
        id: impl Into<String>,
        number_of_children: u64,
        family_composition: FamilyComposition,
        family_unit_in_pay_for_december: bool,
    ) -> Self {
        Self {
            id: id.into(),
            number_of_children,
            family_composition,
            family_unit_in_pay_for_december,
        }
    }
}

/// Household composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyComposition {
    Single,
    Couple,
}

impl FamilyComposition {
    /// All accepted wire values, in schema order
    pub const VALUES: [&'static str; 2] = ["single", "couple"];

    /// Parse a wire value
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "couple" => Some(Self::Couple),
            _ => None,
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Couple => "couple",
        }
    }
}

impl fmt::Display for FamilyComposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_names() {
        let request = CalculationRequest::new("abc", 2, FamilyComposition::Couple, true);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["id"], "abc");
        assert_eq!(value["numberOfChildren"], 2);
        assert_eq!(value["familyComposition"], "couple");
        assert_eq!(value["familyUnitInPayForDecember"], true);
    }

    #[test]
    fn test_family_composition_from_wire() {
        assert_eq!(FamilyComposition::from_wire("single"), Some(FamilyComposition::Single));
        assert_eq!(FamilyComposition::from_wire("couple"), Some(FamilyComposition::Couple));
        assert_eq!(FamilyComposition::from_wire("Single"), None);
        assert_eq!(FamilyComposition::from_wire("divorced"), None);

        for value in FamilyComposition::VALUES {
            assert_eq!(FamilyComposition::from_wire(value).unwrap().as_str(), value);
        }
    }
}
