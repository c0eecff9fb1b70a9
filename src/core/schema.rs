//! Structural validation of inbound and outbound records.
//!
//! Validation is purely structural: required fields, types, the
//! `familyComposition` enumeration and non-negativity of numbers. Fields
//! are checked in schema order and the first violation is reported.
//! Unknown extra fields are permitted.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{CalculationRequest, FamilyComposition};

/// Required input fields, in schema order
pub const INPUT_FIELDS: [&str; 4] = [
    "id",
    "numberOfChildren",
    "familyComposition",
    "familyUnitInPayForDecember",
];

/// Required output fields, in schema order
pub const OUTPUT_FIELDS: [&str; 5] = [
    "id",
    "isEligible",
    "baseAmount",
    "childrenAmount",
    "supplementAmount",
];

/// The first structural constraint a record violates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("{found} is not of type 'object'")]
    NotAnObject { found: String },

    #[error("'{field}' is a required property")]
    MissingField { field: &'static str },

    #[error("'{field}': {found} is not of type '{expected}'")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("'{field}': {found} is not one of {allowed:?}")]
    NotInEnum {
        field: &'static str,
        allowed: &'static [&'static str],
        found: String,
    },

    #[error("'{field}': {found} is less than the minimum of 0")]
    BelowMinimum { field: &'static str, found: String },

    #[error("'{field}': {found} exceeds the supported integer range")]
    OutOfRange { field: &'static str, found: String },
}

impl SchemaViolation {
    /// Name of the offending field, if the violation concerns one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::NotAnObject { .. } => None,
            Self::MissingField { field }
            | Self::WrongType { field, .. }
            | Self::NotInEnum { field, .. }
            | Self::BelowMinimum { field, .. }
            | Self::OutOfRange { field, .. } => Some(field),
        }
    }
}

/// Validate a parsed input record and build the typed request from it
pub fn validate_input(record: &Value) -> Result<CalculationRequest, SchemaViolation> {
    let object = as_object(record)?;

    let id = string_field(object, "id")?;
    let number_of_children = non_negative_integer_field(object, "numberOfChildren")?;
    let family_composition = composition_field(object, "familyComposition")?;
    let family_unit_in_pay_for_december = bool_field(object, "familyUnitInPayForDecember")?;

    Ok(CalculationRequest {
        id: id.to_string(),
        number_of_children,
        family_composition,
        family_unit_in_pay_for_december,
    })
}

/// Validate a serialized result record
pub fn validate_output(record: &Value) -> Result<(), SchemaViolation> {
    let object = as_object(record)?;

    string_field(object, "id")?;
    bool_field(object, "isEligible")?;
    for field in ["baseAmount", "childrenAmount", "supplementAmount"] {
        non_negative_number_field(object, field)?;
    }

    Ok(())
}

fn as_object(record: &Value) -> Result<&Map<String, Value>, SchemaViolation> {
    record.as_object().ok_or_else(|| SchemaViolation::NotAnObject {
        found: describe(record),
    })
}

fn required<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, SchemaViolation> {
    object
        .get(field)
        .ok_or(SchemaViolation::MissingField { field })
}

fn wrong_type(field: &'static str, expected: &'static str, value: &Value) -> SchemaViolation {
    SchemaViolation::WrongType {
        field,
        expected,
        found: describe(value),
    }
}

fn string_field<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, SchemaViolation> {
    let value = required(object, field)?;
    value
        .as_str()
        .ok_or_else(|| wrong_type(field, "string", value))
}

fn bool_field(object: &Map<String, Value>, field: &'static str) -> Result<bool, SchemaViolation> {
    let value = required(object, field)?;
    value
        .as_bool()
        .ok_or_else(|| wrong_type(field, "boolean", value))
}

fn composition_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<FamilyComposition, SchemaViolation> {
    let value = required(object, field)?;
    value
        .as_str()
        .and_then(FamilyComposition::from_wire)
        .ok_or_else(|| SchemaViolation::NotInEnum {
            field,
            allowed: &FamilyComposition::VALUES,
            found: describe(value),
        })
}

/// Integral JSON numbers (`3` or `3.0`) in `0..=u64::MAX`
fn non_negative_integer_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<u64, SchemaViolation> {
    let value = required(object, field)?;
    let Value::Number(number) = value else {
        return Err(wrong_type(field, "integer", value));
    };

    if let Some(count) = number.as_u64() {
        return Ok(count);
    }
    if number.as_i64().is_some() {
        return Err(SchemaViolation::BelowMinimum {
            field,
            found: number.to_string(),
        });
    }

    match number.as_f64() {
        Some(float) if float.is_finite() && float.fract() == 0.0 => {
            if float < 0.0 {
                Err(SchemaViolation::BelowMinimum {
                    field,
                    found: number.to_string(),
                })
            } else if float < u64::MAX as f64 {
                Ok(float as u64)
            } else {
                Err(SchemaViolation::OutOfRange {
                    field,
                    found: number.to_string(),
                })
            }
        }
        _ => Err(wrong_type(field, "integer", value)),
    }
}

fn non_negative_number_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<f64, SchemaViolation> {
    let value = required(object, field)?;
    let amount = value
        .as_f64()
        .ok_or_else(|| wrong_type(field, "number", value))?;

    if amount < 0.0 {
        return Err(SchemaViolation::BelowMinimum {
            field,
            found: describe(value),
        });
    }

    Ok(amount)
}

/// Short rendering of a JSON value for violation messages
fn describe(value: &Value) -> String {
    match value {
        Value::Object(_) => "object".to_string(),
        Value::Array(_) => "array".to_string(),
        other => other.to_string(),
    }
}
