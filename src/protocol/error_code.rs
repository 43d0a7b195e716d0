//! OCPP-J error-code taxonomy and the classifier that maps validation
//! outcomes onto it.

use serde_json::{json, Value};

use super::validator::{ValidationOutcome, ViolationKind};

/// Error codes defined by OCPP-J 1.6 that this gateway produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcppErrorCode {
    NotImplemented,
    FormationViolation,
    PropertyConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl OcppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }
}

impl std::fmt::Display for OcppErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a validation outcome to the OCPP error code and the errorDetails
/// payload for the resulting CallError.
///
/// - an action with no schema document is `NotImplemented`;
/// - zero recorded violations (broken schema) and two or more violations
///   both collapse to `GenericError`;
/// - a single violation maps by its constraint kind.
///
/// The details payload carries the raw violation messages under an `Error`
/// key, or an empty object when there are none.
pub fn classify(outcome: &ValidationOutcome) -> (OcppErrorCode, Value) {
    let details = if outcome.violations.is_empty() {
        json!({})
    } else {
        let messages: Vec<&str> = outcome
            .violations
            .iter()
            .map(|v| v.message.as_str())
            .collect();
        json!({ "Error": messages })
    };

    if outcome.unimplemented_action {
        return (OcppErrorCode::NotImplemented, details);
    }

    let code = match outcome.violations.as_slice() {
        [] => OcppErrorCode::GenericError,
        [single] => match single.kind {
            ViolationKind::MultipleOf | ViolationKind::Enum => {
                OcppErrorCode::PropertyConstraintViolation
            }
            ViolationKind::Required
            | ViolationKind::Format
            | ViolationKind::AdditionalProperties => OcppErrorCode::FormationViolation,
            ViolationKind::Type => OcppErrorCode::TypeConstraintViolation,
            ViolationKind::Other => OcppErrorCode::GenericError,
        },
        _ => OcppErrorCode::GenericError,
    };

    (code, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::validator::SchemaViolation;

    fn violation(kind: ViolationKind, message: &str) -> SchemaViolation {
        SchemaViolation {
            kind,
            message: message.to_string(),
        }
    }

    fn outcome_with(violations: Vec<SchemaViolation>) -> ValidationOutcome {
        ValidationOutcome {
            valid: false,
            violations,
            unimplemented_action: false,
        }
    }

    #[test]
    fn unimplemented_action_maps_to_not_implemented() {
        let outcome = ValidationOutcome {
            valid: false,
            violations: Vec::new(),
            unimplemented_action: true,
        };
        let (code, details) = classify(&outcome);
        assert_eq!(code, OcppErrorCode::NotImplemented);
        assert_eq!(details, json!({}));
    }

    #[test]
    fn single_violation_mapping() {
        let cases = [
            (
                ViolationKind::MultipleOf,
                OcppErrorCode::PropertyConstraintViolation,
            ),
            (ViolationKind::Enum, OcppErrorCode::PropertyConstraintViolation),
            (ViolationKind::Required, OcppErrorCode::FormationViolation),
            (ViolationKind::Format, OcppErrorCode::FormationViolation),
            (
                ViolationKind::AdditionalProperties,
                OcppErrorCode::FormationViolation,
            ),
            (ViolationKind::Type, OcppErrorCode::TypeConstraintViolation),
            (ViolationKind::Other, OcppErrorCode::GenericError),
        ];
        for (kind, expected) in cases {
            let (code, details) = classify(&outcome_with(vec![violation(kind, "v")]));
            assert_eq!(code, expected, "kind {:?}", kind);
            assert_eq!(details["Error"][0], "v");
        }
    }

    #[test]
    fn multiple_violations_collapse_to_generic_error() {
        let outcome = outcome_with(vec![
            violation(ViolationKind::Required, "a"),
            violation(ViolationKind::Type, "b"),
        ]);
        let (code, details) = classify(&outcome);
        assert_eq!(code, OcppErrorCode::GenericError);
        assert_eq!(details["Error"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_violation_list_is_generic_error_with_empty_details() {
        let (code, details) = classify(&outcome_with(Vec::new()));
        assert_eq!(code, OcppErrorCode::GenericError);
        assert_eq!(details, json!({}));
    }
}
