//! Per-action payload validation against JSON Schema documents.
//!
//! Each OCPP action is validated against a schema document named after the
//! action (`<schema_dir>/<Action>.json`). A missing document is a distinct,
//! non-fatal condition: the action is reported as unimplemented rather than
//! invalid. Compiled validators are cached process-wide.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;
use tracing::{debug, error};

/// Outcome of validating one Call payload.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub valid: bool,
    /// Constraint violations in schema-evaluation order. Empty iff valid.
    pub violations: Vec<SchemaViolation>,
    /// Set when no schema document exists for the action.
    pub unimplemented_action: bool,
}

impl ValidationOutcome {
    fn ok() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
            unimplemented_action: false,
        }
    }

    fn unimplemented() -> Self {
        Self {
            valid: false,
            violations: Vec::new(),
            unimplemented_action: true,
        }
    }

    fn invalid(violations: Vec<SchemaViolation>) -> Self {
        Self {
            valid: false,
            violations,
            unimplemented_action: false,
        }
    }
}

/// One schema constraint violation.
#[derive(Debug, Clone)]
pub struct SchemaViolation {
    pub kind: ViolationKind,
    pub message: String,
}

/// Constraint kind, decoupled from the underlying validator's error type so
/// the error classifier does not depend on `jsonschema` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Required,
    Type,
    Enum,
    MultipleOf,
    Format,
    AdditionalProperties,
    Other,
}

impl From<&ValidationErrorKind> for ViolationKind {
    fn from(kind: &ValidationErrorKind) -> Self {
        match kind {
            ValidationErrorKind::Required { .. } => Self::Required,
            ValidationErrorKind::Type { .. } => Self::Type,
            ValidationErrorKind::Enum { .. } => Self::Enum,
            ValidationErrorKind::MultipleOf { .. } => Self::MultipleOf,
            ValidationErrorKind::Format { .. } => Self::Format,
            ValidationErrorKind::AdditionalProperties { .. } => Self::AdditionalProperties,
            _ => Self::Other,
        }
    }
}

enum CachedSchema {
    Compiled(Arc<jsonschema::Validator>),
    /// Lookup already failed once; remember that instead of re-reading.
    Missing,
    /// The document exists but does not read or compile.
    Broken,
}

/// Store of compiled per-action schema validators.
pub struct SchemaStore {
    dir: Option<PathBuf>,
    cache: DashMap<String, Arc<CachedSchema>>,
}

impl SchemaStore {
    /// Store backed by a directory of `<Action>.json` documents, loaded
    /// lazily on first use.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: DashMap::new(),
        }
    }

    /// Store with no schema source at all; every action is unimplemented.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            cache: DashMap::new(),
        }
    }

    /// Store pre-seeded with in-memory schema documents. Actions without an
    /// entry are treated as unimplemented.
    pub fn from_schemas(schemas: HashMap<String, Value>) -> Self {
        let store = Self {
            dir: None,
            cache: DashMap::new(),
        };
        for (action, doc) in schemas {
            store.cache.insert(action, Arc::new(compile(&doc)));
        }
        store
    }

    /// Validate `payload` against the schema for `action`.
    pub fn validate(&self, action: &str, payload: &Value) -> ValidationOutcome {
        let entry = match self.cache.get(action) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                let loaded = Arc::new(self.load(action));
                self.cache.insert(action.to_string(), Arc::clone(&loaded));
                loaded
            }
        };

        match entry.as_ref() {
            CachedSchema::Missing => ValidationOutcome::unimplemented(),
            // A broken schema is a deployment fault, not the charger's. The
            // empty violation list classifies as GenericError.
            CachedSchema::Broken => ValidationOutcome::invalid(Vec::new()),
            CachedSchema::Compiled(validator) => {
                let violations: Vec<SchemaViolation> = validator
                    .iter_errors(payload)
                    .map(|e| SchemaViolation {
                        kind: ViolationKind::from(&e.kind),
                        message: e.to_string(),
                    })
                    .collect();

                if violations.is_empty() {
                    ValidationOutcome::ok()
                } else {
                    debug!(
                        action,
                        count = violations.len(),
                        "payload failed schema validation"
                    );
                    ValidationOutcome::invalid(violations)
                }
            }
        }
    }

    fn load(&self, action: &str) -> CachedSchema {
        // Action names come off the wire and are used as a file name.
        if action.is_empty() || !action.chars().all(|c| c.is_ascii_alphanumeric()) {
            return CachedSchema::Missing;
        }

        let Some(dir) = &self.dir else {
            return CachedSchema::Missing;
        };

        let path = dir.join(format!("{action}.json"));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(action, "no schema document for action");
                return CachedSchema::Missing;
            }
            Err(e) => {
                error!(action, path = %path.display(), error = %e, "failed to read schema document");
                return CachedSchema::Broken;
            }
        };

        let doc: Value = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                error!(action, path = %path.display(), error = %e, "schema document is not valid JSON");
                return CachedSchema::Broken;
            }
        };

        compile(&doc)
    }
}

fn compile(doc: &Value) -> CachedSchema {
    match jsonschema::options()
        .should_validate_formats(true)
        .build(doc)
    {
        Ok(validator) => CachedSchema::Compiled(Arc::new(validator)),
        Err(e) => {
            error!(error = %e, "schema document failed to compile");
            CachedSchema::Broken
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(action: &str, schema: Value) -> SchemaStore {
        let mut schemas = HashMap::new();
        schemas.insert(action.to_string(), schema);
        SchemaStore::from_schemas(schemas)
    }

    fn boot_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "chargePointVendor": { "type": "string", "maxLength": 20 },
                "chargePointModel": { "type": "string", "maxLength": 20 }
            },
            "required": ["chargePointVendor", "chargePointModel"],
            "additionalProperties": false
        })
    }

    #[test]
    fn valid_payload_passes() {
        let store = store_with("BootNotification", boot_schema());
        let outcome = store.validate(
            "BootNotification",
            &json!({"chargePointVendor": "V", "chargePointModel": "M"}),
        );
        assert!(outcome.valid);
        assert!(outcome.violations.is_empty());
        assert!(!outcome.unimplemented_action);
    }

    #[test]
    fn missing_required_field_is_required_violation() {
        let store = store_with("BootNotification", boot_schema());
        let outcome = store.validate("BootNotification", &json!({"chargePointVendor": "V"}));
        assert!(!outcome.valid);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].kind, ViolationKind::Required);
    }

    #[test]
    fn wrong_type_is_type_violation() {
        let store = store_with("BootNotification", boot_schema());
        let outcome = store.validate(
            "BootNotification",
            &json!({"chargePointVendor": 1, "chargePointModel": "M"}),
        );
        assert!(!outcome.valid);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].kind, ViolationKind::Type);
    }

    #[test]
    fn extra_property_is_additional_properties_violation() {
        let store = store_with("BootNotification", boot_schema());
        let outcome = store.validate(
            "BootNotification",
            &json!({"chargePointVendor": "V", "chargePointModel": "M", "bogus": true}),
        );
        assert!(!outcome.valid);
        assert_eq!(
            outcome.violations[0].kind,
            ViolationKind::AdditionalProperties
        );
    }

    #[test]
    fn enum_violation() {
        let store = store_with(
            "StatusNotification",
            json!({
                "type": "object",
                "properties": {
                    "status": { "type": "string", "enum": ["Available", "Faulted"] }
                },
                "required": ["status"]
            }),
        );
        let outcome = store.validate("StatusNotification", &json!({"status": "Sideways"}));
        assert_eq!(outcome.violations[0].kind, ViolationKind::Enum);
    }

    #[test]
    fn unknown_action_is_unimplemented() {
        let store = store_with("BootNotification", boot_schema());
        let outcome = store.validate("BogusAction", &json!({}));
        assert!(!outcome.valid);
        assert!(outcome.unimplemented_action);
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn hostile_action_name_never_touches_the_filesystem() {
        let store = SchemaStore::from_dir("/etc");
        let outcome = store.validate("../passwd", &json!({}));
        assert!(outcome.unimplemented_action);
    }

    #[test]
    fn unknown_action_lookup_is_cached() {
        let store = store_with("BootNotification", boot_schema());
        assert!(store.validate("Nope", &json!({})).unimplemented_action);
        assert!(store.validate("Nope", &json!({})).unimplemented_action);
    }
}
