//! JSON Schema validation, reported as diagnostics.
//!
//! Normalization never calls this itself. Callers use it to check a raw
//! document against a published meta-schema, or a payload against a message's
//! payload schema, and get results in the same record format as the rest of
//! the pipeline.

use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticKind};

/// Validate a raw document against a meta-schema.
pub fn validate_document(document: &Value, meta_schema: &Value) -> Vec<Diagnostic> {
    validate_against_schema(meta_schema, document)
}

/// Validate an instance against a schema.
///
/// An invalid schema yields a single diagnostic at the root.
pub fn validate_against_schema(schema: &Value, instance: &Value) -> Vec<Diagnostic> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => {
            return vec![Diagnostic::error(
                DiagnosticKind::SchemaViolation,
                "",
                format!("invalid schema: {}", e),
            )]
        }
    };

    validator
        .iter_errors(instance)
        .map(|e| {
            Diagnostic::error(
                DiagnosticKind::SchemaViolation,
                e.instance_path.to_string(),
                e.to_string(),
            )
        })
        .collect()
}
