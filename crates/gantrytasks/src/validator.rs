//! Schema validation collaborator.
//!
//! The engine consumes validation as a capability: a schema plus a value in,
//! a verdict with field-level errors out. `BasicValidator` covers the
//! structural subset the gateway declares (`type`, `required`,
//! `properties`, `items`); a full JSON Schema engine can be swapped in
//! behind the same trait.

use gantrycore::FieldError;
use serde_json::Value;

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &Value, data: &Value) -> Result<(), Vec<FieldError>>;
}

/// Structural validator for the common schema keywords.
pub struct BasicValidator;

impl SchemaValidator for BasicValidator {
    fn validate(&self, schema: &Value, data: &Value) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check(schema, data, "$", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validator that accepts everything. Useful for wiring and tests.
pub struct AcceptAllValidator;

impl SchemaValidator for AcceptAllValidator {
    fn validate(&self, _schema: &Value, _data: &Value) -> Result<(), Vec<FieldError>> {
        Ok(())
    }
}

fn check(schema: &Value, data: &Value, path: &str, errors: &mut Vec<FieldError>) {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, data) {
            errors.push(FieldError::new(
                path,
                format!("expected {}, got {}", expected, type_name(data)),
            ));
            return;
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        if let Value::Object(map) = data {
            for name in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(name) {
                    errors.push(FieldError::new(
                        format!("{}.{}", path, name),
                        "required field missing",
                    ));
                }
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        if let Value::Object(map) = data {
            for (name, subschema) in properties {
                if let Some(value) = map.get(name) {
                    check(subschema, value, &format!("{}.{}", path, name), errors);
                }
            }
        }
    }

    if let Some(items) = schema.get("items") {
        if let Value::Array(values) = data {
            for (index, value) in values.iter().enumerate() {
                check(items, value, &format!("{}[{}]", path, index), errors);
            }
        }
    }
}

fn type_matches(expected: &str, data: &Value) -> bool {
    match expected {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "number" => data.is_number(),
        "integer" => data.is_i64() || data.is_u64(),
        "boolean" => data.is_boolean(),
        "null" => data.is_null(),
        _ => true,
    }
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
