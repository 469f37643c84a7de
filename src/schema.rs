//! Structural body schema checks
//!
//! A configuration declares its expected request body as a flat mapping
//! from field name to a primitive type tag. The checker only looks at the
//! first level of the payload and never coerces values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Runtime type tag of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Only ever reported as an actual tag, never accepted in a schema.
    Null,
}

impl TypeTag {
    /// Tag of a concrete JSON value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => TypeTag::String,
            Value::Number(_) => TypeTag::Number,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Object(_) => TypeTag::Object,
            Value::Array(_) => TypeTag::Array,
            Value::Null => TypeTag::Null,
        }
    }

    /// Parse a tag as written in a body schema
    pub fn parse_declared(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(TypeTag::String),
            "number" => Some(TypeTag::Number),
            "boolean" => Some(TypeTag::Boolean),
            "object" => Some(TypeTag::Object),
            "array" => Some(TypeTag::Array),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::Null => "null",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while interpreting a schema or a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("body schema must be a plain object, got {0}")]
    SchemaNotAnObject(TypeTag),

    #[error("body schema contains an empty key")]
    EmptyKey,

    #[error("unknown type '{tag}' declared for key '{key}'")]
    UnknownType { key: String, tag: String },

    #[error("body must be a JSON object, got {0}")]
    PayloadNotAnObject(TypeTag),
}

/// A field whose runtime type differs from the declared one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMismatch {
    pub key: String,
    pub expected_type: TypeTag,
    pub actual_type: TypeTag,
}

/// Outcome of comparing a payload against a schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub missing_keys: Vec<String>,
    pub mismatched_keys: Vec<TypeMismatch>,
}

impl SchemaReport {
    pub fn is_clean(&self) -> bool {
        self.missing_keys.is_empty() && self.mismatched_keys.is_empty()
    }
}

/// Parsed body schema, fields kept in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySchema {
    fields: Vec<(String, TypeTag)>,
}

impl BodySchema {
    /// Interpret a declared schema value
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let map = value
            .as_object()
            .ok_or_else(|| SchemaError::SchemaNotAnObject(TypeTag::of(value)))?;

        let mut fields = Vec::with_capacity(map.len());
        for (key, tag) in map {
            if key.trim().is_empty() {
                return Err(SchemaError::EmptyKey);
            }
            let declared = tag
                .as_str()
                .and_then(TypeTag::parse_declared)
                .ok_or_else(|| SchemaError::UnknownType {
                    key: key.clone(),
                    tag: match tag {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                })?;
            fields.push((key.clone(), declared));
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, TypeTag)> {
        self.fields.iter().map(|(k, t)| (k.as_str(), *t))
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compare an object payload against this schema.
    ///
    /// Extra payload fields are ignored. A missing field is only reported
    /// as missing, never additionally as mismatched.
    pub fn check_object(&self, payload: &Map<String, Value>) -> SchemaReport {
        let mut report = SchemaReport::default();

        for (key, expected) in self.fields() {
            match payload.get(key) {
                None => report.missing_keys.push(key.to_string()),
                Some(value) => {
                    let actual = TypeTag::of(value);
                    if actual != expected {
                        report.mismatched_keys.push(TypeMismatch {
                            key: key.to_string(),
                            expected_type: expected,
                            actual_type: actual,
                        });
                    }
                }
            }
        }

        report
    }
}

/// Compare an arbitrary payload against a schema.
///
/// A payload that is not an object is a caller error, not a mismatch.
pub fn check(schema: &BodySchema, payload: &Value) -> Result<SchemaReport, SchemaError> {
    let object = payload
        .as_object()
        .ok_or_else(|| SchemaError::PayloadNotAnObject(TypeTag::of(payload)))?;
    Ok(schema.check_object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_schema() -> BodySchema {
        BodySchema::from_value(&json!({ "email": "string", "username": "string" })).unwrap()
    }

    #[test]
    fn test_clean_payload() {
        let report = check(
            &email_schema(),
            &json!({ "email": "user@example.com", "username": "test" }),
        )
        .unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let report = check(
            &email_schema(),
            &json!({ "email": "a@b.c", "username": "u", "extra": [1, 2] }),
        )
        .unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_missing_not_reported_as_mismatch() {
        let report = check(&email_schema(), &json!({ "username": 42 })).unwrap();
        assert_eq!(report.missing_keys, vec!["email".to_string()]);
        assert_eq!(
            report.mismatched_keys,
            vec![TypeMismatch {
                key: "username".to_string(),
                expected_type: TypeTag::String,
                actual_type: TypeTag::Number,
            }]
        );
    }

    #[test]
    fn test_array_and_object_are_distinct() {
        let schema = BodySchema::from_value(&json!({ "tags": "array", "meta": "object" })).unwrap();
        let report = check(&schema, &json!({ "tags": {}, "meta": [] })).unwrap();
        assert!(report.missing_keys.is_empty());
        assert_eq!(report.mismatched_keys.len(), 2);
        assert_eq!(report.mismatched_keys[0].actual_type, TypeTag::Object);
        assert_eq!(report.mismatched_keys[1].actual_type, TypeTag::Array);
    }

    #[test]
    fn test_null_never_matches() {
        let schema = BodySchema::from_value(&json!({ "flag": "boolean" })).unwrap();
        let report = check(&schema, &json!({ "flag": null })).unwrap();
        assert_eq!(report.mismatched_keys[0].actual_type, TypeTag::Null);
    }

    #[test]
    fn test_payload_must_be_object() {
        let err = check(&email_schema(), &json!(["email"])).unwrap_err();
        assert_eq!(err, SchemaError::PayloadNotAnObject(TypeTag::Array));

        let err = check(&email_schema(), &json!("email")).unwrap_err();
        assert_eq!(err, SchemaError::PayloadNotAnObject(TypeTag::String));
    }

    #[test]
    fn test_invalid_schemas() {
        assert_eq!(
            BodySchema::from_value(&json!(["string"])).unwrap_err(),
            SchemaError::SchemaNotAnObject(TypeTag::Array)
        );
        assert_eq!(
            BodySchema::from_value(&json!({ " ": "string" })).unwrap_err(),
            SchemaError::EmptyKey
        );
        assert!(matches!(
            BodySchema::from_value(&json!({ "email": "strng" })).unwrap_err(),
            SchemaError::UnknownType { ref key, ref tag } if key == "email" && tag == "strng"
        ));
        assert!(matches!(
            BodySchema::from_value(&json!({ "nested": { "a": "string" } })).unwrap_err(),
            SchemaError::UnknownType { .. }
        ));
    }

    #[test]
    fn test_declaration_order_kept() {
        let schema = BodySchema::from_value(&json!({ "zeta": "string", "alpha": "number" })).unwrap();
        assert_eq!(schema.keys(), vec!["zeta".to_string(), "alpha".to_string()]);
    }
}
