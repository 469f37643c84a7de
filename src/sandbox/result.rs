//! Sandbox execution result types

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::registry::ENTRY_POINT;

/// Structured value produced by a validation script
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub message: String,

    /// Any additional fields the script attached (normalized values etc.)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ValidationOutcome {
    /// Enforce the `{ isValid: bool, message: string, .. }` contract
    pub fn from_value(value: Value) -> Result<Self, SandboxError> {
        let Value::Object(mut map) = value else {
            return Err(SandboxError::MalformedResult);
        };

        let is_valid = match map.get("isValid") {
            Some(Value::Bool(b)) => *b,
            _ => return Err(SandboxError::MalformedResult),
        };
        let message = match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(SandboxError::MalformedResult),
        };

        map.shift_remove("isValid");
        map.shift_remove("message");

        Ok(Self {
            is_valid,
            message,
            extra: map,
        })
    }

    /// Flatten back into a JSON object: `isValid`, `message`, then extras
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::with_capacity(self.extra.len() + 2);
        map.insert("isValid".to_string(), Value::Bool(self.is_valid));
        map.insert("message".to_string(), Value::String(self.message));
        map.extend(self.extra);
        map
    }
}

/// Classified sandbox failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("Script execution timed out")]
    Timeout,

    #[error("Script exceeded the memory limit of {limit_mb}MB")]
    MemoryLimitExceeded { limit_mb: usize },

    #[error("Script compilation failed: {0}")]
    Compile(String),

    #[error("{} is not a function taking one argument", ENTRY_POINT)]
    NotCallable,

    #[error("Script error: {0}")]
    Runtime(String),

    #[error("Validation function must return an object with isValid and message.")]
    MalformedResult,
}

impl SandboxError {
    /// Timeouts and memory exhaustion mean the environment failed,
    /// not the script's logic
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            SandboxError::Timeout | SandboxError::MemoryLimitExceeded { .. }
        )
    }

    /// Stable category name
    pub fn category(&self) -> &'static str {
        match self {
            SandboxError::Timeout => "timeout",
            SandboxError::MemoryLimitExceeded { .. } => "memory_limit_exceeded",
            SandboxError::Compile(_) => "compile_error",
            SandboxError::NotCallable => "not_callable",
            SandboxError::Runtime(_) => "runtime_error",
            SandboxError::MalformedResult => "malformed_result",
        }
    }

    /// Message safe to show in production: no script internals
    pub fn public_message(&self) -> String {
        match self {
            SandboxError::Compile(_) => "Script compilation failed".to_string(),
            SandboxError::Runtime(_) => "Script execution failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl Serialize for SandboxError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Result of one sandboxed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the script ran to completion with a well-formed result
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SandboxError>,

    #[serde(serialize_with = "as_millis")]
    pub execution_time: Duration,
}

impl ExecutionResult {
    pub fn completed(outcome: ValidationOutcome, execution_time: Duration) -> Self {
        Self {
            success: true,
            result: Some(outcome),
            error: None,
            execution_time,
        }
    }

    pub fn failed(error: SandboxError, execution_time: Duration) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            execution_time,
        }
    }

    pub fn execution_time_ms(&self) -> u64 {
        self.execution_time.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_keeps_extra_fields() {
        let outcome = ValidationOutcome::from_value(json!({
            "isValid": true,
            "message": "ok",
            "processedEmail": "user@example.com"
        }))
        .unwrap();

        assert!(outcome.is_valid);
        assert_eq!(outcome.message, "ok");
        assert_eq!(outcome.extra["processedEmail"], "user@example.com");
        assert!(!outcome.extra.contains_key("isValid"));

        let map = outcome.into_map();
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["isValid", "message", "processedEmail"]);
    }

    #[test]
    fn test_outcome_shape_enforced() {
        for bad in [
            json!(null),
            json!("ok"),
            json!([true, "ok"]),
            json!({ "isValid": "true", "message": "ok" }),
            json!({ "isValid": true, "message": 1 }),
            json!({ "isValid": true }),
            json!({ "message": "ok" }),
        ] {
            assert_eq!(
                ValidationOutcome::from_value(bad).unwrap_err(),
                SandboxError::MalformedResult
            );
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(SandboxError::Timeout.is_infrastructure());
        assert!(SandboxError::MemoryLimitExceeded { limit_mb: 8 }.is_infrastructure());
        assert!(!SandboxError::Runtime("boom".into()).is_infrastructure());
        assert!(!SandboxError::MalformedResult.is_infrastructure());

        assert_eq!(SandboxError::Timeout.to_string(), "Script execution timed out");
        assert_eq!(
            SandboxError::Runtime("secret detail".into()).public_message(),
            "Script execution failed"
        );
        assert_eq!(SandboxError::Timeout.public_message(), "Script execution timed out");
    }

    #[test]
    fn test_execution_result_serialization() {
        let failed = ExecutionResult::failed(SandboxError::Timeout, Duration::from_millis(105));
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "error": "Script execution timed out",
                "executionTime": 105
            })
        );
    }
}
