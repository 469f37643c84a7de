//! Invocation error taxonomy
//!
//! Every variant maps to a distinct discriminator and HTTP status hint so
//! the transport layer can answer without inspecting message text.

use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::schema::{SchemaError, TypeMismatch};

fn join_keys(mismatches: &[TypeMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Terminal failure of one pipeline invocation
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error("API config \"{0}\" not found")]
    ConfigNotFound(String),

    /// The stored schema cannot be interpreted (server-side defect)
    #[error("Invalid config schema: {0}")]
    SchemaInvalid(SchemaError),

    /// The caller did not send a JSON object
    #[error("Invalid request: {0}")]
    PayloadInvalid(SchemaError),

    #[error("Missing keys: [{}]", .missing.join(", "))]
    MissingFields {
        missing: Vec<String>,
        expected: Vec<String>,
    },

    #[error("Invalid types for keys: [{}]", join_keys(.mismatches))]
    TypeMismatch { mismatches: Vec<TypeMismatch> },

    #[error("Sandbox execution failed: {error}")]
    SandboxFailure {
        error: SandboxError,
        execution_time: Duration,
    },

    /// The script ran and judged the input invalid
    #[error("{message}")]
    LogicRejected { message: String },
}

impl InvokeError {
    /// Stable result discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::ConfigNotFound(_) => "config_not_found",
            InvokeError::SchemaInvalid(_) => "schema_invalid",
            InvokeError::PayloadInvalid(_) => "payload_invalid",
            InvokeError::MissingFields { .. } => "missing_fields",
            InvokeError::TypeMismatch { .. } => "type_mismatch",
            InvokeError::SandboxFailure { .. } => "sandbox_failure",
            InvokeError::LogicRejected { .. } => "logic_rejected",
        }
    }

    /// Whether the failure lies with the server rather than the caller
    pub fn is_server_side(&self) -> bool {
        matches!(
            self,
            InvokeError::SchemaInvalid(_) | InvokeError::SandboxFailure { .. }
        )
    }

    /// HTTP status the transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            InvokeError::ConfigNotFound(_) => 404,
            InvokeError::SchemaInvalid(_) | InvokeError::SandboxFailure { .. } => 500,
            InvokeError::PayloadInvalid(_)
            | InvokeError::MissingFields { .. }
            | InvokeError::TypeMismatch { .. }
            | InvokeError::LogicRejected { .. } => 400,
        }
    }

    /// Response body for the transport layer.
    ///
    /// With `expose_internal` unset, sandbox failures carry only their
    /// category message and never the script's own error text.
    pub fn to_body(&self, expose_internal: bool) -> Value {
        match self {
            InvokeError::ConfigNotFound(_) => json!({
                "error": "Config not found",
                "message": self.to_string(),
            }),
            InvokeError::SchemaInvalid(_) => json!({
                "error": "Invalid config schema",
                "message": self.to_string(),
            }),
            InvokeError::PayloadInvalid(_) => json!({
                "error": "Invalid request",
                "message": self.to_string(),
            }),
            InvokeError::MissingFields { expected, .. } => json!({
                "error": "Missing required keys",
                "message": self.to_string(),
                "expectedKeys": expected,
            }),
            InvokeError::TypeMismatch { mismatches } => json!({
                "error": "Invalid types",
                "message": self.to_string(),
                "expectedTypes": mismatches,
            }),
            InvokeError::SandboxFailure {
                error,
                execution_time,
            } => json!({
                "error": "Sandbox execution failed",
                "category": error.category(),
                "message": if expose_internal { error.to_string() } else { error.public_message() },
                "executionTime": execution_time.as_millis() as u64,
            }),
            InvokeError::LogicRejected { message } => json!({
                "isValid": false,
                "message": message,
            }),
        }
    }
}
