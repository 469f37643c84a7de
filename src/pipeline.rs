//! Validation pipeline - request-time orchestration
//!
//! ```text
//! lookup ─► schema shape ─► presence/types ─► sandbox ─► outcome ─► envelope
//! ```
//!
//! Each step is terminal on failure. Everything up to and including the
//! presence/type check happens before the sandbox is touched.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::InvokeError;
use crate::registry::ConfigRegistry;
use crate::sandbox::{Sandbox, SandboxError, ValidationOutcome};
use crate::schema::{BodySchema, SchemaError, TypeTag};

/// Success response: pipeline metadata merged with the outcome's fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Outcome fields override `processedMessage` and `timestamp`,
    /// never `success`
    fn from_outcome(outcome: ValidationOutcome) -> Self {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(true));
        map.insert(
            "processedMessage".to_string(),
            Value::String(outcome.message.clone()),
        );
        map.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        for (key, value) in outcome.into_map() {
            if key != "success" {
                map.insert(key, value);
            }
        }

        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn processed_message(&self) -> Option<&str> {
        self.0.get("processedMessage").and_then(Value::as_str)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Sequences registry lookup, schema checks and sandboxed execution
pub struct ValidationPipeline {
    registry: Arc<ConfigRegistry>,
    sandbox: Arc<dyn Sandbox>,
}

impl ValidationPipeline {
    pub fn new(registry: Arc<ConfigRegistry>, sandbox: Arc<dyn Sandbox>) -> Self {
        Self { registry, sandbox }
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Run configuration `name` against `payload`
    pub async fn invoke(&self, name: &str, payload: &Value) -> Result<Envelope, InvokeError> {
        let config = self
            .registry
            .find_by_name(name)
            .map_err(|_| InvokeError::ConfigNotFound(name.to_string()))?;

        let schema = BodySchema::from_value(&config.body_schema).map_err(|e| {
            warn!("🚫 Configuration '{}' has an unusable schema: {}", name, e);
            InvokeError::SchemaInvalid(e)
        })?;

        let body = payload.as_object().ok_or_else(|| {
            InvokeError::PayloadInvalid(SchemaError::PayloadNotAnObject(TypeTag::of(payload)))
        })?;

        info!(
            "Executing API config \"{}\" with body keys: [{}]",
            name,
            body.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
        );

        let report = schema.check_object(body);
        if !report.missing_keys.is_empty() {
            debug!(missing = ?report.missing_keys, "Request is missing declared keys");
            return Err(InvokeError::MissingFields {
                missing: report.missing_keys,
                expected: schema.keys(),
            });
        }
        if !report.mismatched_keys.is_empty() {
            debug!(mismatched = report.mismatched_keys.len(), "Request has mistyped keys");
            return Err(InvokeError::TypeMismatch {
                mismatches: report.mismatched_keys,
            });
        }

        // The full raw payload goes in, not the schema-filtered subset
        let input = json!({ "body": payload });
        let execution = self
            .sandbox
            .execute(&config.validation_source, &input)
            .await;

        let execution_time = execution.execution_time;
        let outcome = match (execution.result, execution.error) {
            (Some(outcome), None) if execution.success => outcome,
            (_, error) => {
                return Err(InvokeError::SandboxFailure {
                    error: error.unwrap_or(SandboxError::MalformedResult),
                    execution_time,
                });
            }
        };

        if !outcome.is_valid {
            debug!("Configuration '{}' rejected input: {}", name, outcome.message);
            return Err(InvokeError::LogicRejected {
                message: outcome.message,
            });
        }

        debug!(
            "✅ Configuration '{}' accepted input in {}ms",
            name,
            execution_time.as_millis()
        );
        Ok(Envelope::from_outcome(outcome))
    }
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("registry", &self.registry)
            .field("sandbox", &self.sandbox.backend())
            .finish()
    }
}
