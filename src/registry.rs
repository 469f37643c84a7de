//! Configuration registry - in-memory store of named API configurations
//!
//! Reads are concurrent, writes (create/delete) are serialized behind a
//! single `RwLock`. Records are handed out as `Arc`s so an in-flight
//! invocation keeps its configuration alive even if it is deleted
//! concurrently.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::BodySchema;

/// Name of the function every validation script must define
pub const ENTRY_POINT: &str = "validate";

static SOURCE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*fn\s+validate\s*\(\s*[A-Za-z_][A-Za-z0-9_]*\s*\)\s*\{[\s\S]*\}\s*$")
        .expect("validation source pattern is valid")
});

/// HTTP method a configuration is exposed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Request to register a new configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConfig {
    /// Unique configuration name
    pub name: String,

    /// Only `POST` is accepted
    pub method: HttpMethod,

    /// Expected request body: field name -> type tag
    pub body_schema: Value,

    /// Source of a single `fn validate(data) { ... }` script function
    pub validation_source: String,
}

impl CreateConfig {
    /// Shape checks performed before a record is stored
    pub fn check(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::InvalidName);
        }

        // Flat object of known type tags
        BodySchema::from_value(&self.body_schema)
            .map_err(|e| RegistryError::InvalidBodySchema(e.to_string()))?;

        if !SOURCE_SHAPE.is_match(&self.validation_source) {
            return Err(RegistryError::InvalidValidationSource(format!(
                "validationSource must be a single function starting with \"fn {}(\" \
                 that returns a map with \"isValid\" and \"message\"",
                ENTRY_POINT
            )));
        }

        Ok(())
    }
}

/// A stored configuration record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub name: String,
    pub method: HttpMethod,
    pub body_schema: Value,
    pub validation_source: String,
    pub created_at: DateTime<Utc>,
}

impl ApiConfig {
    fn from_request(request: CreateConfig) -> Self {
        Self {
            name: request.name,
            method: request.method,
            body_schema: request.body_schema,
            validation_source: request.validation_source,
            created_at: Utc::now(),
        }
    }
}

/// Registry failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Configuration with name '{0}' already exists")]
    AlreadyExists(String),

    #[error("Configuration with name '{0}' not found")]
    NotFound(String),

    #[error("Configuration name must not be empty")]
    InvalidName,

    #[error("Invalid body schema: {0}")]
    InvalidBodySchema(String),

    #[error("Invalid validation source: {0}")]
    InvalidValidationSource(String),
}

impl RegistryError {
    /// HTTP status the transport layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            RegistryError::AlreadyExists(_) => 409,
            RegistryError::NotFound(_) => 404,
            RegistryError::InvalidName
            | RegistryError::InvalidBodySchema(_)
            | RegistryError::InvalidValidationSource(_) => 400,
        }
    }
}

/// Registry of all configurations, keyed by name
#[derive(Default)]
pub struct ConfigRegistry {
    configs: RwLock<HashMap<String, Arc<ApiConfig>>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new configuration; fails if the name is taken
    pub fn create(&self, request: CreateConfig) -> Result<Arc<ApiConfig>, RegistryError> {
        request.check()?;

        let mut configs = self.configs.write();
        if configs.contains_key(&request.name) {
            return Err(RegistryError::AlreadyExists(request.name));
        }

        let config = Arc::new(ApiConfig::from_request(request));
        configs.insert(config.name.clone(), Arc::clone(&config));

        info!("📝 Registered configuration '{}' ({})", config.name, config.method);
        Ok(config)
    }

    /// Store a record as-is, for exercising invoke-time schema failures
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, request: CreateConfig) -> Arc<ApiConfig> {
        let config = Arc::new(ApiConfig::from_request(request));
        self.configs
            .write()
            .insert(config.name.clone(), Arc::clone(&config));
        config
    }

    /// Look up a configuration by name
    pub fn find_by_name(&self, name: &str) -> Result<Arc<ApiConfig>, RegistryError> {
        self.configs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All configurations, in no particular order
    pub fn list(&self) -> Vec<Arc<ApiConfig>> {
        self.configs.read().values().cloned().collect()
    }

    /// Remove a configuration. Returns whether one existed.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.configs.write().remove(name).is_some();
        if removed {
            info!("🗑️  Deleted configuration '{}'", name);
        } else {
            debug!("Delete requested for unknown configuration '{}'", name);
        }
        removed
    }

    pub fn exists(&self, name: &str) -> bool {
        self.configs.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("configs", &self.configs.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
