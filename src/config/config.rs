//! Engine settings loaded from TOML with environment overrides.
//!
//! ```toml
//! environment = "production"
//!
//! [sandbox]
//! timeout_ms = 100
//! max_memory_mb = 8
//!
//! [logging]
//! level = "info"
//! json = false
//!
//! [[configurations]]
//! name = "email-validator"
//! method = "POST"
//! bodySchema = { email = "string", username = "string" }
//! validationSource = '''
//! fn validate(data) { #{ isValid: true, message: "ok" } }
//! '''
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::registry::CreateConfig;
use crate::sandbox::SandboxLimits;

pub const ENV_TIMEOUT_MS: &str = "SANDBOX_TIMEOUT_MS";
pub const ENV_MAX_MEMORY_MB: &str = "SANDBOX_MAX_MEMORY_MB";
pub const ENV_APP_ENV: &str = "APP_ENV";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Deployment environment; production hides sandbox internals from callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Main settings structure
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub sandbox: SandboxLimits,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Configurations registered at start-up
    #[serde(default)]
    pub configurations: Vec<CreateConfig>,
}

/// Settings loading failures
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {var}")]
    InvalidOverride { var: &'static str, value: String },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(contents)?)
    }

    /// File (if any), then process environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|var| std::env::var(var).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.sandbox.timeout_ms = value.trim().parse().map_err(|_| {
                SettingsError::InvalidOverride {
                    var: ENV_TIMEOUT_MS,
                    value: value.clone(),
                }
            })?;
        }

        if let Some(value) = lookup(ENV_MAX_MEMORY_MB) {
            self.sandbox.max_memory_mb = value.trim().parse().map_err(|_| {
                SettingsError::InvalidOverride {
                    var: ENV_MAX_MEMORY_MB,
                    value: value.clone(),
                }
            })?;
        }

        if let Some(value) = lookup(ENV_APP_ENV) {
            self.environment = match value.trim().to_lowercase().as_str() {
                "production" => Environment::Production,
                "development" | "test" | "" => Environment::Development,
                _ => {
                    return Err(SettingsError::InvalidOverride {
                        var: ENV_APP_ENV,
                        value,
                    });
                }
            };
        }

        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sandbox.timeout_ms == 0 {
            return Err(SettingsError::Invalid(
                "sandbox.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.sandbox.max_memory_mb == 0 {
            return Err(SettingsError::Invalid(
                "sandbox.max_memory_mb must be greater than 0".to_string(),
            ));
        }
        if self.sandbox.max_call_levels == 0 {
            return Err(SettingsError::Invalid(
                "sandbox.max_call_levels must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HttpMethod;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.sandbox.timeout_ms, 100);
        assert_eq!(settings.sandbox.max_memory_mb, 8);
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.configurations.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_settings_with_configurations() {
        let toml_str = r#"
environment = "production"

[sandbox]
timeout_ms = 250
max_memory_mb = 16

[logging]
level = "debug"
json = true

[[configurations]]
name = "email-validator"
method = "POST"
bodySchema = { email = "string", username = "string" }
validationSource = '''
fn validate(data) { #{ isValid: true, message: "ok" } }
'''
"#;

        let settings = Settings::from_toml_str(toml_str).unwrap();
        assert!(settings.environment.is_production());
        assert_eq!(settings.sandbox.timeout_ms, 250);
        assert_eq!(settings.sandbox.max_memory_mb, 16);
        assert_eq!(settings.sandbox.max_call_levels, 64);
        assert!(settings.logging.json);

        let config = &settings.configurations[0];
        assert_eq!(config.name, "email-validator");
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.body_schema["email"], "string");
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_rejects_unsupported_method() {
        let toml_str = r#"
[[configurations]]
name = "x"
method = "GET"
bodySchema = {}
validationSource = "fn validate(d) { d }"
"#;
        assert!(matches!(
            Settings::from_toml_str(toml_str),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup_from(&[
                (ENV_TIMEOUT_MS, "50"),
                (ENV_MAX_MEMORY_MB, " 4 "),
                (ENV_APP_ENV, "Production"),
                (ENV_LOG_LEVEL, "warn"),
            ]))
            .unwrap();

        assert_eq!(settings.sandbox.timeout_ms, 50);
        assert_eq!(settings.sandbox.max_memory_mb, 4);
        assert!(settings.environment.is_production());
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(lookup_from(&[(ENV_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidOverride { var: ENV_TIMEOUT_MS, .. }
        ));
    }

    #[test]
    fn test_zero_limits_invalid() {
        let mut settings = Settings::default();
        settings.sandbox.timeout_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.sandbox.max_memory_mb = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[sandbox]\ntimeout_ms = 75").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.sandbox.timeout_ms, 75);
        assert_eq!(settings.sandbox.max_memory_mb, 8);

        assert!(matches!(
            Settings::from_file("/definitely/not/here.toml"),
            Err(SettingsError::Io { .. })
        ));
    }
}
