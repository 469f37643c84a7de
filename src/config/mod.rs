//! Configuration module.
//!
//! Loads TOML engine settings, applies environment overrides and carries
//! preset API configurations to register at start-up.

mod config;

pub use config::{
    ENV_APP_ENV, ENV_LOG_LEVEL, ENV_MAX_MEMORY_MB, ENV_TIMEOUT_MS, Environment, LoggingSettings,
    Settings, SettingsError,
};
