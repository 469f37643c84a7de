//! # dynapi-engine
//!
//! Dynamic API configurations validated by user-authored scripts.
//!
//! A configuration names an endpoint, declares the JSON body shape it
//! accepts and carries a `validate` function. At request time the
//! [`ValidationPipeline`] looks the configuration up, checks the payload
//! against the declared schema and only then runs the script inside a
//! [`ScriptSandbox`] bounded by a wall-clock deadline and memory ceilings.
//!
//! ## Modules
//! - [`registry`]: named configurations, unique by name
//! - [`schema`]: declared-type checks over payload keys
//! - [`sandbox`]: isolated script execution and result shape checks
//! - [`pipeline`]: request-time orchestration and success envelope
//! - [`error`]: invocation error taxonomy
//! - [`config`]: TOML settings with environment overrides
//! - [`console`]: line-oriented command surface used by the binary

pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod sandbox;
pub mod schema;

pub use error::InvokeError;
pub use pipeline::{Envelope, ValidationPipeline};
pub use registry::{ApiConfig, ConfigRegistry, CreateConfig, RegistryError};
pub use sandbox::{ExecutionResult, Sandbox, SandboxError, SandboxLimits, ScriptSandbox};
