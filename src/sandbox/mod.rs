//! Sandboxed execution of user-authored validation logic
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       ValidationPipeline                │
//! └────────┬────────────────────────────────┘
//!          │  Arc<dyn Sandbox>
//!          ▼
//! ┌─────────────────────────────────────────┐
//! │       ScriptSandbox (per call)          │
//! ├─────────────────────────────────────────┤
//! │  • fresh Rhai engine, dropped after run │
//! │  • deadline checked in the eval loop    │
//! │  • live heap bytes counted per thread   │
//! │  • data-size and call-depth ceilings    │
//! │  • no modules, no eval, strict globals  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Only the JSON input goes in and only the script's returned value comes
//! back out; it is shape-checked before anything downstream trusts it.

pub mod memory;
pub mod result;
pub mod script;
pub mod traits;

use serde::Deserialize;
use std::time::Duration;

pub use result::{ExecutionResult, SandboxError, ValidationOutcome};
pub use script::ScriptSandbox;
pub use traits::Sandbox;

/// Resource ceilings applied to every sandboxed call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Wall-clock budget in milliseconds
    pub timeout_ms: u64,

    /// Memory budget in megabytes
    pub max_memory_mb: usize,

    /// Maximum script call depth
    pub max_call_levels: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            max_memory_mb: 8,
            max_call_levels: 64,
        }
    }
}

impl SandboxLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }
}
