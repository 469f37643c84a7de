//! Sandbox abstraction used by the validation pipeline

use async_trait::async_trait;
use serde_json::Value;

use super::{ExecutionResult, SandboxLimits};

/// An isolated runtime for untrusted validation logic.
///
/// Implementations must build a fresh environment for every call and
/// enforce `limits()` preemptively. Failures are reported inside the
/// returned `ExecutionResult`, never as a panic or an `Err`.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `source` against a copy of `input`
    async fn execute(&self, source: &str, input: &Value) -> ExecutionResult;

    /// Limits applied to every call
    fn limits(&self) -> &SandboxLimits;

    /// Backend name (for logging)
    fn backend(&self) -> &str;
}
