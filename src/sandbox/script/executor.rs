//! Rhai script executor
//!
//! Every call builds its own `Engine`, runs on its own worker thread and is
//! torn down when it returns. The wall-clock deadline is checked from the
//! engine's progress hook, which fires inside the evaluation loop, so a
//! script that never yields is still interrupted.

use crate::registry::ENTRY_POINT;
use crate::sandbox::memory::{self, MemoryScope};
use crate::sandbox::*;
use async_trait::async_trait;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

const SCRIPT_LOG_TARGET: &str = "dynapi_engine::sandbox::script";

/// Check the clock every this many engine operations
const PROGRESS_STRIDE: u64 = 32;

/// Extra time the awaiting caller gives a worker to unwind after its deadline
const TEARDOWN_GRACE: Duration = Duration::from_millis(250);

/// Unoptimized Rhai builds use large stack frames per call level
const WORKER_STACK_BYTES: usize = 16 * 1024 * 1024;

/// Approximate cost of one array slot
const ARRAY_SLOT_BYTES: usize = std::mem::size_of::<Dynamic>();

/// Approximate cost of one map entry (key + value + index overhead)
const MAP_ENTRY_BYTES: usize = std::mem::size_of::<Dynamic>() * 4;

const MAX_EXPR_DEPTH: usize = 64;
const MAX_FN_EXPR_DEPTH: usize = 32;

/// Sandbox running Rhai validation scripts
#[derive(Debug, Clone)]
pub struct ScriptSandbox {
    limits: SandboxLimits,
}

impl ScriptSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        debug!(
            "Script sandbox ready: timeout={}ms, memory={}MB, call_levels={}",
            limits.timeout_ms, limits.max_memory_mb, limits.max_call_levels
        );
        Self { limits }
    }

    /// Build a capability-free engine bound to one call's deadline
    fn build_engine(limits: &SandboxLimits, deadline: Instant) -> Engine {
        let mut engine = Engine::new();

        // No imports, no eval, no undeclared globals
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.set_max_modules(0);
        engine.disable_symbol("eval");
        engine.set_strict_variables(true);

        let budget = limits.max_memory_bytes();
        engine.set_max_string_size(budget);
        engine.set_max_array_size((budget / ARRAY_SLOT_BYTES).max(1));
        engine.set_max_map_size((budget / MAP_ENTRY_BYTES).max(1));
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);

        engine.on_print(|text| debug!(target: SCRIPT_LOG_TARGET, "{}", text));
        engine.on_debug(|text, _source, pos| {
            debug!(target: SCRIPT_LOG_TARGET, %pos, "{}", text)
        });

        engine.on_progress(move |operations| {
            if memory::live_bytes() > budget
                || (operations % PROGRESS_STRIDE == 0 && Instant::now() >= deadline)
            {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        engine
    }

    /// Compile and run one script against one input, synchronously
    fn run_isolated(
        source: &str,
        input: &Value,
        limits: &SandboxLimits,
        deadline: Instant,
    ) -> Result<ValidationOutcome, SandboxError> {
        let input_size = serde_json::to_vec(input)
            .map_err(|e| SandboxError::Runtime(format!("Failed to serialize input: {}", e)))?
            .len();
        if input_size > limits.max_memory_bytes() {
            return Err(SandboxError::MemoryLimitExceeded {
                limit_mb: limits.max_memory_mb,
            });
        }

        let engine = Self::build_engine(limits, deadline);

        let ast = engine
            .compile(source)
            .map_err(|e| SandboxError::Compile(e.to_string()))?;

        if !ast
            .iter_functions()
            .any(|f| f.name == ENTRY_POINT && f.params.len() == 1)
        {
            return Err(SandboxError::NotCallable);
        }

        // Everything the script holds is counted from here, input included
        let memory = MemoryScope::open();

        // Deep copy; the script only ever sees its own value tree
        let data = rhai::serde::to_dynamic(input)
            .map_err(|e| SandboxError::Runtime(format!("Failed to convert input: {}", e)))?;

        let called = engine.call_fn::<Dynamic>(&mut Scope::new(), &ast, ENTRY_POINT, (data,));

        let peak_bytes = memory.peak_bytes();
        drop(memory);
        if peak_bytes > limits.max_memory_bytes() {
            debug!(peak_bytes, "Script went over its memory budget");
            return Err(SandboxError::MemoryLimitExceeded {
                limit_mb: limits.max_memory_mb,
            });
        }

        let raw = called.map_err(|e| Self::classify(&e, limits))?;

        let value: Value =
            rhai::serde::from_dynamic(&raw).map_err(|_| SandboxError::MalformedResult)?;

        ValidationOutcome::from_value(value)
    }

    /// Map an engine error onto a sandbox failure category
    fn classify(err: &EvalAltResult, limits: &SandboxLimits) -> SandboxError {
        match err {
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
            | EvalAltResult::ErrorInModule(_, inner, _) => Self::classify(inner, limits),
            EvalAltResult::ErrorTerminated(_, _) | EvalAltResult::ErrorTooManyOperations(_) => {
                SandboxError::Timeout
            }
            EvalAltResult::ErrorDataTooLarge(_, _) | EvalAltResult::ErrorStackOverflow(_) => {
                SandboxError::MemoryLimitExceeded {
                    limit_mb: limits.max_memory_mb,
                }
            }
            EvalAltResult::ErrorParsing(_, _) => SandboxError::Compile(err.to_string()),
            EvalAltResult::ErrorRuntime(value, _) => SandboxError::Runtime(value.to_string()),
            other => SandboxError::Runtime(other.to_string()),
        }
    }
}

impl Default for ScriptSandbox {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

#[async_trait]
impl Sandbox for ScriptSandbox {
    async fn execute(&self, source: &str, input: &Value) -> ExecutionResult {
        let start = Instant::now();
        let deadline = start + self.limits.timeout();

        let limits = self.limits.clone();
        let source = source.to_string();
        let input = input.clone();

        let (tx, rx) = oneshot::channel();
        let spawned = std::thread::Builder::new()
            .name("sandbox-worker".to_string())
            .stack_size(WORKER_STACK_BYTES)
            .spawn(move || {
                // Receiver may be gone after a hard timeout
                let _ = tx.send(Self::run_isolated(&source, &input, &limits, deadline));
            });

        let outcome = match spawned {
            Err(e) => {
                error!("Failed to start sandbox worker: {}", e);
                Err(SandboxError::Runtime(format!("Failed to start sandbox worker: {}", e)))
            }
            Ok(_) => match tokio::time::timeout(self.limits.timeout() + TEARDOWN_GRACE, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    error!("Sandbox worker exited without a result");
                    Err(SandboxError::Runtime("Sandbox worker panicked".to_string()))
                }
                Err(_) => Err(SandboxError::Timeout),
            },
        };

        let execution_time = start.elapsed();
        match outcome {
            Ok(outcome) => {
                debug!(
                    execution_time_ms = execution_time.as_millis() as u64,
                    is_valid = outcome.is_valid,
                    "Sandbox run completed"
                );
                ExecutionResult::completed(outcome, execution_time)
            }
            Err(e) => {
                warn!(
                    execution_time_ms = execution_time.as_millis() as u64,
                    category = e.category(),
                    "⚠️  Sandbox run failed: {}",
                    e
                );
                ExecutionResult::failed(e, execution_time)
            }
        }
    }

    fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    fn backend(&self) -> &str {
        "rhai"
    }
}
