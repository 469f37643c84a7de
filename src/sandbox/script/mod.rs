//! Rhai-backed sandbox

mod executor;

pub use executor::ScriptSandbox;
