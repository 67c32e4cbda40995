//! Serverless function execution engine
//!
//! Runs user-supplied JavaScript, Python or Go functions against a JSON
//! payload under a deadline, inside a container when a runtime is available
//! and as plain host processes otherwise.

pub mod adapter;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod isolation;
pub mod languages;
pub mod worker;

pub use crate::config::EngineConfig;
pub use crate::core::{ExecutionRequest, ExecutionResult, FailureKind, Function};
pub use crate::engine::Engine;
pub use crate::error::EngineError;
pub use crate::isolation::{IsolationStrategy, RawResult};
