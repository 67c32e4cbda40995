//! Core value types shared by the engine and its callers.

pub mod function;
pub mod result;

pub use function::{ExecutionRequest, Function};
pub use result::{ExecutionResult, FailureKind};
