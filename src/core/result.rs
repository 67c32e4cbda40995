use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error text of a call killed at its deadline
pub const TIMEOUT_MESSAGE: &str = "execution timed out";

/// Generic error for a guest that failed without structured output
pub const GENERIC_FAILURE_MESSAGE: &str = "Function execution failed";

/// Why an execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unsupported language or runtime tag; nothing was spawned
    Validation,
    /// Workspace, file or spawn failure on the engine side
    Infrastructure,
    /// Compiled-language build step failed
    Build,
    /// Guest exited non-zero, threw, or had no handler
    Runtime,
    /// Killed at the deadline
    Timeout,
}

impl FailureKind {
    /// HTTP-style status the platform mirrors back to its caller
    pub fn status_code(self) -> u16 {
        match self {
            FailureKind::Validation => 400,
            _ => 500,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Validation => "validation",
            FailureKind::Infrastructure => "infrastructure",
            FailureKind::Build => "build",
            FailureKind::Runtime => "runtime",
            FailureKind::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Normalized outcome of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Wall-clock time of the call in milliseconds
    pub execution_time: u64,
    /// Combined stdout and stderr of the guest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    pub status_code: u16,
}

impl ExecutionResult {
    pub fn succeeded(response: Value, logs: Option<String>) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            failure: None,
            execution_time: 0,
            logs,
            status_code: 200,
        }
    }

    pub fn failed(kind: FailureKind, error: impl Into<String>, logs: Option<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
            failure: Some(kind),
            execution_time: 0,
            logs,
            status_code: kind.status_code(),
        }
    }

    pub fn timed_out(logs: Option<String>) -> Self {
        Self::failed(FailureKind::Timeout, TIMEOUT_MESSAGE, logs)
    }

    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.execution_time = millis;
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_follows_failure_kind() {
        let r = ExecutionResult::failed(FailureKind::Validation, "unsupported language: cobol", None);
        assert_eq!(r.status_code, 400);
        assert!(!r.success);
        assert!(r.response.is_none());

        let r = ExecutionResult::failed(FailureKind::Build, "build failed: x", None);
        assert_eq!(r.status_code, 500);
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let r = ExecutionResult::timed_out(Some("partial".into()));
        assert!(r.is_timeout());
        assert_eq!(r.error.as_deref(), Some(TIMEOUT_MESSAGE));

        let crash = ExecutionResult::failed(FailureKind::Runtime, GENERIC_FAILURE_MESSAGE, None);
        assert!(!crash.is_timeout());
        assert_eq!(crash.status_code, r.status_code);
    }

    #[test]
    fn test_serialized_shape() {
        let r = ExecutionResult::succeeded(json!({"doubled": 42}), None).with_execution_time(12);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(
            v,
            json!({
                "success": true,
                "response": {"doubled": 42},
                "execution_time": 12,
                "status_code": 200
            })
        );
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
        assert_eq!(FailureKind::Infrastructure.to_string(), "infrastructure");
    }
}
