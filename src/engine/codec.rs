//! Guest input/output files and result normalization
//!
//! The guest reads `input.json` (`{data, headers, method, path}`) from its
//! working directory and writes `output.json` as either
//! `{"success": true, "data": ...}` or `{"success": false, "error": "..."}`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::process::{truncate_bytes, ProcessOutcome};
use super::workspace::WorkspaceDir;
use crate::core::result::GENERIC_FAILURE_MESSAGE;
use crate::core::{ExecutionRequest, ExecutionResult, FailureKind};

pub const INPUT_FILE: &str = "input.json";
pub const OUTPUT_FILE: &str = "output.json";

/// Call context handed to the guest
#[derive(Debug, Serialize)]
pub struct GuestInput<'a> {
    pub data: &'a Map<String, Value>,
    pub headers: &'a Map<String, Value>,
    pub method: &'a str,
    pub path: &'a str,
}

impl<'a> From<&'a ExecutionRequest> for GuestInput<'a> {
    fn from(request: &'a ExecutionRequest) -> Self {
        Self {
            data: &request.data,
            headers: &request.headers,
            method: &request.method,
            path: &request.path,
        }
    }
}

/// Structured result written by the harness
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuestOutput {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
}

pub fn encode_input(request: &ExecutionRequest) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&GuestInput::from(request))
}

pub async fn write_input(dir: &WorkspaceDir, request: &ExecutionRequest) -> Result<()> {
    let bytes = encode_input(request).context("Failed to encode input")?;
    tokio::fs::write(dir.input_path(), bytes)
        .await
        .context("Failed to write input file")
}

/// Parse an output document; anything without a boolean `success` is rejected
pub fn decode_output(bytes: &[u8]) -> Option<GuestOutput> {
    serde_json::from_slice(bytes).ok()
}

pub async fn read_output(dir: &WorkspaceDir) -> Option<GuestOutput> {
    match tokio::fs::read(dir.output_path()).await {
        Ok(bytes) => {
            let output = decode_output(&bytes);
            if output.is_none() {
                debug!("Output file in {} is not a result document", dir.id());
            }
            output
        }
        Err(e) => {
            debug!("No output file in {}: {}", dir.id(), e);
            None
        }
    }
}

/// Read the guest's output (unless it was killed) and normalize the run
pub async fn collect(dir: &WorkspaceDir, outcome: &ProcessOutcome, max_log: usize) -> ExecutionResult {
    let output = if outcome.timed_out() {
        None
    } else {
        read_output(dir).await
    };
    normalize(outcome, output, max_log)
}

/// Map a finished process and its optional output document to a result
pub fn normalize(
    outcome: &ProcessOutcome,
    output: Option<GuestOutput>,
    max_log: usize,
) -> ExecutionResult {
    let logs = Some(outcome.combined_log(max_log)).filter(|l| !l.is_empty());

    if outcome.timed_out() {
        return ExecutionResult::timed_out(logs);
    }

    match output {
        Some(GuestOutput {
            success: true,
            data,
            ..
        }) => ExecutionResult::succeeded(data, logs),
        Some(GuestOutput {
            success: false,
            error,
            ..
        }) => {
            let error = error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());
            ExecutionResult::failed(FailureKind::Runtime, error, logs)
        }
        None if outcome.is_success() => ExecutionResult::succeeded(
            json!({ "output": truncate_bytes(&outcome.stdout, max_log) }),
            logs,
        ),
        None => ExecutionResult::failed(FailureKind::Runtime, GENERIC_FAILURE_MESSAGE, logs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Function;
    use crate::engine::process::ProcessStatus;

    fn outcome(status: ProcessStatus, stdout: &str, stderr: &str) -> ProcessOutcome {
        ProcessOutcome {
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_encode_input_shape() {
        let mut data = Map::new();
        data.insert("x".into(), json!(21));
        let request = ExecutionRequest::new(Function::new("python", "python3.9", "", "handler"))
            .with_data(data)
            .with_method("GET")
            .with_path("/double");

        let encoded: Value = serde_json::from_slice(&encode_input(&request).unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({"data": {"x": 21}, "headers": {}, "method": "GET", "path": "/double"})
        );
    }

    #[test]
    fn test_decode_output_requires_success_flag() {
        assert_eq!(
            decode_output(br#"{"success":true,"data":[1,2]}"#),
            Some(GuestOutput {
                success: true,
                data: json!([1, 2]),
                error: None
            })
        );
        assert_eq!(decode_output(br#"{"result":1}"#), None);
        assert_eq!(decode_output(br#"{"success":tr"#), None);
    }

    #[test]
    fn test_structured_success() {
        let out = decode_output(br#"{"success":true,"data":{"doubled":42}}"#);
        let r = normalize(&outcome(ProcessStatus::Exited(0), "ok\n", ""), out, 1024);
        assert!(r.success);
        assert_eq!(r.status_code, 200);
        assert_eq!(r.response, Some(json!({"doubled": 42})));
        assert_eq!(r.logs.as_deref(), Some("ok\n"));
    }

    #[test]
    fn test_structured_failure() {
        let out = decode_output(br#"{"success":false,"error":"boom"}"#);
        let r = normalize(&outcome(ProcessStatus::Exited(1), "", "trace\n"), out, 1024);
        assert!(!r.success);
        assert_eq!(r.status_code, 500);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert_eq!(r.failure, Some(FailureKind::Runtime));
        assert_eq!(r.logs.as_deref(), Some("trace\n"));
    }

    #[test]
    fn test_stdout_fallback_on_clean_exit() {
        let r = normalize(&outcome(ProcessStatus::Exited(0), "hello\n", ""), None, 1024);
        assert!(r.success);
        assert_eq!(r.response, Some(json!({"output": "hello\n"})));
    }

    #[test]
    fn test_crash_without_output() {
        let r = normalize(
            &outcome(ProcessStatus::Signaled(11), "partial", "segfault"),
            None,
            1024,
        );
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
        assert_eq!(r.logs.as_deref(), Some("partialsegfault"));
    }

    #[test]
    fn test_timeout_ignores_output() {
        let out = decode_output(br#"{"success":true,"data":1}"#);
        let r = normalize(&outcome(ProcessStatus::TimedOut, "", ""), out, 1024);
        assert!(r.is_timeout());
        assert!(r.response.is_none());
        assert!(r.logs.is_none());
    }

    #[test]
    fn test_logs_are_truncated() {
        let r = normalize(&outcome(ProcessStatus::Exited(2), "abcdef", "gh"), None, 4);
        assert_eq!(r.logs.as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_collect_skips_output_after_timeout() {
        let root = tempfile::tempdir().unwrap();
        let ws = crate::engine::workspace::Workspace::create(root.path()).unwrap();
        let dir = ws.dir();
        tokio::fs::write(dir.output_path(), br#"{"success":true,"data":"half"}"#)
            .await
            .unwrap();

        let killed = collect(&dir, &outcome(ProcessStatus::TimedOut, "", ""), 1024).await;
        assert!(killed.is_timeout());

        let finished = collect(&dir, &outcome(ProcessStatus::Exited(0), "", ""), 1024).await;
        assert_eq!(finished.response, Some(json!("half")));
    }
}
