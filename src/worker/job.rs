//! Queue payloads: the job popped from Redis and the record published back

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{ExecutionRequest, ExecutionResult, Function};
use crate::error::EngineError;

/// Job received from the Redis queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionJob {
    pub execution_id: String,
    pub function_id: String,
    pub function: Function,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

impl FunctionJob {
    pub fn to_request(&self) -> ExecutionRequest {
        ExecutionRequest::new(self.function.clone())
            .with_data(self.data.clone())
            .with_headers(self.headers.clone())
            .with_method(self.method.clone())
            .with_path(self.path.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
}

/// Audit row for one execution, stored and published by the worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub function_id: String,
    pub status: ExecutionStatus,
    pub status_code: u16,
    /// Milliseconds
    pub execution_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    pub method: String,
    pub path: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn from_result(
        job: &FunctionJob,
        result: &ExecutionResult,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let status = if result.success {
            ExecutionStatus::Success
        } else if result.is_timeout() {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::Error
        };

        Self {
            execution_id: job.execution_id.clone(),
            function_id: job.function_id.clone(),
            status,
            status_code: result.status_code,
            execution_time: result.execution_time,
            response_data: result.response.clone(),
            error_message: result.error.clone(),
            logs: result.logs.clone(),
            method: job.method.clone(),
            path: job.path.clone(),
            started_at,
            completed_at,
        }
    }

    /// Record for a job the engine itself failed on
    pub fn engine_failure(
        job: &FunctionJob,
        error: &EngineError,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let elapsed = (completed_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            execution_id: job.execution_id.clone(),
            function_id: job.function_id.clone(),
            status: ExecutionStatus::Error,
            status_code: 500,
            execution_time: elapsed,
            response_data: None,
            error_message: Some(error.to_string()),
            logs: None,
            method: job.method.clone(),
            path: job.path.clone(),
            started_at,
            completed_at,
        }
    }
}
