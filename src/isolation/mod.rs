//! Isolation strategies
//!
//! The engine picks one strategy at startup and routes every call through it:
//! - `ContainerStrategy`: runs the guest in a throwaway, network-less,
//!   memory-capped container with the workspace bind-mounted
//! - `NativeStrategy`: runs the interpreter or compiled binary directly on the
//!   host, contained only by its own process group
//!
//! Strategies stop at the raw process outcome. Reading the output file and
//! building the `ExecutionResult` is the engine's job and is identical for
//! both paths.

pub mod container;
pub mod native;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::core::{ExecutionRequest, ExecutionResult, FailureKind};
use crate::engine::process::{run_until, CommandSpec, ProcessOutcome};
use crate::engine::workspace::WorkspaceDir;
use crate::languages::RuntimeCatalog;

pub use container::ContainerStrategy;
pub use native::NativeStrategy;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What a strategy hands back to the engine
#[derive(Debug)]
pub enum RawResult {
    /// The guest ran (or was killed at the deadline)
    Ran(ProcessOutcome),
    /// The call ended before the guest could run
    Rejected {
        kind: FailureKind,
        error: String,
        logs: Option<String>,
    },
}

impl RawResult {
    pub fn rejected(kind: FailureKind, error: impl Into<String>) -> Self {
        RawResult::Rejected {
            kind,
            error: error.into(),
            logs: None,
        }
    }

    /// Engine-side failure, rendered with its full context chain
    pub fn infrastructure(err: &anyhow::Error) -> Self {
        Self::rejected(FailureKind::Infrastructure, format!("{:#}", err))
    }

    /// Process outcome to normalize, or the finished failure
    pub fn into_outcome(self) -> Result<ProcessOutcome, ExecutionResult> {
        match self {
            RawResult::Ran(outcome) => Ok(outcome),
            RawResult::Rejected { kind, error, logs } => {
                Err(ExecutionResult::failed(kind, error, logs))
            }
        }
    }
}

/// One way of running a prepared call
#[async_trait]
pub trait IsolationStrategy: Send + Sync {
    /// Short name for logs ("container", "native")
    fn name(&self) -> &'static str;

    /// Write the guest's files into `dir` and run it until it exits or
    /// `deadline` passes. Must not leave processes or containers behind.
    async fn run(&self, dir: &WorkspaceDir, request: &ExecutionRequest, deadline: Instant)
        -> RawResult;
}

/// Probe the container runtime once and pick the strategy for this engine
pub async fn select_strategy(
    config: &EngineConfig,
    catalog: Arc<RuntimeCatalog>,
) -> Arc<dyn IsolationStrategy> {
    if runtime_available(&config.container_runtime).await {
        info!(
            "Container runtime `{}` available, functions run in containers",
            config.container_runtime
        );
        Arc::new(ContainerStrategy::new(config, catalog))
    } else {
        warn!(
            "Container runtime `{}` not available, functions run directly on the host with no sandbox beyond process isolation",
            config.container_runtime
        );
        Arc::new(NativeStrategy::new(config, catalog))
    }
}

/// Lightweight `<runtime> --version` probe
pub async fn runtime_available(runtime: &str) -> bool {
    let spec = CommandSpec::new(runtime).with_args(["--version"]);
    match run_until(&spec, Instant::now() + PROBE_TIMEOUT).await {
        Ok(outcome) => outcome.is_success(),
        Err(_) => false,
    }
}
