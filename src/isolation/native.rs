//! Direct host execution
//!
//! No sandbox beyond a dedicated process group: the guest runs with the
//! engine's own user, filesystem view and network access.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

use super::{IsolationStrategy, RawResult};
use crate::adapter::{self, AdapterRun};
use crate::config::EngineConfig;
use crate::core::{ExecutionRequest, FailureKind};
use crate::engine::process::{truncate_bytes, ProcessOutcome};
use crate::engine::workspace::WorkspaceDir;
use crate::languages::RuntimeCatalog;

/// Upper bound on compiler output quoted in the error message
const BUILD_ERROR_BYTES: usize = 2048;

pub struct NativeStrategy {
    catalog: Arc<RuntimeCatalog>,
    max_log: usize,
}

impl NativeStrategy {
    pub fn new(config: &EngineConfig, catalog: Arc<RuntimeCatalog>) -> Self {
        Self {
            catalog,
            max_log: config.max_log_bytes,
        }
    }
}

#[async_trait]
impl IsolationStrategy for NativeStrategy {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn run(
        &self,
        dir: &WorkspaceDir,
        request: &ExecutionRequest,
        deadline: Instant,
    ) -> RawResult {
        let language = &request.function.language;
        let Some(config) = self.catalog.language(language) else {
            return RawResult::rejected(
                FailureKind::Validation,
                format!("unsupported language: {}", language),
            );
        };

        if let Err(e) = adapter::prepare(dir, config, request).await {
            return RawResult::infrastructure(&e);
        }

        match adapter::run_native(dir, config, deadline, self.max_log).await {
            Ok(AdapterRun::Finished(outcome)) => RawResult::Ran(outcome),
            Ok(AdapterRun::BuildFailed(build)) => build_failure(&build, self.max_log),
            Err(e) => RawResult::infrastructure(&e),
        }
    }
}

fn build_failure(build: &ProcessOutcome, max_log: usize) -> RawResult {
    let detail = match build.stderr.trim() {
        "" => build.stdout.trim(),
        stderr => stderr,
    };
    let error = if detail.is_empty() {
        format!("build failed: exit status {:?}", build.status)
    } else {
        format!("build failed: {}", truncate_bytes(detail, BUILD_ERROR_BYTES))
    };

    let logs = build.combined_log(max_log);
    RawResult::Rejected {
        kind: FailureKind::Build,
        error,
        logs: Some(logs).filter(|l| !l.is_empty()),
    }
}
