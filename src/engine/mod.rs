//! Execution coordinator
//!
//! `Engine::execute` owns one call end to end: it derives the deadline,
//! allocates the workspace, hands both to the isolation strategy chosen at
//! startup, normalizes what comes back and stamps the elapsed time.

pub mod codec;
pub mod process;
pub mod workspace;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::core::{ExecutionRequest, ExecutionResult, FailureKind, Function};
use crate::error::EngineError;
use crate::isolation::{self, IsolationStrategy};
use crate::languages::RuntimeCatalog;
use workspace::Workspace;

/// Extra time a strategy gets past the deadline before the engine gives up on it
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Engine {
    config: EngineConfig,
    strategy: Arc<dyn IsolationStrategy>,
}

impl Engine {
    /// Validate the configuration, load the runtime catalog and probe for a
    /// container runtime
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        prepare(&config)?;
        let catalog = Arc::new(RuntimeCatalog::builtin()?);
        debug!("Supported languages: {}", catalog.supported_languages().join(", "));
        let strategy = isolation::select_strategy(&config, catalog).await;
        Ok(Self { config, strategy })
    }

    /// Engine with a fixed strategy, skipping the runtime probe
    pub fn with_strategy(
        config: EngineConfig,
        strategy: Arc<dyn IsolationStrategy>,
    ) -> Result<Self, EngineError> {
        prepare(&config)?;
        Ok(Self { config, strategy })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Run one call to completion.
    ///
    /// Guest failures of every kind come back as `Ok` with `success == false`;
    /// `Err` is reserved for faults of the engine itself.
    pub async fn execute(
        &self,
        deadline: Instant,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let deadline = self.call_deadline(started, deadline, &request.function);
        let language = request.function.language.clone();

        let workspace = match Workspace::create(&self.config.workspace_root) {
            Ok(ws) => ws,
            Err(e) => {
                warn!(
                    "Failed to create workspace under {}: {}",
                    self.config.workspace_root.display(),
                    e
                );
                let result = ExecutionResult::failed(
                    FailureKind::Infrastructure,
                    format!("Failed to create workspace: {}", e),
                    None,
                )
                .with_execution_time(elapsed_ms(started));
                return Ok(result);
            }
        };

        let dir = workspace.dir();
        let strategy = Arc::clone(&self.strategy);
        let mut task = AbortOnDrop(tokio::spawn(async move {
            strategy.run(&dir, &request, deadline).await
        }));

        let result = match timeout_at(deadline + DEADLINE_GRACE, &mut task.0).await {
            Ok(Ok(raw)) => match raw.into_outcome() {
                Ok(outcome) => {
                    codec::collect(&workspace.dir(), &outcome, self.config.max_log_bytes).await
                }
                Err(result) => result,
            },
            Ok(Err(e)) => {
                return Err(EngineError::Internal(format!(
                    "isolation task for {} failed: {}",
                    workspace.id(),
                    e
                )));
            }
            Err(_) => {
                warn!(
                    "{} strategy overran its deadline for {}, aborting",
                    self.strategy.name(),
                    workspace.id()
                );
                task.0.abort();
                let _ = (&mut task.0).await;
                ExecutionResult::timed_out(None)
            }
        };
        drop(workspace);

        let result = result.with_execution_time(elapsed_ms(started));
        info!(
            "Executed {} function: strategy={}, status={}, success={}, time={}ms",
            language,
            self.strategy.name(),
            result.status_code,
            result.success,
            result.execution_time
        );
        Ok(result)
    }

    /// Earliest of the caller's deadline, the engine timeout and the
    /// function's own timeout
    fn call_deadline(&self, now: Instant, caller: Instant, function: &Function) -> Instant {
        let mut limit = self.config.timeout;
        if let Some(secs) = function.timeout.filter(|s| *s > 0) {
            limit = limit.min(Duration::from_secs(secs));
        }
        now.checked_add(limit).map_or(caller, |end| caller.min(end))
    }
}

fn prepare(config: &EngineConfig) -> Result<(), EngineError> {
    config.validate()?;
    std::fs::create_dir_all(&config.workspace_root).map_err(|source| {
        EngineError::WorkspaceRoot {
            path: config.workspace_root.display().to_string(),
            source,
        }
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
