//! Container execution through the runtime's CLI
//!
//! Each call gets its own `--rm` container named after its workspace, so a
//! timed-out or abandoned call can be killed by name.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{IsolationStrategy, RawResult};
use crate::adapter;
use crate::config::EngineConfig;
use crate::core::{ExecutionRequest, FailureKind};
use crate::engine::codec;
use crate::engine::process::{run_until, CommandSpec};
use crate::engine::workspace::WorkspaceDir;
use crate::languages::{unsupported_language_command, RuntimeCatalog};

/// Mount point of the workspace inside the container
pub const CONTAINER_WORKDIR: &str = "/workspace";

const CONTAINER_PREFIX: &str = "fn-";
const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed parts of every `run` invocation
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    pub runtime: String,
    pub memory_mb: u64,
    pub user: String,
}

pub struct ContainerStrategy {
    catalog: Arc<RuntimeCatalog>,
    settings: ContainerSettings,
    max_log: usize,
}

impl ContainerStrategy {
    pub fn new(config: &EngineConfig, catalog: Arc<RuntimeCatalog>) -> Self {
        Self {
            catalog,
            settings: ContainerSettings {
                runtime: config.container_runtime.clone(),
                memory_mb: config.memory_mb(),
                user: config.container_user.clone(),
            },
            max_log: config.max_log_bytes,
        }
    }

    /// Guest entry command; writes the harness when the language has one
    async fn prepare(
        &self,
        dir: &WorkspaceDir,
        request: &ExecutionRequest,
    ) -> anyhow::Result<Vec<String>> {
        let language = &request.function.language;
        match self.catalog.language(language) {
            Some(config) => {
                adapter::prepare(dir, config, request).await?;
                Ok(config.container_command())
            }
            None => {
                debug!("No harness for language {}, using diagnostic command", language);
                codec::write_input(dir, request).await?;
                Ok(unsupported_language_command(language))
            }
        }
    }

    async fn kill(&self, name: &str) {
        let spec = CommandSpec::new(&self.settings.runtime).with_args(["kill", name]);
        match run_until(&spec, Instant::now() + KILL_TIMEOUT).await {
            Ok(outcome) if outcome.is_success() => debug!("Killed container {}", name),
            Ok(outcome) => debug!("Container {} not killed: {}", name, outcome.stderr.trim()),
            Err(e) => warn!("Failed to kill container {}: {:#}", name, e),
        }
    }
}

#[async_trait]
impl IsolationStrategy for ContainerStrategy {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn run(
        &self,
        dir: &WorkspaceDir,
        request: &ExecutionRequest,
        deadline: Instant,
    ) -> RawResult {
        let runtime_tag = &request.function.runtime;
        let Some(image) = self.catalog.image(runtime_tag) else {
            return RawResult::rejected(
                FailureKind::Validation,
                format!("unsupported runtime: {}", runtime_tag),
            );
        };

        let command = match self.prepare(dir, request).await {
            Ok(command) => command,
            Err(e) => return RawResult::infrastructure(&e),
        };
        if let Err(e) = dir.open_to_container_user().await {
            return RawResult::infrastructure(
                &anyhow::Error::new(e).context("Failed to open workspace to container user"),
            );
        }

        let name = container_name(dir);
        let args = container_args(&self.settings, dir.path(), &name, image, &command);
        let spec = CommandSpec::new(&self.settings.runtime)
            .with_args(args)
            .with_output_limit(self.max_log);

        let mut guard = ContainerGuard::new(&self.settings.runtime, &name);
        let outcome = run_until(&spec, deadline).await;
        match outcome {
            Ok(outcome) => {
                if outcome.timed_out() {
                    warn!("Container {} exceeded its deadline, killing", name);
                    self.kill(&name).await;
                }
                guard.disarm();
                RawResult::Ran(outcome)
            }
            Err(e) => {
                guard.disarm();
                RawResult::infrastructure(&e)
            }
        }
    }
}

pub fn container_name(dir: &WorkspaceDir) -> String {
    format!("{}{}", CONTAINER_PREFIX, dir.id())
}

/// Arguments after the runtime binary for one `run`
pub fn container_args(
    settings: &ContainerSettings,
    workspace: &Path,
    name: &str,
    image: &str,
    command: &[String],
) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        name.to_string(),
        "-v".to_string(),
        format!("{}:{}", workspace.display(), CONTAINER_WORKDIR),
        "-w".to_string(),
        CONTAINER_WORKDIR.to_string(),
        "--memory".to_string(),
        format!("{}m", settings.memory_mb),
        "--network".to_string(),
        "none".to_string(),
        "--user".to_string(),
        settings.user.clone(),
        // Unprivileged users have no writable home in the base images
        "--env".to_string(),
        "HOME=/tmp".to_string(),
        image.to_string(),
    ];
    args.extend(command.iter().cloned());
    args
}

/// Kills the named container if the call is dropped mid-run
struct ContainerGuard {
    runtime: String,
    name: Option<String>,
}

impl ContainerGuard {
    fn new(runtime: &str, name: &str) -> Self {
        Self {
            runtime: runtime.to_string(),
            name: Some(name.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.name = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        warn!("Call abandoned while container {} was running, killing", name);
        let spawned = std::process::Command::new(&self.runtime)
            .args(["kill", &name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => warn!("Failed to kill container {}: {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Function;
    use crate::engine::workspace::Workspace;

    fn settings() -> ContainerSettings {
        ContainerSettings {
            runtime: "docker".to_string(),
            memory_mb: 128,
            user: "1000:1000".to_string(),
        }
    }

    #[test]
    fn test_container_args() {
        let args = container_args(
            &settings(),
            Path::new("/tmp/ws/exec-abc"),
            "fn-exec-abc",
            "node:18-alpine",
            &["node".to_string(), "function.js".to_string()],
        );
        assert_eq!(
            args.join(" "),
            "run --rm --name fn-exec-abc -v /tmp/ws/exec-abc:/workspace -w /workspace \
             --memory 128m --network none --user 1000:1000 --env HOME=/tmp \
             node:18-alpine node function.js"
        );
    }

    #[test]
    fn test_container_name_follows_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        assert_eq!(container_name(&ws.dir()), format!("fn-{}", ws.id()));
    }

    #[tokio::test]
    async fn test_unknown_runtime_is_rejected_before_launch() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        // A runtime binary that cannot exist proves nothing was spawned
        let config = EngineConfig::default().with_container_runtime("no-such-container-runtime-xyz");
        let strategy = ContainerStrategy::new(&config, Arc::new(RuntimeCatalog::builtin().unwrap()));
        let request = ExecutionRequest::new(Function::new("python", "python2.7", "", "handler"));

        let raw = strategy
            .run(&ws.dir(), &request, Instant::now() + Duration::from_secs(5))
            .await;
        match raw {
            RawResult::Rejected { kind, error, .. } => {
                assert_eq!(kind, FailureKind::Validation);
                assert_eq!(error, "unsupported runtime: python2.7");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(std::fs::read_dir(ws.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_language_gets_diagnostic_command() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let config = EngineConfig::default();
        let strategy = ContainerStrategy::new(&config, Arc::new(RuntimeCatalog::builtin().unwrap()));
        let request = ExecutionRequest::new(Function::new("cobol", "nodejs18", "", "handler"));

        let command = strategy.prepare(&ws.dir(), &request).await.unwrap();
        assert_eq!(command, unsupported_language_command("cobol"));
        assert!(ws.dir().input_path().exists());
    }

    #[tokio::test]
    async fn test_missing_runtime_binary_is_infrastructure_failure() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let config = EngineConfig::default().with_container_runtime("no-such-container-runtime-xyz");
        let strategy = ContainerStrategy::new(&config, Arc::new(RuntimeCatalog::builtin().unwrap()));
        let request = ExecutionRequest::new(Function::new(
            "javascript",
            "nodejs18",
            "function handler() { return 1; }",
            "handler",
        ));

        match strategy
            .run(&ws.dir(), &request, Instant::now() + Duration::from_secs(5))
            .await
        {
            RawResult::Rejected { kind, error, .. } => {
                assert_eq!(kind, FailureKind::Infrastructure);
                assert!(error.contains("no-such-container-runtime-xyz"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
