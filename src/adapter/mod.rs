//! Language adapters
//!
//! An adapter turns a `Function` into a runnable program inside a workspace:
//! it renders the harness source file, writes the call input next to it and,
//! on the native path, drives the optional build step and the run.

pub mod go;
pub mod javascript;
pub mod python;
pub mod template;

use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::Instant;

use crate::core::ExecutionRequest;
use crate::engine::codec;
use crate::engine::process::{run_until, CommandSpec, ProcessOutcome};
use crate::engine::workspace::WorkspaceDir;
use crate::languages::{Language, LanguageConfig};

pub use template::TemplateError;

/// Result of running a prepared workspace on the host
#[derive(Debug)]
pub enum AdapterRun {
    /// The program ran (or was killed at the deadline)
    Finished(ProcessOutcome),
    /// The build step exited non-zero; nothing was run
    BuildFailed(ProcessOutcome),
}

/// Render the harness for `config`'s language around the function's code
pub fn render_harness(
    config: &LanguageConfig,
    request: &ExecutionRequest,
) -> Result<String, TemplateError> {
    match config.language {
        Language::JavaScript => javascript::render(&request.function),
        Language::Python => python::render(&request.function),
        Language::Go => go::render(&request.function),
    }
}

/// Write the harness source file and `input.json` into the workspace
pub async fn prepare(
    dir: &WorkspaceDir,
    config: &LanguageConfig,
    request: &ExecutionRequest,
) -> Result<()> {
    let harness = render_harness(config, request)
        .with_context(|| format!("Failed to render {} harness", config.language))?;
    tokio::fs::write(dir.file(&config.source_file), harness)
        .await
        .with_context(|| format!("Failed to write {}", config.source_file))?;
    codec::write_input(dir, request).await
}

/// Build (when the language needs it) and run the harness on the host.
///
/// Each step keeps at most `output_limit` bytes of stdout and of stderr.
pub async fn run_native(
    dir: &WorkspaceDir,
    config: &LanguageConfig,
    deadline: Instant,
    output_limit: usize,
) -> Result<AdapterRun> {
    if let Some(compile) = &config.compile_command {
        let build = command_in(dir.path(), compile).with_output_limit(output_limit);
        let build = run_until(&build, deadline)
            .await
            .context("Failed to start build")?;
        if build.timed_out() {
            return Ok(AdapterRun::Finished(build));
        }
        if !build.is_success() {
            return Ok(AdapterRun::BuildFailed(build));
        }
    }

    let run = command_in(dir.path(), &config.run_command).with_output_limit(output_limit);
    let run = run_until(&run, deadline)
        .await
        .context("Failed to start function")?;
    Ok(AdapterRun::Finished(run))
}

/// Command running in `dir`; `./program` is resolved against `dir`
fn command_in(dir: &Path, argv: &[String]) -> CommandSpec {
    let mut spec = CommandSpec::from_vec(argv).with_work_dir(dir);
    if let Some(local) = spec.program.strip_prefix("./") {
        spec.program = dir.join(local).to_string_lossy().into_owned();
    }
    spec
}
