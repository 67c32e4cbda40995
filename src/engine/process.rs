//! Deadline-bound child process execution
//!
//! Every guest program, build step and container client goes through
//! `run_until`. The child is started as the leader of its own process group so
//! that a timeout can kill everything it spawned, not only the direct child.

use anyhow::{Context, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Bytes kept per output stream by default
pub const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

/// How long pipes may stay open after the child is gone
const PIPE_DRAIN: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8192;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
    /// Bytes kept from each of stdout and stderr; the rest is read and dropped
    pub output_limit: usize,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        Self::new(program).with_args(iter.cloned())
    }
}

/// How the child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by a signal it did not ask for
    Signaled(i32),
    /// Killed by us at the deadline
    TimedOut,
}

/// Captured result of one child process
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutcome {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self.status, ProcessStatus::Exited(0))
    }

    pub fn timed_out(&self) -> bool {
        self.status == ProcessStatus::TimedOut
    }

    /// stdout followed by stderr, truncated to `max_bytes`
    pub fn combined_log(&self, max_bytes: usize) -> String {
        let combined = format!("{}{}", self.stdout, self.stderr);
        truncate_bytes(&combined, max_bytes)
    }
}

/// Truncate to at most `max_bytes` bytes without splitting a character
pub fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Sends SIGKILL to a process group when dropped, unless disarmed
struct GroupKill {
    pgid: Option<Pid>,
}

impl GroupKill {
    fn kill_now(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                debug!("killpg({}) failed: {}", pgid, e);
            }
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.kill_now();
    }
}

/// Run a command until it exits or `deadline` passes, whichever comes first.
///
/// Returns `Err` only when the process could not be started or waited on.
pub async fn run_until(spec: &CommandSpec, deadline: Instant) -> Result<ProcessOutcome> {
    debug!("Running {:?} with args {:?}", spec.program, spec.args);

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(dir) = &spec.work_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to start `{}`", spec.program))?;

    let mut group = GroupKill {
        pgid: child.id().map(|pid| Pid::from_raw(pid as i32)),
    };

    let mut stdout_reader = PipeReader::spawn(child.stdout.take(), spec.output_limit);
    let mut stderr_reader = PipeReader::spawn(child.stderr.take(), spec.output_limit);

    let status = match timeout_at(deadline, child.wait()).await {
        Ok(exit) => {
            let exit = exit.context("Failed to wait for child process")?;
            // Leftover group members would keep the pipes open.
            group.kill_now();
            exit_to_status(exit)
        }
        Err(_) => {
            warn!("Process {:?} exceeded its deadline, killing", spec.program);
            group.kill_now();
            if let Err(e) = child.kill().await {
                debug!("kill after killpg failed: {}", e);
            }
            ProcessStatus::TimedOut
        }
    };
    group.disarm();

    // A process that left the group (new session) can hold the pipes open
    // indefinitely; stop reading shortly after the child is gone.
    let drain_until = Instant::now() + PIPE_DRAIN;
    let stdout = stdout_reader.finish(drain_until).await.context("Failed to read stdout")?;
    let stderr = stderr_reader.finish(drain_until).await.context("Failed to read stderr")?;

    Ok(ProcessOutcome {
        status,
        stdout,
        stderr,
    })
}

/// Background reader for one output pipe.
///
/// Keeps the first `limit` bytes and discards the rest, so the child never
/// blocks on a full pipe and the engine never buffers more than `limit`.
struct PipeReader {
    handle: JoinHandle<std::io::Result<Vec<u8>>>,
    stop: Arc<Notify>,
}

impl PipeReader {
    fn spawn<R>(pipe: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let stopped = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            let mut kept = Vec::new();
            let Some(mut pipe) = pipe else {
                return Ok(kept);
            };
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                let n = tokio::select! {
                    read = pipe.read(&mut chunk) => read?,
                    _ = stopped.notified() => break,
                };
                if n == 0 {
                    break;
                }
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
            Ok(kept)
        });
        Self { handle, stop }
    }

    /// Wait for EOF until `until`, then stop reading and return what was kept
    async fn finish(&mut self, until: Instant) -> Result<String> {
        let joined = match timeout_at(until, &mut self.handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Output pipe still open after the child exited, a detached process may hold it");
                self.stop.notify_one();
                (&mut self.handle).await
            }
        };
        let bytes = joined.context("Output reader panicked")??;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(unix)]
fn exit_to_status(exit: std::process::ExitStatus) -> ProcessStatus {
    use std::os::unix::process::ExitStatusExt;

    match (exit.code(), exit.signal()) {
        (Some(code), _) => ProcessStatus::Exited(code),
        (None, Some(sig)) => ProcessStatus::Signaled(sig),
        (None, None) => ProcessStatus::Exited(-1),
    }
}
