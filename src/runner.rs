use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, path::Path, process::Stdio, time::Duration};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Exit code reported when the child process could not be launched at all
/// (binary missing, permission denied). Distinguishes launch failures from
/// anything glab itself can return.
pub const LAUNCH_FAILURE_CODE: i32 = -1;

/// Captured result of one glab invocation. Immutable once built.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Parsed JSON payload. Only present when the process succeeded and the
    /// trimmed stdout starts with `{` or `[` and parses cleanly.
    pub structured: Option<Value>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn from_captured(exit_code: i32, stdout: String, stderr: String) -> Self {
        let structured = if exit_code == 0 {
            let trimmed = stdout.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).ok()
            } else {
                None
            }
        } else {
            None
        };
        Self {
            exit_code,
            stdout,
            stderr,
            structured,
        }
    }

    pub fn launch_failure(message: String) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_CODE,
            stdout: String::new(),
            stderr: message,
            structured: None,
        }
    }
}

/// Failures that are not an exit status of the child.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    Timeout { limit: Duration },
    Cancelled,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Timeout { limit } => {
                write!(f, "command timed out after {}s", limit.as_secs())
            }
            RunError::Cancelled => write!(f, "command cancelled"),
        }
    }
}

impl std::error::Error for RunError {}

/// Runs one external command to completion. Concurrency comes from the
/// dispatch layer running independent invocations on their own tasks, not
/// from the runner itself.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        args: &[String],
        cwd: Option<&Path>,
        ct: CancellationToken,
    ) -> Result<RunOutcome, RunError>;
}

/// Spawns the glab binary with array-based exec. Arguments pass through
/// verbatim; the caller is the trust boundary.
pub struct GlabRunner {
    binary: String,
    timeout: Option<Duration>,
    env: Vec<(String, String)>,
}

impl GlabRunner {
    pub fn new(binary: String, timeout: Option<Duration>) -> Self {
        Self {
            binary,
            timeout,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

#[async_trait]
impl Runner for GlabRunner {
    async fn run(
        &self,
        args: &[String],
        cwd: Option<&Path>,
        ct: CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        tracing::info!("Running command: {} {}", self.binary, args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to launch {}: {e}", self.binary);
                return Ok(RunOutcome::launch_failure(format!(
                    "Failed to launch {}: {e}",
                    self.binary
                )));
            }
        };

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        // kill_on_drop reaps the child when the output future is dropped on
        // the timeout and cancellation paths.
        let output = tokio::select! {
            output = child.wait_with_output() => output,
            limit = deadline => {
                tracing::warn!("{} timed out after {}s", self.binary, limit.as_secs());
                return Err(RunError::Timeout { limit });
            }
            _ = ct.cancelled() => {
                tracing::warn!("{} invocation cancelled", self.binary);
                return Err(RunError::Cancelled);
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return Ok(RunOutcome::launch_failure(format!(
                    "Failed to collect output from {}: {e}",
                    self.binary
                )));
            }
        };

        let exit_code = output.status.code().unwrap_or(LAUNCH_FAILURE_CODE);
        Ok(RunOutcome::from_captured(
            exit_code,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }
}
