//! Command execution seam and its process-backed implementation.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use shipit_core::{CollaboratorError, CollaboratorResult};

use crate::command::CommandSpec;

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands on behalf of the adapters.
///
/// `execute` returns `Ok` for any command that ran to completion, whatever
/// its exit code; launch failures and timeouts are errors.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &CommandSpec) -> CollaboratorResult<CommandOutput>;
}

/// Execute `spec` and turn a non-zero exit into [`CollaboratorError::CommandFailed`].
pub async fn run_checked(
    executor: &dyn CommandExecutor,
    spec: &CommandSpec,
) -> CollaboratorResult<CommandOutput> {
    let output = executor.execute(spec).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(CollaboratorError::CommandFailed {
            command: spec.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    default_timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: &CommandSpec) -> CollaboratorResult<CommandOutput> {
        let start = Instant::now();
        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        debug!(command = %spec, timeout_secs = timeout.as_secs(), "spawning");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a terminal Ctrl-C reaches shipit only and
        // in-flight commands run to completion.
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| CollaboratorError::Spawn {
                program: spec.program.clone(),
                reason: e.to_string(),
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorError::Timeout {
                command: spec.to_string(),
                timeout,
            })?
            .map_err(|e| CollaboratorError::Spawn {
                program: spec.program.clone(),
                reason: e.to_string(),
            })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(command = %spec, exit_code, duration_ms, "finished");

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        })
    }
}
