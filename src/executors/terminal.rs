//! TERMINAL executor — bounded child-process execution.
//!
//! Spawns the validated verb and argument vector directly. The command
//! line is never re-assembled into a string for a shell, so the
//! metacharacters the policy rejected cannot come back through a second
//! interpretation layer. The child runs with a hard time budget and
//! `kill_on_drop`, so a timeout or a cancelled turn never leaves an
//! orphaned process behind.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ExecutorError;
use crate::policy::{CanonicalArg, ShellCommand, ValidatedDirective};

use super::{wrong_argument, Executor};

/// Runs policy-checked shell commands as argument vectors.
#[derive(Debug, Clone)]
pub struct TerminalExecutor {
    /// Seconds before the child is killed.
    timeout_secs: u64,
    /// Working directory for spawned commands.
    working_dir: PathBuf,
}

impl TerminalExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            working_dir: home_dir(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    async fn run(&self, cmd: &ShellCommand) -> Result<String, ExecutorError> {
        log::info!("terminal executing: {}", cmd.to_command_line());

        let child = Command::new(&cmd.verb)
            .args(&cmd.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the wait future on timeout drops the child handle, and
        // kill_on_drop takes the process down with it.
        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ExecutorError::Timeout(self.timeout_secs))??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            let mut message = if stdout.is_empty() {
                "Command executed successfully (no output)".to_string()
            } else {
                format!("Output:\n{stdout}")
            };
            if !stderr.is_empty() {
                message.push_str(&format!("\nWarnings: {stderr}"));
            }
            Ok(message)
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let mut message = format!("Command failed (exit code {code})");
            if !stderr.is_empty() {
                message.push_str(&format!("\nError: {stderr}"));
            }
            if !stdout.is_empty() {
                message.push_str(&format!("\nOutput: {stdout}"));
            }
            Err(ExecutorError::Failed(message))
        }
    }
}

#[async_trait]
impl Executor for TerminalExecutor {
    fn name(&self) -> &'static str {
        "terminal"
    }

    async fn execute(&self, directive: &ValidatedDirective) -> Result<String, ExecutorError> {
        match directive.arg() {
            CanonicalArg::Shell(cmd) => self.run(cmd).await,
            _ => Err(wrong_argument(self.name())),
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}
