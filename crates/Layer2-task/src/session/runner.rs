//! Remote command executor
//!
//! `CommandRunner` executes one shell command string with an explicit
//! timeout. `ShellRunner` spawns `sh -c <cmd>` on the local host; when the
//! daemon runs on the target host this is all the "remote" transport needed.

use async_trait::async_trait;
use fleet_foundation::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Trait for executing shell command strings
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;
}

/// Production runner that spawns `sh -c <cmd>`
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!("exec: {}", command);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Session(format!("Failed to execute `{}`: {}", command, e)))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "`{}` did not finish within {:.1}s",
                    command,
                    timeout.as_secs_f64()
                ))
            })??;

        Ok(CommandOutput {
            exit_status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
