//! tmux session backend
//!
//! Every operation is one tmux invocation issued through a `CommandRunner`
//! with the configured command timeout. Targets use the `=name` form so
//! `ai-task-1` never matches `ai-task-10` by prefix.

use super::runner::{CommandOutput, CommandRunner};
use super::{shell_quote as quote, SessionProvider};
use async_trait::async_trait;
use fleet_foundation::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Command builder
// ============================================================================

/// Builds tmux command lines
pub struct TmuxCommand;

impl TmuxCommand {
    pub fn new_session(name: &str, working_dir: &Path) -> Result<String> {
        Ok(format!(
            "tmux new-session -d -s {} -c {}",
            quote(name)?,
            quote(&working_dir.to_string_lossy())?
        ))
    }

    /// Literal text, then a separate Enter keypress
    pub fn send_line(name: &str, text: &str) -> Result<String> {
        let target = quote(&format!("={}:", name))?;
        Ok(format!(
            "tmux send-keys -t {target} -l {} && tmux send-keys -t {target} Enter",
            quote(text)?
        ))
    }

    pub fn has_session(name: &str) -> Result<String> {
        Ok(format!("tmux has-session -t {}", quote(&format!("={}", name))?))
    }

    pub fn kill_session(name: &str) -> Result<String> {
        Ok(format!("tmux kill-session -t {}", quote(&format!("={}", name))?))
    }

    pub fn list_sessions() -> String {
        "tmux list-sessions -F '#{session_name}'".to_string()
    }
}

// ============================================================================
// Provider
// ============================================================================

pub struct TmuxSessions {
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
}

impl TmuxSessions {
    pub fn new(runner: Arc<dyn CommandRunner>, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_timeout,
        }
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.runner.execute(command, self.command_timeout).await
    }

    fn check(output: CommandOutput, action: &str, name: &str) -> Result<()> {
        if output.success() {
            Ok(())
        } else {
            Err(Error::Session(format!(
                "tmux {} '{}' failed (status {:?}): {}",
                action,
                name,
                output.exit_status,
                output.stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl SessionProvider for TmuxSessions {
    async fn create(&self, name: &str, working_dir: &Path) -> Result<()> {
        let output = self.run(&TmuxCommand::new_session(name, working_dir)?).await?;
        Self::check(output, "new-session", name)?;
        debug!("Created session {} in {}", name, working_dir.display());
        Ok(())
    }

    async fn send_input(&self, name: &str, text: &str) -> Result<()> {
        let output = self.run(&TmuxCommand::send_line(name, text)?).await?;
        Self::check(output, "send-keys", name)
    }

    async fn has_session(&self, name: &str) -> Result<bool> {
        let output = self.run(&TmuxCommand::has_session(name)?).await?;
        Ok(output.success())
    }

    async fn kill(&self, name: &str) -> Result<()> {
        let output = self.run(&TmuxCommand::kill_session(name)?).await?;
        if !output.success() {
            // 이미 종료된 세션
            debug!("kill-session {}: {}", name, output.stderr.trim());
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let output = self.run(&TmuxCommand::list_sessions()).await?;
        if !output.success() {
            // no server running
            if !output.stderr.contains("no server running") && !output.stderr.is_empty() {
                warn!("tmux list-sessions: {}", output.stderr.trim());
            }
            return Ok(Vec::new());
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn name(&self) -> &'static str {
        "tmux"
    }
}
