//! Session-backed executor
//!
//! Dispatch sequence for one task:
//! 1. destroy any stale session with the same name
//! 2. create a fresh session at the resolved working directory
//! 3. redirect session output into the task log, write a banner
//! 4. run the tool's env setup steps in order
//! 5. type the marker-wrapped invocation

use super::command::{banner, build_invocation, with_markers};
use super::Executor;
use crate::session::{shell_quote, SessionProvider};
use crate::task::Task;
use async_trait::async_trait;
use fleet_foundation::{expand_home, DaemonConfig, Error, Result, Workspace};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ExecutionDriver {
    sessions: Arc<dyn SessionProvider>,
    config: Arc<DaemonConfig>,
    workspace: Workspace,
}

impl ExecutionDriver {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        config: Arc<DaemonConfig>,
        workspace: Workspace,
    ) -> Self {
        Self {
            sessions,
            config,
            workspace,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionProvider> {
        &self.sessions
    }

    /// Task override, else tool default, else home
    fn working_dir(&self, task: &Task) -> PathBuf {
        let dir = task
            .working_dir
            .clone()
            .or_else(|| self.config.tool(&task.tool).and_then(|t| t.working_dir.clone()))
            .unwrap_or_else(|| "~".to_string());
        expand_home(&dir)
    }

    /// Every line typed into the session, in order
    fn script(&self, task: &Task) -> Result<Vec<String>> {
        let tool = self
            .config
            .tool(&task.tool)
            .ok_or_else(|| Error::InvalidTask(format!("unknown tool: {}", task.tool)))?;

        let logs_dir = shell_quote(&self.workspace.logs_dir().to_string_lossy())?;
        let log_file = shell_quote(&task.log_file.to_string_lossy())?;

        let mut lines = vec![
            format!("mkdir -p {}", logs_dir),
            format!("exec > >(tee -a {}) 2>&1", log_file),
            banner(&task.id),
        ];
        lines.extend(tool.env_setup.iter().cloned());

        let invocation = build_invocation(task, tool, &self.workspace)?;
        lines.push(with_markers(&task.id, &invocation));
        Ok(lines)
    }

    async fn run_script(&self, task: &Task) -> Result<()> {
        let lines = self.script(task)?;
        let working_dir = self.working_dir(task);
        let session = &task.session_name;

        self.sessions.kill(session).await?;
        self.sessions.create(session, &working_dir).await?;

        let delay = self.config.input_delay();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            debug!("[{}] > {}", session, line);
            self.sessions.send_input(session, line).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for ExecutionDriver {
    async fn dispatch(&self, task: &Task) -> Result<()> {
        match self.run_script(task).await {
            Ok(()) => {
                info!("Task {} started in session {}", task.id, task.session_name);
                Ok(())
            }
            Err(e) => {
                // 반쯤 만들어진 세션 정리
                let _ = self.sessions.kill(&task.session_name).await;
                Err(match e {
                    Error::DispatchFailure(_) => e,
                    other => Error::DispatchFailure(other.to_string()),
                })
            }
        }
    }

    async fn terminate(&self, task: &Task) -> Result<()> {
        self.sessions.kill(&task.session_name).await
    }

    async fn is_alive(&self, task: &Task) -> Result<bool> {
        self.sessions.has_session(&task.session_name).await
    }

    fn name(&self) -> &'static str {
        self.sessions.name()
    }
}
