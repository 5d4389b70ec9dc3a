//! Workspace client
//!
//! Used by the CLI when it runs as a separate process from the daemon.
//! Everything goes through the workspace on disk: submissions are written
//! as queued records and kills as `tasks/<id>.kill` requests, both picked up
//! by the daemon's monitor on its next tick.

use crate::daemon::{count_task_sessions, read_log, StatusReport};
use crate::guard::{process_alive, read_pid};
use crate::manager::TaskCounts;
use crate::session::SessionProvider;
use crate::state::TaskState;
use crate::store::TaskStore;
use crate::system::SystemProbe;
use crate::task::{Task, TaskId, TaskRequest};
use fleet_foundation::{DaemonConfig, Error, Result, Workspace};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

pub struct WorkspaceClient {
    config: DaemonConfig,
    store: TaskStore,
    sessions: Arc<dyn SessionProvider>,
}

impl WorkspaceClient {
    /// Load the workspace config; the workspace must already exist
    pub fn open(workspace: Workspace, sessions: Arc<dyn SessionProvider>) -> Result<Self> {
        let config = DaemonConfig::load(&workspace)?;
        Ok(Self::with_config(workspace, config, sessions))
    }

    pub fn with_config(
        workspace: Workspace,
        config: DaemonConfig,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            config,
            store: TaskStore::new(workspace),
            sessions,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        self.store.workspace()
    }

    /// Validate and persist a queued record for the daemon to pick up
    pub fn submit(&self, request: TaskRequest) -> Result<TaskId> {
        self.workspace().ensure()?;
        let task = Task::create(request, &self.config, self.workspace())?;
        self.store.save(&task)?;
        debug!("Submitted task {} via workspace", task.id);
        Ok(task.id)
    }

    /// Newest first, optionally filtered by state
    pub fn list_tasks(&self, status: Option<TaskState>) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .store
            .load_all()?
            .tasks
            .into_iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.store.load(id)
    }

    pub async fn get_logs(&self, id: &TaskId) -> Result<String> {
        let task = self
            .store
            .load(id)?
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))?;
        read_log(&task).await
    }

    /// Leave a kill request. Unknown → `Ok(false)`; terminal → `Ok(true)` with no request.
    pub fn request_kill(&self, id: &TaskId) -> Result<bool> {
        let Some(task) = self.store.load(id)? else {
            return Ok(false);
        };
        if !task.is_terminal() {
            self.store.request_kill(id)?;
        }
        Ok(true)
    }

    /// Status derived from the workspace alone
    pub async fn status(&self) -> Result<StatusReport> {
        let lock = self.workspace().lock_file();
        let pid = read_pid(&lock);
        let running = pid.map_or(false, process_alive);
        let uptime = if running {
            std::fs::metadata(&lock)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| SystemTime::now().duration_since(t).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        let mut counts = TaskCounts::default();
        for task in self.store.load_all()?.tasks {
            counts.add(task.status);
        }

        Ok(StatusReport {
            daemon_pid: pid.filter(|_| running),
            daemon_running: running,
            uptime,
            task_counts: counts,
            system: SystemProbe::new().snapshot(),
            queue_size: counts.queued,
            active_sessions: count_task_sessions(self.sessions.as_ref()).await,
        })
    }
}
