//! Daemon facade
//!
//! Wires the store, queue, workers, monitor and guard together and exposes
//! the public operations: create, status, list, logs, kill.

use crate::executor::{ExecutionDriver, Executor};
use crate::guard::SingletonGuard;
use crate::inference::{CompletionInference, SentinelInference};
use crate::manager::{TaskCounts, TaskManager};
use crate::monitor::LifecycleMonitor;
use crate::session::SessionProvider;
use crate::state::TaskState;
use crate::store::TaskStore;
use crate::system::{SystemProbe, SystemSnapshot};
use crate::task::{Task, TaskId, TaskRequest};
use crate::worker::spawn_workers;
use fleet_foundation::strings::TASK_SESSION_PREFIX;
use fleet_foundation::{DaemonConfig, Error, Result, Workspace};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What startup recovery did with the persisted records
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Queued records put back on the queue, oldest first
    pub requeued: Vec<TaskId>,
    /// Running records whose session is still alive
    pub resumed: Vec<TaskId>,
    /// Running records whose session is gone (now failed)
    pub died: Vec<TaskId>,
    /// Queued records that did not fit back in the queue (now failed)
    pub dropped: Vec<TaskId>,
    /// Records that failed to parse
    pub corrupt: Vec<PathBuf>,
}

/// Daemon status, as printed by `fleetd status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub daemon_pid: Option<u32>,
    pub daemon_running: bool,
    /// Seconds since startup
    pub uptime: f64,
    pub task_counts: TaskCounts,
    pub system: SystemSnapshot,
    pub queue_size: usize,
    pub active_sessions: usize,
}

/// Number of live sessions that belong to tasks
pub async fn count_task_sessions(sessions: &dyn SessionProvider) -> usize {
    match sessions.list_sessions().await {
        Ok(names) => names
            .iter()
            .filter(|n| n.starts_with(TASK_SESSION_PREFIX))
            .count(),
        Err(e) => {
            warn!("Failed to list sessions: {}", e);
            0
        }
    }
}

/// Read a task's log file; `NotFound` when it does not exist
pub async fn read_log(task: &Task) -> Result<String> {
    match tokio::fs::read_to_string(&task.log_file).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
            "log file for task {} ({})",
            task.id,
            task.log_file.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

pub struct Daemon {
    workspace: Workspace,
    manager: Arc<TaskManager>,
    sessions: Arc<dyn SessionProvider>,
    probe: SystemProbe,
    opened: Instant,
    started: parking_lot::Mutex<Option<Instant>>,
    guard: parking_lot::Mutex<Option<SingletonGuard>>,
    cancel: CancellationToken,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Daemon {
    /// Build a daemon over `workspace` with the sentinel inference
    pub fn open(
        workspace: Workspace,
        config: DaemonConfig,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self> {
        Self::open_with(workspace, config, sessions, Arc::new(SentinelInference))
    }

    pub fn open_with(
        workspace: Workspace,
        config: DaemonConfig,
        sessions: Arc<dyn SessionProvider>,
        inference: Arc<dyn CompletionInference>,
    ) -> Result<Self> {
        config.validate()?;
        workspace.ensure()?;

        let config = Arc::new(config);
        let executor: Arc<dyn Executor> = Arc::new(ExecutionDriver::new(
            Arc::clone(&sessions),
            Arc::clone(&config),
            workspace.clone(),
        ));
        let manager = Arc::new(TaskManager::new(
            config,
            TaskStore::new(workspace.clone()),
            executor,
            inference,
        ));

        Ok(Self {
            workspace,
            manager,
            sessions,
            probe: SystemProbe::new(),
            opened: Instant::now(),
            started: parking_lot::Mutex::new(None),
            guard: parking_lot::Mutex::new(None),
            cancel: CancellationToken::new(),
            handles: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&self) -> &DaemonConfig {
        self.manager.config()
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// A monitor over this daemon's state (for driving ticks directly)
    pub fn monitor(&self) -> LifecycleMonitor {
        LifecycleMonitor::new(Arc::clone(&self.manager))
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.started.lock().is_some() && !self.cancel.is_cancelled()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Take the workspace lock, recover persisted tasks, then spawn the
    /// workers and the monitor
    pub async fn start(&self) -> Result<RecoveryReport> {
        if self.started.lock().is_some() {
            return Err(Error::Internal("daemon already started".into()));
        }

        let guard = SingletonGuard::acquire(&self.workspace.lock_file())?;
        *self.guard.lock() = Some(guard);
        info!(
            "Starting daemon (pid {}) in {}",
            std::process::id(),
            self.workspace.root().display()
        );

        let report = match self.recover().await {
            Ok(report) => report,
            Err(e) => {
                self.guard.lock().take();
                return Err(e);
            }
        };

        let mut handles = spawn_workers(
            &self.manager,
            self.config().max_concurrent_tasks,
            &self.cancel,
        );
        handles.push(tokio::spawn(self.monitor().run(self.cancel.clone())));
        *self.handles.lock().await = handles;
        *self.started.lock() = Some(Instant::now());

        info!(
            "Daemon started: {} requeued, {} resumed, {} died, {} corrupt",
            report.requeued.len(),
            report.resumed.len(),
            report.died.len(),
            report.corrupt.len()
        );
        Ok(report)
    }

    /// Stop workers and monitor, wait up to `shutdown_grace` for in-flight
    /// dispatches, then release the workspace lock
    pub async fn shutdown(&self) {
        info!("Shutting down daemon");
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().await);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let grace = self.config().shutdown_grace();
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(
                "In-flight work did not drain within {}s, aborting",
                grace.as_secs()
            );
            for abort in aborts {
                abort.abort();
            }
        }

        if self.guard.lock().take().is_some() {
            info!("Released workspace lock");
        }
    }

    /// Rebuild the in-memory map from disk. Safe to call more than once;
    /// tasks already known are left alone.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let scan = self.manager.store().load_all()?;
        let mut report = RecoveryReport {
            corrupt: scan.corrupt,
            ..Default::default()
        };
        for path in &report.corrupt {
            self.manager.ignore_record(path.clone());
        }

        let mut tasks = scan.tasks;
        tasks.sort_by_key(|t| t.created_at);

        for mut task in tasks {
            if self.manager.contains(&task.id).await {
                continue;
            }
            let id = task.id.clone();
            match task.status {
                TaskState::Queued => {
                    let handle = self.manager.insert(task).await;
                    if let Err(e) = self.manager.queue().enqueue(id.clone()) {
                        // never leave a queued record that nobody will dequeue
                        error!("Cannot requeue task {}: {}", id, e);
                        let mut task = handle.lock().await;
                        task.fail(format!("Failed to requeue: {}", e));
                        let _ = self.manager.persist(&task);
                        report.dropped.push(id);
                        continue;
                    }
                    report.requeued.push(id);
                }
                TaskState::Running => {
                    let alive = match self.manager.executor().is_alive(&task).await {
                        Ok(alive) => alive,
                        Err(e) => {
                            // unknown: keep it running, the monitor retries
                            warn!("Liveness check for {} failed: {}", id, e);
                            true
                        }
                    };
                    if alive {
                        if !self.manager.try_claim_slot(&id) {
                            warn!("No running slot left for recovered task {}", id);
                        }
                        self.manager.insert(task).await;
                        report.resumed.push(id);
                    } else {
                        warn!("Task {} lost its session while the daemon was down", id);
                        task.fail(
                            Error::ProcessDied {
                                session: task.session_name.clone(),
                            }
                            .to_string(),
                        );
                        let _ = self.manager.persist(&task);
                        self.manager.insert(task).await;
                        report.died.push(id);
                    }
                }
                TaskState::Completed | TaskState::Failed => {
                    self.manager.insert(task).await;
                }
            }
        }
        Ok(report)
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Validate, persist as queued, enqueue
    pub async fn create_task(&self, request: TaskRequest) -> Result<TaskId> {
        let task = Task::create(request, self.config(), &self.workspace)?;
        self.manager.submit(task).await
    }

    pub async fn get_status(&self) -> StatusReport {
        let since = (*self.started.lock()).unwrap_or(self.opened);
        StatusReport {
            daemon_pid: Some(std::process::id()),
            daemon_running: self.is_running(),
            uptime: since.elapsed().as_secs_f64(),
            task_counts: self.manager.counts().await,
            system: self.probe.snapshot(),
            queue_size: self.manager.queue().len(),
            active_sessions: count_task_sessions(self.sessions.as_ref()).await,
        }
    }

    /// Newest first, optionally filtered by state
    pub async fn list_tasks(&self, status: Option<TaskState>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .manager
            .snapshot()
            .await
            .into_iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub async fn get_task(&self, id: &TaskId) -> Option<Task> {
        let handle = self.manager.handle(id).await?;
        let task = handle.lock().await.clone();
        Some(task)
    }

    pub async fn get_logs(&self, id: &TaskId) -> Result<String> {
        let task = self
            .get_task(id)
            .await
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))?;
        read_log(&task).await
    }

    /// `Ok(false)` for unknown ids; already-terminal tasks are a no-op success
    pub async fn kill_task(&self, id: &TaskId) -> Result<bool> {
        self.manager.kill(id, "manual").await
    }
}
