//! Lifecycle Monitor
//!
//! One periodic loop. Each tick:
//! 1. ingest records and kill requests written by other processes
//! 2. for every running task: finalize if its session ended, kill it on
//!    timeout, otherwise refresh progress
//! 3. retention sweep of old terminal tasks
//!
//! Tasks whose lock is held (e.g. mid-dispatch) are skipped until the next tick.

use crate::inference::Outcome;
use crate::manager::TaskManager;
use crate::task::Task;
use chrono::Utc;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const MSG_LOG_NOT_FOUND: &str = "Log file not found";

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub ingested: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub progressed: usize,
    pub purged: usize,
    pub skipped: usize,
}

pub struct LifecycleMonitor {
    manager: Arc<TaskManager>,
}

impl LifecycleMonitor {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self { manager }
    }

    /// Tick every `heartbeat_interval` until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.manager.config().heartbeat());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Monitor started (interval {}s)",
            self.manager.config().heartbeat_interval
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report != TickReport::default() {
                        debug!("monitor tick: {:?}", report);
                    }
                }
            }
        }
        info!("Monitor stopped");
    }

    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.manager.ingest_from_disk().await {
            Ok(n) => report.ingested = n,
            Err(e) => error!("Failed to scan task directory: {}", e),
        }

        for (_, handle) in self.manager.handles().await {
            let Ok(mut task) = handle.try_lock() else {
                report.skipped += 1;
                continue;
            };
            if task.status.is_running() {
                self.check_running(&mut task, &mut report).await;
            }
        }

        report.purged = self.sweep_retention().await;
        report
    }

    // ========================================================================
    // Running tasks
    // ========================================================================

    async fn check_running(&self, task: &mut Task, report: &mut TickReport) {
        let alive = match self.manager.executor().is_alive(task).await {
            Ok(alive) => alive,
            Err(e) => {
                // liveness unknown: leave the task alone this tick
                if e.is_task_local() {
                    warn!("Liveness check for {} failed: {}", task.id, e);
                } else {
                    error!("Liveness check for {} failed (host problem): {}", task.id, e);
                }
                return;
            }
        };

        if !alive {
            self.finalize(task, report).await;
            return;
        }

        let limit = self
            .manager
            .config()
            .effective_timeout(&task.tool, task.timeout);
        let over = task
            .elapsed()
            .map(|e| e.num_seconds() >= 0 && e.num_seconds() as u64 > limit)
            .unwrap_or(false);
        if over {
            warn!("Task {} timed out after {}s", task.id, limit);
            if self.manager.terminate_locked(task, "timeout").await.is_ok() {
                report.timed_out += 1;
            }
            return;
        }

        if let Ok(log) = tokio::fs::read_to_string(&task.log_file).await {
            if let Some(progress) = self.manager.inference().extract_progress(&log) {
                if task.update_progress(progress) && self.manager.persist(task).is_ok() {
                    report.progressed += 1;
                }
            }
        }
    }

    /// Session is gone: read the verdict from the log
    async fn finalize(&self, task: &mut Task, report: &mut TickReport) {
        match tokio::fs::read_to_string(&task.log_file).await {
            Ok(log) => {
                let inference = self.manager.inference();
                if let Some(progress) = inference.extract_progress(&log) {
                    task.update_progress(progress);
                }
                let verdict = inference.classify(&task.id, &log);
                match verdict.outcome {
                    Outcome::Completed => {
                        task.complete(verdict.finished_at);
                    }
                    Outcome::Failed => {
                        let message = verdict
                            .error_message
                            .unwrap_or_else(|| "Task failed".to_string());
                        task.fail(message);
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                task.fail(MSG_LOG_NOT_FOUND);
            }
            Err(e) => {
                task.fail(format!("Failed to read log: {}", e));
            }
        }

        self.manager.release_slot(&task.id);
        let _ = self.manager.persist(task);
        if task.status.is_success() {
            report.completed += 1;
        } else {
            report.failed += 1;
        }
        info!("Task {} finalized with status: {}", task.id, task.status);
    }

    // ========================================================================
    // Retention
    // ========================================================================

    async fn sweep_retention(&self) -> usize {
        let window = self.manager.config().retention();
        // windows reaching past the representable range purge nothing
        let Some(cutoff) = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w))
        else {
            return 0;
        };
        let mut purged = 0;

        for (id, handle) in self.manager.handles().await {
            let expired = {
                let Ok(task) = handle.try_lock() else {
                    continue;
                };
                let old = task.is_terminal() && task.completed_at.map_or(false, |t| t < cutoff);
                if old {
                    if let Err(e) = self.manager.store().delete(&task) {
                        warn!("Failed to delete expired task {}: {}", id, e);
                        continue;
                    }
                }
                old
            };
            if expired {
                self.manager.remove(&id).await;
                purged += 1;
            }
        }

        if purged > 0 {
            info!("Retention sweep removed {} tasks", purged);
        }
        purged
    }
}
