//! Task Manager - shared daemon state
//!
//! Owns the in-memory task map, the queue, the running-slot semaphore and
//! the collaborators (store, executor, inference). Workers, the monitor and
//! the facade all go through it.
//!
//! Locking discipline:
//! - map: `RwLock`, held only to look up or insert handles
//! - task: per-task `Mutex`; every transition re-checks status, mutates and
//!   persists before the guard is released
//! - slots: one permit per running task, parked here until the task is
//!   terminal

use crate::executor::Executor;
use crate::inference::CompletionInference;
use crate::queue::TaskQueue;
use crate::state::TaskState;
use crate::store::TaskStore;
use crate::task::{Task, TaskId};
use fleet_foundation::{DaemonConfig, Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

/// Shared, lockable task
pub type TaskHandle = Arc<Mutex<Task>>;

/// Count of tasks per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TaskCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn add(&mut self, state: TaskState) {
        match state {
            TaskState::Queued => self.queued += 1,
            TaskState::Running => self.running += 1,
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.completed + self.failed
    }
}

pub struct TaskManager {
    config: Arc<DaemonConfig>,
    store: TaskStore,
    queue: TaskQueue,
    tasks: RwLock<HashMap<TaskId, TaskHandle>>,
    slots: Arc<Semaphore>,
    held: parking_lot::Mutex<HashMap<TaskId, OwnedSemaphorePermit>>,
    executor: Arc<dyn Executor>,
    inference: Arc<dyn CompletionInference>,
    /// Corrupt records already reported
    ignored: parking_lot::Mutex<HashSet<PathBuf>>,
}

impl TaskManager {
    pub fn new(
        config: Arc<DaemonConfig>,
        store: TaskStore,
        executor: Arc<dyn Executor>,
        inference: Arc<dyn CompletionInference>,
    ) -> Self {
        Self {
            queue: TaskQueue::new(config.queue_capacity),
            slots: Arc::new(Semaphore::new(config.max_concurrent_tasks)),
            config,
            store,
            tasks: RwLock::new(HashMap::new()),
            held: parking_lot::Mutex::new(HashMap::new()),
            executor,
            inference,
            ignored: parking_lot::Mutex::new(HashSet::new()),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn inference(&self) -> &Arc<dyn CompletionInference> {
        &self.inference
    }

    pub fn slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.slots)
    }

    // ========================================================================
    // Map
    // ========================================================================

    pub async fn handle(&self, id: &TaskId) -> Option<TaskHandle> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Every handle, in no particular order
    pub async fn handles(&self) -> Vec<(TaskId, TaskHandle)> {
        self.tasks
            .read()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), Arc::clone(h)))
            .collect()
    }

    pub async fn contains(&self, id: &TaskId) -> bool {
        self.tasks.read().await.contains_key(id)
    }

    /// Insert unless already known; returns the handle in the map
    pub async fn insert(&self, task: Task) -> TaskHandle {
        let mut tasks = self.tasks.write().await;
        Arc::clone(
            tasks
                .entry(task.id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(task))),
        )
    }

    pub async fn remove(&self, id: &TaskId) -> Option<TaskHandle> {
        self.held.lock().remove(id);
        self.tasks.write().await.remove(id)
    }

    /// Clone of every task. Waits for tasks that are mid-transition.
    pub async fn snapshot(&self) -> Vec<Task> {
        let mut out = Vec::new();
        for (_, handle) in self.handles().await {
            out.push(handle.lock().await.clone());
        }
        out
    }

    pub async fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for task in self.snapshot().await {
            counts.add(task.status);
        }
        counts
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the record; failures are logged and returned
    pub fn persist(&self, task: &Task) -> Result<()> {
        self.store.save(task).map_err(|e| {
            warn!("Failed to persist task {}: {}", task.id, e);
            e
        })
    }

    // ========================================================================
    // Running slots
    // ========================================================================

    /// Keep the permit until the task is terminal
    pub fn park_slot(&self, id: &TaskId, permit: OwnedSemaphorePermit) {
        self.held.lock().insert(id.clone(), permit);
    }

    /// Give the task's running slot back, if it holds one
    pub fn release_slot(&self, id: &TaskId) -> bool {
        self.held.lock().remove(id).is_some()
    }

    /// Claim a slot without waiting (recovered running tasks)
    pub fn try_claim_slot(&self, id: &TaskId) -> bool {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => {
                self.park_slot(id, permit);
                true
            }
            Err(_) => false,
        }
    }

    /// Stop reporting a corrupt record on every scan
    pub fn ignore_record(&self, path: PathBuf) {
        self.ignored.lock().insert(path);
    }

    pub fn held_slots(&self) -> usize {
        self.held.lock().len()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Insert, persist and enqueue a new queued task
    pub async fn submit(&self, task: Task) -> Result<TaskId> {
        let id = task.id.clone();
        let handle = self.insert(task).await;
        {
            let task = handle.lock().await;
            if let Err(e) = self.persist(&task) {
                drop(task);
                self.tasks.write().await.remove(&id);
                return Err(e);
            }
        }

        if let Err(e) = self.queue.enqueue(id.clone()) {
            if let Some(handle) = self.tasks.write().await.remove(&id) {
                let task = handle.lock().await;
                if let Err(del) = self.store.delete(&task) {
                    warn!("Failed to remove rejected task {}: {}", id, del);
                }
            }
            return Err(e);
        }

        info!("Task {} queued", id);
        Ok(id)
    }

    /// Run one dequeued task, holding `permit` while it runs
    pub async fn execute(&self, id: &TaskId, permit: OwnedSemaphorePermit) {
        let Some(handle) = self.handle(id).await else {
            debug!("Dequeued unknown task {}", id);
            return;
        };
        let mut task = handle.lock().await;
        if !task.start() {
            // killed while queued, or queued twice
            debug!("Skipping task {} in state {}", id, task.status);
            return;
        }
        if self.persist(&task).is_err() {
            task.fail("Failed to start: could not persist task record");
            let _ = self.persist(&task);
            return;
        }

        match self.executor.dispatch(&task).await {
            Ok(()) => self.park_slot(id, permit),
            Err(e) => {
                if e.is_task_local() {
                    warn!("Failed to start task {}: {}", id, e);
                } else {
                    error!("Failed to start task {} (host problem): {}", id, e);
                }
                let reason = match e {
                    Error::DispatchFailure(msg) => msg,
                    other => other.to_string(),
                };
                task.fail(format!("Failed to start: {}", reason));
                let _ = self.persist(&task);
            }
        }
    }

    /// Kill a task. Unknown → `Ok(false)`; already terminal → `Ok(true)` (no-op).
    pub async fn kill(&self, id: &TaskId, reason: &str) -> Result<bool> {
        let Some(handle) = self.handle(id).await else {
            return Ok(false);
        };
        let mut task = handle.lock().await;
        if task.is_terminal() {
            return Ok(true);
        }
        self.terminate_locked(&mut task, reason).await?;
        Ok(true)
    }

    /// Destroy the session and fail the task. Caller holds the task lock.
    pub async fn terminate_locked(&self, task: &mut Task, reason: &str) -> Result<()> {
        if task.status.is_running() {
            if let Err(e) = self.executor.terminate(task).await {
                warn!("Failed to kill session {}: {}", task.session_name, e);
            }
        }
        task.fail(format!("Task killed: {}", reason));
        self.release_slot(&task.id);
        info!("Task {} killed: {}", task.id, reason);
        self.persist(task)
    }

    /// Pick up records written by other processes and pending kill requests
    pub async fn ingest_from_disk(&self) -> Result<usize> {
        let mut ingested = 0;
        for id in self.store.list_ids()? {
            if self.contains(&id).await {
                continue;
            }
            let path = self.store.record_path(&id);
            if self.ignored.lock().contains(&path) {
                continue;
            }
            match self.store.load(&id) {
                Ok(Some(task)) => {
                    let queued = task.status == TaskState::Queued;
                    self.insert(task).await;
                    if queued {
                        if let Err(e) = self.queue.enqueue(id.clone()) {
                            // left on disk; picked up again once the queue drains
                            warn!("Cannot queue task {} from disk: {}", id, e);
                            self.remove(&id).await;
                            continue;
                        }
                    }
                    debug!("Ingested task {} from disk", id);
                    ingested += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping task record: {}", e);
                    self.ignored.lock().insert(path);
                }
            }
        }

        for id in self.store.take_kill_requests()? {
            match self.kill(&id, "manual").await {
                Ok(true) => {}
                Ok(false) => warn!("Kill request for unknown task {}", id),
                Err(e) => warn!("Kill request for {} failed: {}", id, e),
            }
        }
        Ok(ingested)
    }
}
