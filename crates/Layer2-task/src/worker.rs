//! Worker pool
//!
//! Each worker first takes a running slot, then waits (bounded) for a queued
//! id. Holding the slot before dequeuing keeps dispatch FIFO and caps running
//! tasks at `max_concurrent_tasks` even though dispatch returns immediately.

use crate::manager::TaskManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How long a worker waits on the queue before re-checking for shutdown
pub const DEQUEUE_WAIT: Duration = Duration::from_secs(1);

pub struct Worker {
    index: usize,
    manager: Arc<TaskManager>,
}

impl Worker {
    pub fn new(index: usize, manager: Arc<TaskManager>) -> Self {
        Self { index, manager }
    }

    pub async fn run(self, cancel: CancellationToken) {
        debug!("worker-{} started", self.index);
        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.manager.slots().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                id = self.manager.queue().dequeue(DEQUEUE_WAIT) => id,
            };

            // dispatch runs to completion even if shutdown starts meanwhile
            if let Some(id) = next {
                debug!("worker-{} picked {}", self.index, id);
                self.manager.execute(&id, permit).await;
            }
        }
        debug!("worker-{} stopped", self.index);
    }
}

/// Spawn `count` workers sharing one manager
pub fn spawn_workers(
    manager: &Arc<TaskManager>,
    count: usize,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    info!("Starting {} workers", count);
    (0..count)
        .map(|i| {
            let worker = Worker::new(i, Arc::clone(manager));
            tokio::spawn(worker.run(cancel.clone()))
        })
        .collect()
}
