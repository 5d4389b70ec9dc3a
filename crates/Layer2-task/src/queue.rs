//! Task queue - bounded FIFO of task ids with a blocking, time-limited dequeue
//!
//! Dispatch order is strictly FIFO; `Priority` is not consulted.

use crate::task::TaskId;
use fleet_foundation::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;

pub struct TaskQueue {
    items: Mutex<VecDeque<TaskId>>,
    capacity: usize,
    available: Notify,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            available: Notify::new(),
        }
    }

    /// Append an id; fails with `QueueFull` at capacity
    pub fn enqueue(&self, id: TaskId) -> Result<()> {
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(Error::QueueFull(format!(
                    "{} tasks already queued",
                    items.len()
                )));
            }
            items.push_back(id);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Pop the oldest id, waiting at most `wait` for one to arrive
    pub async fn dequeue(&self, wait: Duration) -> Option<TaskId> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.available.notified();
            if let Some(id) = self.items.lock().pop_front() {
                return Some(id);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.items.lock().iter().any(|queued| queued == id)
    }
}
