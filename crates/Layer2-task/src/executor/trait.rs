//! Executor trait

use crate::task::Task;
use async_trait::async_trait;
use fleet_foundation::Result;

/// Executor trait - implement to add new execution backends
#[async_trait]
pub trait Executor: Send + Sync {
    /// Start a task in a fresh detached session. Returns once the
    /// invocation has been handed over; it does not wait for it to finish.
    async fn dispatch(&self, task: &Task) -> Result<()>;

    /// Destroy the task's session, if any
    async fn terminate(&self, task: &Task) -> Result<()>;

    /// Whether the task's session still exists
    async fn is_alive(&self, task: &Task) -> Result<bool>;

    /// Get executor name
    fn name(&self) -> &'static str;
}
