//! Task state machine
//!
//! `Queued → Running → {Completed | Failed}`; both terminal states absorb.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Possible states of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Task is queued for execution
    Queued,

    /// Task has been dispatched to a session
    Running,

    /// Session ended with the success sentinel
    Completed,

    /// Dispatch failure, failure sentinel, timeout, kill, or no sentinel at all
    Failed,
}

impl TaskState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Check if task is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Check if task is waiting for a worker
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Queued)
    }

    /// Check if task completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Completed)
    }

    /// Position along `queued → running → terminal`
    pub fn rank(&self) -> u8 {
        match self {
            TaskState::Queued => 0,
            TaskState::Running => 1,
            TaskState::Completed | TaskState::Failed => 2,
        }
    }

    /// Wire name (matches the serialized form)
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskState::Queued => "Queued",
            TaskState::Running => "Running",
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
        }
    }

    /// Get a symbol for the state (for CLI listings)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskState::Queued => "◎",
            TaskState::Running => "⟳",
            TaskState::Completed => "✓",
            TaskState::Failed => "✗",
        }
    }

    pub fn all() -> [TaskState; 4] {
        [
            TaskState::Queued,
            TaskState::Running,
            TaskState::Completed,
            TaskState::Failed,
        ]
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queued" => Ok(TaskState::Queued),
            "running" => Ok(TaskState::Running),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}
