//! Task definition and types

use crate::state::TaskState;
use chrono::{DateTime, Utc};
use fleet_foundation::strings::{truncate_chars, SESSION_PREFIX, TASK_ID_PREFIX};
use fleet_foundation::{DaemonConfig, Error, Result, Workspace};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Upper bound on `error_message`, in characters
pub const MAX_ERROR_MESSAGE: usize = 500;

/// Operator-supplied parameters
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for a task: `task-YYYYMMDD-HHMMSS-<8 hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh id (timestamp + random suffix)
    pub fn generate() -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}-{}", TASK_ID_PREFIX, stamp, &suffix[..8]))
    }

    /// Accept an id coming from outside the daemon (CLI args, file names).
    ///
    /// Ids end up in file paths and session names, so only
    /// `[A-Za-z0-9_-]` is allowed.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::InvalidTask(format!("malformed task id: {:?}", raw)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the persistent session that runs this task
    pub fn session_name(&self) -> String {
        format!("{}{}", SESSION_PREFIX, self.0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Advisory priority. Stored and reported, never consulted by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// A submission, as received from the CLI or an in-process caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub tool: String,

    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Timeout override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl TaskRequest {
    pub fn new(tool: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Reject a submission before anything is persisted
    pub fn validate(&self, config: &DaemonConfig) -> Result<()> {
        if self.tool.trim().is_empty() {
            return Err(Error::InvalidTask("missing required field: tool".into()));
        }
        if self.command.trim().is_empty() {
            return Err(Error::InvalidTask("missing required field: command".into()));
        }
        if config.tool(&self.tool).is_none() {
            return Err(Error::InvalidTask(format!("unknown tool: {}", self.tool)));
        }
        if let Some(key) = self.parameters.keys().find(|k| !is_parameter_key(k)) {
            return Err(Error::InvalidTask(format!(
                "invalid parameter name: {:?}",
                key
            )));
        }
        if self.timeout == Some(0) {
            return Err(Error::InvalidTask("timeout must be positive".into()));
        }
        Ok(())
    }
}

// Parameter names become `--<name>` flags.
fn is_parameter_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('-')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// A task record. Serialized as-is to `tasks/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Key of the tool table
    pub tool: String,

    /// Arguments appended to the tool's base command
    pub command: String,

    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Timeout override in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Current state
    pub status: TaskState,

    /// 0-100, only 100 when completed
    #[serde(default)]
    pub progress: u8,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was dispatched
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub error_message: Option<String>,

    pub session_name: String,

    pub log_file: PathBuf,

    pub result_file: PathBuf,
}

impl Task {
    /// Build a queued task from a request (no validation)
    pub fn from_request(request: TaskRequest, workspace: &Workspace) -> Self {
        let id = TaskId::generate();
        Self {
            session_name: id.session_name(),
            log_file: workspace.task_log(id.as_str()),
            result_file: workspace.task_result(id.as_str()),
            id,
            tool: request.tool,
            command: request.command,
            parameters: request.parameters,
            working_dir: request.working_dir,
            priority: request.priority,
            timeout: request.timeout,
            status: TaskState::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Validate then build
    pub fn create(request: TaskRequest, config: &DaemonConfig, workspace: &Workspace) -> Result<Self> {
        request.validate(config)?;
        Ok(Self::from_request(request, workspace))
    }

    /// Mark task as running. Only valid from `Queued`.
    pub fn start(&mut self) -> bool {
        if self.status != TaskState::Queued {
            return false;
        }
        self.status = TaskState::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Mark task as completed. Only valid from `Running`.
    ///
    /// `finished_at` (usually the sentinel's timestamp) is used when it lies
    /// between `started_at` and now.
    pub fn complete(&mut self, finished_at: Option<DateTime<Utc>>) -> bool {
        if self.status != TaskState::Running {
            return false;
        }
        let now = Utc::now();
        let at = finished_at
            .filter(|t| *t <= now && self.started_at.map_or(true, |s| *t >= s))
            .unwrap_or(now);
        self.status = TaskState::Completed;
        self.progress = 100;
        self.completed_at = Some(at);
        true
    }

    /// Mark task as failed. No-op once terminal.
    ///
    /// A queued task passes through running with a zero-length run so that
    /// `started_at` is always set on terminal records.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let now = Utc::now();
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = TaskState::Failed;
        self.progress = self.progress.min(99);
        self.error_message = Some(truncate_chars(&message.into(), MAX_ERROR_MESSAGE));
        self.completed_at = Some(now);
        true
    }

    /// Record inferred progress while running, clamped below 100.
    /// Returns true if the value changed.
    pub fn update_progress(&mut self, progress: u8) -> bool {
        if self.status != TaskState::Running {
            return false;
        }
        let clamped = progress.min(99);
        if clamped == self.progress {
            return false;
        }
        self.progress = clamped;
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if task is still active (queued or running)
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Time since dispatch
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.started_at.map(|s| Utc::now() - s)
    }

    /// Get execution duration if task has started
    pub fn duration(&self) -> Option<std::time::Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - start).to_std().unwrap_or_default())
    }
}
