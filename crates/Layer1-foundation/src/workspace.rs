//! Workspace layout
//!
//! One daemon owns one workspace directory:
//!
//! ```text
//! <root>/
//!   tasks/<id>.json          task records
//!   logs/<id>.log            captured session output
//!   logs/daemon.log          daemon's own log
//!   results/<id>.json
//!   configs/daemon.json      daemon configuration
//!   configs/<id>_params.json parameter side-channel
//!   pid/daemon.lock          singleton lock (contains pid)
//! ```

use crate::strings::{
    DAEMON_CONFIG_FILE, DAEMON_LOG_FILE, DIR_CONFIGS, DIR_LOGS, DIR_PID, DIR_RESULTS, DIR_TASKS,
    LOCK_FILE, WORKSPACE_DIRS,
};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Default workspace root (before `~` expansion)
pub const DEFAULT_WORKSPACE: &str = "~/ai-workspace";

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Resolved paths of a daemon workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace from a user-supplied path (`~` allowed)
    pub fn from_arg(path: &str) -> Self {
        Self::new(expand_home(path))
    }

    /// Create the root and every sub-directory
    pub fn ensure(&self) -> Result<()> {
        for dir in WORKSPACE_DIRS {
            let path = self.root.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| {
                Error::Config(format!(
                    "Failed to create workspace directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(DIR_TASKS)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(DIR_LOGS)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(DIR_RESULTS)
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.root.join(DIR_CONFIGS)
    }

    pub fn pid_dir(&self) -> PathBuf {
        self.root.join(DIR_PID)
    }

    pub fn config_file(&self) -> PathBuf {
        self.configs_dir().join(DAEMON_CONFIG_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.pid_dir().join(LOCK_FILE)
    }

    pub fn daemon_log(&self) -> PathBuf {
        self.logs_dir().join(DAEMON_LOG_FILE)
    }

    pub fn task_record(&self, task_id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{}.json", task_id))
    }

    pub fn kill_request(&self, task_id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{}.kill", task_id))
    }

    pub fn task_log(&self, task_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{}.log", task_id))
    }

    pub fn task_result(&self, task_id: &str) -> PathBuf {
        self.results_dir().join(format!("{}.json", task_id))
    }

    pub fn task_params(&self, task_id: &str) -> PathBuf {
        self.configs_dir().join(format!("{}_params.json", task_id))
    }
}
