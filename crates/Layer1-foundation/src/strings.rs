//! Shared string constants and helpers
//!
//! Names that several layers must agree on (workspace sub-directories,
//! session prefixes) live here so the daemon, the CLI and the tests never
//! drift apart.

// ============================================================================
// Workspace Layout
// ============================================================================

/// Task record directory
pub const DIR_TASKS: &str = "tasks";
/// Per-task log directory (also holds `daemon.log`)
pub const DIR_LOGS: &str = "logs";
/// Reserved for session metadata
pub const DIR_SESSIONS: &str = "sessions";
/// Per-task result files
pub const DIR_RESULTS: &str = "results";
/// `daemon.json` and parameter side-channel files
pub const DIR_CONFIGS: &str = "configs";
/// Lock artifact
pub const DIR_PID: &str = "pid";

/// All sub-directories created on startup
pub const WORKSPACE_DIRS: [&str; 6] = [
    DIR_TASKS,
    DIR_LOGS,
    DIR_SESSIONS,
    DIR_RESULTS,
    DIR_CONFIGS,
    DIR_PID,
];

/// Daemon config file name inside `configs/`
pub const DAEMON_CONFIG_FILE: &str = "daemon.json";
/// Lock file name inside `pid/`
pub const LOCK_FILE: &str = "daemon.lock";
/// Daemon's own log file inside `logs/`
pub const DAEMON_LOG_FILE: &str = "daemon.log";

// ============================================================================
// Identifiers
// ============================================================================

/// Prefix of every task id
pub const TASK_ID_PREFIX: &str = "task-";
/// Prefix of every session name (`ai-<task id>`)
pub const SESSION_PREFIX: &str = "ai-";
/// Prefix that identifies daemon-owned sessions in a session listing
pub const TASK_SESSION_PREFIX: &str = "ai-task";

// ============================================================================
// Helpers
// ============================================================================

/// Truncate to at most `max` characters, never splitting a code point
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("에러 발생", 2), "에러");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_session_prefix_matches_task_ids() {
        let session = format!("{}{}abc", SESSION_PREFIX, TASK_ID_PREFIX);
        assert!(session.starts_with(TASK_SESSION_PREFIX));
    }
}
