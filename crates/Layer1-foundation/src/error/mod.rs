//! Error types for Fleet
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Fleet 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 태스크 제출/실행 관련
    // ========================================================================
    /// Rejected before anything is persisted
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Session or command setup failed; the task is marked failed, never retried
    #[error("Dispatch failure: {0}")]
    DispatchFailure(String),

    /// Session vanished while the daemon was down
    #[error("Process died unexpectedly")]
    ProcessDied { session: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    /// Session ended without any sentinel in its log
    #[error("Task ended without completion marker")]
    InferenceAmbiguous,

    #[error("Queue full: {0}")]
    QueueFull(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    /// A task record failed to parse
    #[error("Corrupt record {path}: {message}")]
    StoreCorruption { path: String, message: String },

    // ========================================================================
    // 세션/프로세스 관련
    // ========================================================================
    #[error("Session error: {0}")]
    Session(String),

    /// Another daemon instance holds the workspace lock
    #[error("Workspace locked by another daemon: {0}")]
    LockContention(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Failures that terminate a single task and must never stop a worker or the monitor
    pub fn is_task_local(&self) -> bool {
        matches!(
            self,
            Error::DispatchFailure(_)
                | Error::ProcessDied { .. }
                | Error::Timeout(_)
                | Error::InferenceAmbiguous
                | Error::Session(_)
        )
    }

    /// Failures that abort daemon startup
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Error::LockContention(_) | Error::Config(_))
    }

    /// StoreCorruption 생성 헬퍼
    pub fn corruption(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StoreCorruption {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_local_errors() {
        assert!(Error::Timeout("t".into()).is_task_local());
        assert!(Error::DispatchFailure("tmux".into()).is_task_local());
        assert!(Error::InferenceAmbiguous.is_task_local());
        assert!(!Error::LockContention("pid 1".into()).is_task_local());
        assert!(!Error::Io(std::io::Error::other("disk")).is_task_local());
    }

    #[test]
    fn test_fatal_at_startup() {
        assert!(Error::LockContention("pid 1".into()).is_fatal_at_startup());
        assert!(Error::Config("bad".into()).is_fatal_at_startup());
        assert!(!Error::corruption("a.json", "eof").is_fatal_at_startup());
    }

    #[test]
    fn test_task_failure_messages() {
        let died = Error::ProcessDied {
            session: "ai-task-x".into(),
        };
        assert_eq!(died.to_string(), "Process died unexpectedly");
        assert_eq!(
            Error::InferenceAmbiguous.to_string(),
            "Task ended without completion marker"
        );
    }

    #[test]
    fn test_corruption_display() {
        let err = Error::corruption("tasks/x.json", "expected value");
        assert_eq!(
            err.to_string(),
            "Corrupt record tasks/x.json: expected value"
        );
    }
}
