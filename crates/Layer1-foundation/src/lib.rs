//! # fleet-foundation
//!
//! Foundation layer for Fleet:
//! - Error: 데몬 전체 에러 분류 (InvalidTask, DispatchFailure, LockContention ...)
//! - Config: DaemonConfig + tool table (`configs/daemon.json`)
//! - Workspace: 작업 디렉토리 레이아웃
//! - Storage: JsonStore, atomic write
//! - Strings: 공용 상수 및 헬퍼

pub mod config;
pub mod error;
pub mod storage;
pub mod strings;
pub mod workspace;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{DaemonConfig, ParameterStyle, ToolConfig};

// ============================================================================
// Storage / Workspace
// ============================================================================
pub use storage::{atomic_write, remove_if_exists, JsonStore};
pub use workspace::{expand_home, Workspace, DEFAULT_WORKSPACE};
