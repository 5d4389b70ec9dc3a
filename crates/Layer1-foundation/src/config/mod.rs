//! Config - 데몬 설정 관리
//!
//! - `daemon.rs` - DaemonConfig + tool table

mod daemon;

pub use daemon::{DaemonConfig, ParameterStyle, ToolConfig};
