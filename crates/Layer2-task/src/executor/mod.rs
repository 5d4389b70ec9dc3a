//! Task executors
//!
//! - `ExecutionDriver` - runs tasks inside persistent sessions
//! - `command` - invocation building and completion markers

pub mod command;
pub mod driver;
pub mod r#trait;

pub use driver::ExecutionDriver;
pub use r#trait::Executor;
