//! Persistent sessions
//!
//! A session is a named, detached execution context that outlives the
//! connection that created it. The daemon never holds a handle to the
//! process inside; it can only create a session, type into it, ask whether it
//! still exists, and destroy it.
//!
//! - `TmuxSessions` - production backend, drives `tmux` through a `CommandRunner`
//! - `InMemorySessions` - test double with scripted liveness
//! - `CommandRunner` / `ShellRunner` - the remote command executor

pub mod memory;
pub mod runner;
pub mod tmux;

pub use memory::InMemorySessions;
pub use runner::{CommandOutput, CommandRunner, ShellRunner};
pub use tmux::TmuxSessions;

use async_trait::async_trait;
use fleet_foundation::{Error, Result};
use std::path::Path;

/// Quote one word for a POSIX shell
pub fn shell_quote(value: &str) -> Result<String> {
    shlex::try_quote(value)
        .map(|q| q.into_owned())
        .map_err(|e| Error::Session(format!("Cannot quote {:?}: {}", value, e)))
}

/// Session provider trait - implement to add new session backends
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create a detached session rooted at `working_dir`
    async fn create(&self, name: &str, working_dir: &Path) -> Result<()>;

    /// Type a line into the session, followed by Enter
    async fn send_input(&self, name: &str, text: &str) -> Result<()>;

    /// Whether the session still exists
    async fn has_session(&self, name: &str) -> Result<bool>;

    /// Destroy the session; a missing session is not an error
    async fn kill(&self, name: &str) -> Result<()>;

    /// Names of all sessions known to the backend
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Get backend name
    fn name(&self) -> &'static str;
}
