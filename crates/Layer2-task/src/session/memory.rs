//! In-memory session backend
//!
//! Sessions live until `end` or `kill` is called, which makes liveness
//! fully scriptable from tests.

use super::SessionProvider;
use async_trait::async_trait;
use fleet_foundation::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, Default)]
struct SessionEntry {
    working_dir: PathBuf,
    inputs: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemorySessions {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    fail_create: AtomicBool,
    created: AtomicUsize,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create` calls fail
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Simulate the session's process exiting
    pub fn end(&self, name: &str) -> bool {
        self.sessions.lock().remove(name).is_some()
    }

    /// Register a session as if it survived from an earlier run
    pub fn adopt(&self, name: &str) {
        self.sessions
            .lock()
            .insert(name.to_string(), SessionEntry::default());
    }

    /// Lines typed into the session so far
    pub fn inputs(&self, name: &str) -> Vec<String> {
        self.sessions
            .lock()
            .get(name)
            .map(|s| s.inputs.clone())
            .unwrap_or_default()
    }

    pub fn working_dir(&self, name: &str) -> Option<PathBuf> {
        self.sessions.lock().get(name).map(|s| s.working_dir.clone())
    }

    /// Total sessions ever created
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn live_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl SessionProvider for InMemorySessions {
    async fn create(&self, name: &str, working_dir: &Path) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Session(format!("cannot create session {}", name)));
        }
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(name) {
            return Err(Error::Session(format!("duplicate session: {}", name)));
        }
        sessions.insert(
            name.to_string(),
            SessionEntry {
                working_dir: working_dir.to_path_buf(),
                inputs: Vec::new(),
            },
        );
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_input(&self, name: &str, text: &str) -> Result<()> {
        match self.sessions.lock().get_mut(name) {
            Some(entry) => {
                entry.inputs.push(text.to_string());
                Ok(())
            }
            None => Err(Error::Session(format!("can't find session: {}", name))),
        }
    }

    async fn has_session(&self, name: &str) -> Result<bool> {
        Ok(self.sessions.lock().contains_key(name))
    }

    async fn kill(&self, name: &str) -> Result<()> {
        self.sessions.lock().remove(name);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
