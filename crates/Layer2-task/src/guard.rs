//! Singleton guard
//!
//! One daemon per workspace. The guard holds an exclusive `flock` on
//! `pid/daemon.lock` for its whole lifetime; the file carries the holder's
//! pid. Dropping the guard clears the pid and releases the lock, on every
//! exit path that unwinds. The file itself stays: every contender must lock
//! the same inode.

use fleet_foundation::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct SingletonGuard {
    file: File,
    path: PathBuf,
}

impl SingletonGuard {
    /// Take the workspace lock or fail with `LockContention`
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Don't truncate before holding the lock: that would wipe the
        // running daemon's pid.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if let Err(e) = file.try_lock_exclusive() {
            return Err(match e.kind() {
                ErrorKind::WouldBlock => {
                    let holder = read_pid(path)
                        .map(|pid| format!("pid {}", pid))
                        .unwrap_or_else(|| "unknown pid".to_string());
                    Error::LockContention(format!("{} ({})", path.display(), holder))
                }
                _ => Error::Io(e),
            });
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        debug!("Acquired workspace lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SingletonGuard {
    fn drop(&mut self) {
        // clear the pid while still holding the lock
        if let Err(e) = self.file.set_len(0) {
            warn!("Failed to clear lock file {}: {}", self.path.display(), e);
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release workspace lock: {}", e);
        }
    }
}

/// Pid recorded in a lock file
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether a process with this pid exists
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only performs permission and existence checks
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

/// Ask a running daemon to shut down (SIGTERM)
#[cfg(unix)]
pub fn signal_stop(pid: u32) -> Result<()> {
    // SAFETY: plain kill(2) on a pid read from the lock file
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::Io(std::io::Error::last_os_error()))
    }
}

#[cfg(not(unix))]
pub fn signal_stop(pid: u32) -> Result<()> {
    Err(Error::Internal(format!(
        "stopping pid {} is only supported on unix",
        pid
    )))
}
