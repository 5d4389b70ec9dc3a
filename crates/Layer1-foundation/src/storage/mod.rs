//! Storage module for Fleet
//!
//! - `json`: JSON - 범용 파일 저장/로드 (설정, 태스크 레코드)
//! - `atomic_write`: temp + rename, readers never see a partial file

mod json;

use crate::{Error, Result};
use std::path::Path;

// JSON Storage (범용)
pub use json::JsonStore;

/// Atomically replace `path` with `contents` using write-to-temp + rename.
///
/// The temp file lives in the same directory so the rename never crosses a
/// filesystem boundary.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("Invalid path: {}", path.display())))?;

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown"),
        std::process::id()
    ));

    std::fs::write(&temp_path, contents).map_err(|e| {
        Error::Storage(format!(
            "Failed to write temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Storage(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        )));
    }

    Ok(())
}

/// Remove a file, treating "already gone" as success
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Storage(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
