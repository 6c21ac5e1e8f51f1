//! Lock file management for single-instance enforcement.
//!
//! Only one daemon may own the IPC sockets and the state file. The lock lives
//! at `$XDG_RUNTIME_DIR/nightshade.lock` and contains the owner's PID on the
//! first line and its config directory (possibly empty) on the second.

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::utils;
use crate::config;

/// Held lock; released when dropped.
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Default lock path in the runtime directory.
pub fn lock_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join("nightshade.lock")
}

/// Acquire the single-instance lock at `path`.
///
/// A lock left behind by a dead process is cleaned up and retried once; a
/// lock held by a live process is an error naming its PID.
pub fn acquire_lock(path: &Path) -> Result<LockFile> {
    match try_lock(path)? {
        Some(lock) => Ok(lock),
        None => {
            resolve_conflict(path)?;
            try_lock(path)?
                .with_context(|| format!("Failed to acquire lock {} after cleanup", path.display()))
        }
    }
}

fn try_lock(path: &Path) -> Result<Option<LockFile>> {
    // Open without truncating to preserve the current owner's content
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(&file, "{}", std::process::id())?;
    match config::get_custom_config_dir() {
        Some(dir) => writeln!(&file, "{}", dir.display())?,
        None => writeln!(&file)?,
    }
    file.flush()?;

    Ok(Some(LockFile {
        file,
        path: path.to_path_buf(),
    }))
}

/// Decide what to do about a held lock.
///
/// Returns `Ok(())` when the lock turned out to be stale and was removed.
fn resolve_conflict(path: &Path) -> Result<()> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        // Vanished in between, nothing to resolve
        Err(_) => return Ok(()),
    };

    let pid = content
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<u32>().ok());

    match pid {
        Some(pid) if utils::is_process_running(pid) => {
            bail!("nightshade is already running (PID: {pid})")
        }
        Some(pid) => {
            log_warning!("Removing stale lock file (process {pid} no longer running)");
        }
        None => {
            log_warning!("Lock file contains invalid PID, removing stale lock");
        }
    }
    let _ = std::fs::remove_file(path);
    Ok(())
}
