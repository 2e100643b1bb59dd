//! File-based advisory lock preventing concurrent sync runs.
//!
//! The orgplan file is the only cross-process shared resource; a lock file
//! beside it guards a whole run. A lock older than the staleness threshold is
//! assumed to be left over from a crashed run and is broken.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::LockError;

/// Default staleness threshold: one hour.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

/// Run-scoped advisory lock.
pub struct SyncLock {
    path: PathBuf,
    stale_after: Duration,
}

/// Guard holding an acquired lock. Releasing happens on drop, so every exit
/// path (including `?` propagation and panics) releases the lock.
#[derive(Debug)]
pub struct SyncLockGuard {
    path: PathBuf,
}

impl SyncLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Conventional lock path for a scope file: `.orgsync.lock` in the same
    /// directory.
    pub fn for_scope_file(scope_file: &Path) -> Self {
        let dir = scope_file.parent().unwrap_or_else(|| Path::new("."));
        Self::new(dir.join(".orgsync.lock"))
    }

    /// Try to acquire the lock. Does not wait: a live lock held by another
    /// process is an immediate error.
    pub fn acquire(&self) -> Result<SyncLockGuard, LockError> {
        if self.path.exists() {
            if self.is_stale() {
                tracing::warn!("removing stale lock file {}", self.path.display());
                fs::remove_file(&self.path).map_err(|source| LockError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            } else {
                return Err(LockError::Held(self.path.clone()));
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: self.path.clone(),
                source,
            })?;
        }

        let contents = format!(
            "PID: {}\nStarted: {}\n",
            std::process::id(),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        fs::write(&self.path, contents).map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!("acquired lock {}", self.path.display());
        Ok(SyncLockGuard {
            path: self.path.clone(),
        })
    }

    fn is_stale(&self) -> bool {
        let age = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
        match age {
            Some(age) => age > self.stale_after,
            // Unreadable metadata: treat as live and let the hold error surface.
            None => false,
        }
    }
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::error!("failed to remove lock file {}: {err}", self.path.display());
            }
        } else {
            tracing::debug!("released lock {}", self.path.display());
        }
    }
}
