//! Cross-process file lock
//!
//! Mutual exclusion by exclusive creation of a lock file. Acquisition
//! retries with a fixed backoff until a timeout; release deletes the file.

use crate::error::LockError;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Acquisition timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(50),
        }
    }
}

/// A held lock; released explicitly or on drop
#[derive(Debug)]
#[must_use = "the lock is released when dropped"]
pub struct FileLock {
    path: PathBuf,
    released: bool,
}

/// "Lock held by someone else" across platforms
fn is_contended(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::AlreadyExists | ErrorKind::PermissionDenied)
}

impl FileLock {
    /// Single attempt; `Ok(None)` when the lock is held elsewhere
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>, LockError> {
        let path = path.as_ref();
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // holder pid for diagnostics only
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Some(Self {
                    path: path.to_path_buf(),
                    released: false,
                }))
            }
            Err(e) if is_contended(e.kind()) => Ok(None),
            Err(source) => Err(LockError::LockFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Retry until acquired or `options.timeout` elapses
    pub fn acquire(path: impl AsRef<Path>, options: LockOptions) -> Result<Self, LockError> {
        let path = path.as_ref();
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            let waited = start.elapsed();
            if waited >= options.timeout {
                return Err(LockError::AlreadyLocked {
                    path: path.to_path_buf(),
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tracing::debug!(path = %path.display(), "Lock contended, retrying");
            std::thread::sleep(options.retry_interval.min(options.timeout - waited));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the lock file
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        std::fs::remove_file(&self.path).map_err(|source| LockError::UnlockFailed {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to release lock on drop");
            }
        }
    }
}

/// Acquire a lock at `path`
pub fn acquire_lock(path: impl AsRef<Path>, options: LockOptions) -> Result<FileLock, LockError> {
    FileLock::acquire(path, options)
}

/// Run `f` while holding the lock at `path`
///
/// The lock is released on every exit path, including panics. A release
/// failure is reported only when `f` itself succeeded.
pub fn with_lock<T, E, F>(path: impl AsRef<Path>, options: LockOptions, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<LockError>,
{
    let lock = FileLock::acquire(path, options)?;
    let result = f();
    match (result, lock.release()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), release) => {
            if let Err(release_err) = release {
                tracing::warn!(error = %release_err, "Lock release failed after error");
            }
            Err(e)
        }
    }
}
