use std::{
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use fs2::FileExt;
use tracing::{trace, warn};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive cross-process lock backed by a file in the lock directory
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    timeout: Duration,
}

/// Held lock; released when dropped
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn new(lock_dir: &Path, name: &str, timeout: Duration) -> Self {
        Self {
            path: lock_dir.join(format!("{name}.lock")),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is ours or the timeout elapses
    pub fn acquire(&self) -> Result<LockGuard> {
        let lock_error = |source| Error::Lock {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(lock_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(lock_error)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    trace!("Acquired lock {}", self.path.display());
                    return Ok(LockGuard {
                        file,
                        path: self.path.clone(),
                    });
                }
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        return Err(Error::LockTimeout {
                            path: self.path.clone(),
                            timeout: self.timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(lock_error(err)),
            }
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path.display(), err);
        } else {
            trace!("Released lock {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(dir.path(), "test", Duration::from_secs(1));

        let guard = lock.acquire().unwrap();
        drop(guard);

        // Released on drop, so it can be taken again straight away
        lock.acquire().unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_contended_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(dir.path(), "test", Duration::from_millis(200));

        // A second handle on the same file, as another process would hold
        let holder = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock.path())
            .unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        let started = Instant::now();
        let err = lock.acquire().unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));

        FileExt::unlock(&holder).unwrap();
        lock.acquire().unwrap();
    }
}
