// src/lock.rs

//! Exclusive file locks
//!
//! Used for two things:
//! - **Distribution lock**: `<dist>/.wadist/lock`, held around every
//!   operation that mutates a distribution's tree or manifest store
//! - **Daemon lock**: `<wd>/daemon.lock`, held for the daemon's lifetime
//!
//! The lock is an `flock(LOCK_EX)` (or `LockFileEx` on Windows) on an open
//! handle, so it excludes other threads of this process as well as other
//! processes.

use crate::Result;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock, released on drop
#[derive(Debug)]
pub struct FileLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
    pid_file: bool,
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    Ok(file)
}

impl FileLock {
    /// Acquire the lock, blocking until it is available
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        file.lock_exclusive()
            .map_err(|e| crate::Error::IoError(format!("Failed to acquire lock {}: {e}", path.display())))?;

        debug!("Acquired lock at {}", path.display());
        Ok(Self {
            file,
            path,
            pid_file: false,
        })
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when someone else holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired lock at {}", path.display());
                Ok(Some(Self {
                    file,
                    path,
                    pid_file: false,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Lock already held at {}", path.display());
                Ok(None)
            }
            Err(e) => {
                // fs2 reports contention on some platforms with a different
                // error kind than WouldBlock
                if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    Ok(None)
                } else {
                    Err(crate::Error::IoError(format!(
                        "Failed to try-acquire lock {}: {e}",
                        path.display()
                    )))
                }
            }
        }
    }

    /// Whether anyone currently holds the lock at `path`
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        if !path.exists() {
            return false;
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return false,
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded next to the lock by its holder, if any
    pub fn holder_pid<P: AsRef<Path>>(lock_path: P) -> Option<u32> {
        let pid_path = lock_path.as_ref().with_extension("pid");
        fs::read_to_string(&pid_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Record our PID next to the lock; removed again on drop
    pub fn write_pid(&mut self) -> Result<()> {
        let pid_path = self.path.with_extension("pid");
        fs::write(&pid_path, std::process::id().to_string())?;
        self.pid_file = true;
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.pid_file {
            let _ = fs::remove_file(self.path.with_extension("pid"));
        }
        debug!("Released lock at {}", self.path.display());
    }
}
