// src/repository/download.rs

//! Download staging and checksum verification
//!
//! Payloads are fetched to a uniquely named staging file, verified against
//! the digest the index declares (if any), and handed to the installer.
//! A file that fails verification is removed before the error returns.

use crate::error::{Error, Result};
use crate::hash::{Checksum, verify_file};
use crate::progress::ProgressSink;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::client::Fetcher;

/// Suffix of distribution-level staging files in the working directory
pub const DOWNLOAD_SUFFIX: &str = ".download";

/// A staging file, removed when dropped
#[derive(Debug)]
pub struct StagedDownload {
    path: PathBuf,
}

impl StagedDownload {
    /// Reserve a random file name in `dir`
    pub fn new(dir: &Path, suffix: &str) -> Self {
        Self {
            path: dir.join(format!("{}{}", Uuid::new_v4(), suffix)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedDownload {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staging file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staging file {}: {}", self.path.display(), e),
        }
    }
}

/// Fetch `url` into `staged` and verify it
///
/// Without a declared checksum the payload is accepted as is.
pub fn download_verified(
    fetcher: &dyn Fetcher,
    url: &str,
    staged: &StagedDownload,
    checksum: Option<&Checksum>,
    progress: &dyn ProgressSink,
) -> Result<()> {
    fetcher.fetch_to_file(url, staged.path(), progress)?;

    if let Some(expected) = checksum {
        verify_checksum(staged.path(), expected)?;
        debug!("Verified {} for {}", expected, url);
    }
    Ok(())
}

/// Verify a file, deleting it when the digest disagrees
pub fn verify_checksum(path: &Path, expected: &Checksum) -> Result<()> {
    if let Err(e) = verify_file(path, expected) {
        let _ = fs::remove_file(path);
        return Err(Error::ChecksumMismatch {
            expected: e.expected,
            actual: e.actual,
        });
    }
    Ok(())
}

/// Delete leftover `*.download` files in `dir`
///
/// Returns the number of files removed.
pub fn purge_stale_downloads(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let stale = entry.file_type()?.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(DOWNLOAD_SUFFIX));
        if stale {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Purged {} stale downloads from {}", removed, dir.display());
    }
    Ok(removed)
}
