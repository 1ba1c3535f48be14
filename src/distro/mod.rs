// src/distro/mod.rs

//! Distributions: managed application trees
//!
//! A directory is a distribution when it carries a `.wadist` marker:
//!
//! ```text
//! <root>/
//!   .wadist/
//!     version       "1"
//!     packages.db   manifest store
//!     cache/        download staging, purged on open and after installs
//!     lock          distribution lock
//!   <payload files>
//! ```
//!
//! Reads go straight to the manifest store. Anything that mutates the tree
//! or the store runs under the distribution lock.

mod install;
mod remove;

pub use install::{IndexCache, InstallContext};
pub use remove::{adopt_occupied_dirs, prune_dirs};

use crate::db;
use crate::db::models::Package;
use crate::error::{Error, Result};
use crate::lock::FileLock;
use crate::version::VersionProber;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Marker directory inside a distribution root
pub const MARKER_DIR: &str = ".wadist";

/// Format version file inside the marker directory
pub const FORMAT_FILE: &str = "version";

/// Manifest store file inside the marker directory
pub const STORE_FILE: &str = "packages.db";

/// Staging cache directory inside the marker directory
pub const CACHE_DIR: &str = "cache";

/// Lock file inside the marker directory
pub const LOCK_FILE: &str = "lock";

/// The only on-disk distribution format understood
pub const DIST_FORMAT_VERSION: &str = "1";

/// Whether `root` carries a distribution marker
pub fn is_distribution(root: &Path) -> bool {
    root.join(MARKER_DIR).is_dir()
}

/// Lay out an empty distribution marker under `root`
pub fn create_marker(root: &Path) -> Result<()> {
    let marker = root.join(MARKER_DIR);
    fs::create_dir_all(marker.join(CACHE_DIR))?;
    fs::write(marker.join(FORMAT_FILE), DIST_FORMAT_VERSION)?;
    db::init(marker.join(STORE_FILE))?;
    debug!("Created distribution marker in {}", root.display());
    Ok(())
}

/// One managed distribution
pub struct Distribution {
    name: String,
    root: PathBuf,
    executable: String,
    prober: Arc<dyn VersionProber>,
    version: OnceLock<Option<String>>,
}

impl std::fmt::Debug for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distribution")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Distribution {
    /// Open the distribution rooted at `root`
    ///
    /// Fails when the marker is missing, the format version is not
    /// supported, or the manifest store cannot be opened.
    pub fn open(
        root: impl Into<PathBuf>,
        executable: impl Into<String>,
        prober: Arc<dyn VersionProber>,
    ) -> Result<Self> {
        let root = root.into();
        let marker = root.join(MARKER_DIR);
        if !marker.is_dir() {
            return Err(Error::NotFoundError(format!(
                "{} does not exist or is not a distribution",
                root.display()
            )));
        }

        let found = fs::read_to_string(marker.join(FORMAT_FILE)).map_err(|e| {
            Error::InitError(format!("Cannot read distribution format of {}: {e}", root.display()))
        })?;
        if found.trim() != DIST_FORMAT_VERSION {
            return Err(Error::FormatVersion {
                what: "distribution",
                found: found.trim().to_string(),
            });
        }

        // Fails early on a missing or newer store
        db::open(marker.join(STORE_FILE))?;
        fs::create_dir_all(marker.join(CACHE_DIR))?;

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        let dist = Self {
            name,
            root,
            executable: executable.into(),
            prober,
            version: OnceLock::new(),
        };

        // Someone else mutating the distribution owns the cache right now
        match FileLock::try_acquire(dist.lock_path())? {
            Some(_lock) => dist.clean_cache_locked()?,
            None => debug!("{} is busy, leaving its staging cache alone", dist.name),
        }

        Ok(dist)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn marker(&self) -> PathBuf {
        self.root.join(MARKER_DIR)
    }

    pub(crate) fn cache_dir(&self) -> PathBuf {
        self.marker().join(CACHE_DIR)
    }

    fn lock_path(&self) -> PathBuf {
        self.marker().join(LOCK_FILE)
    }

    pub(crate) fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(self.lock_path())
    }

    pub(crate) fn open_store(&self) -> Result<Connection> {
        db::open(self.marker().join(STORE_FILE))
    }

    /// Path of the executable probed for the version
    pub fn executable_path(&self) -> PathBuf {
        self.root.join(&self.executable)
    }

    /// Application version, probed once and then memoized
    pub fn version_string(&self) -> Option<&str> {
        self.version
            .get_or_init(|| self.prober.probe(&self.executable_path()))
            .as_deref()
    }

    /// Installed package names, ordered by name
    pub fn list_packages(&self) -> Result<Vec<String>> {
        Ok(self.packages()?.into_iter().map(|p| p.name).collect())
    }

    /// Installed packages with revisions, ordered by name
    pub fn packages(&self) -> Result<Vec<Package>> {
        let conn = self.open_store()?;
        Package::list_all(&conn)
    }

    /// Installed revision of `name`
    pub fn revision(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.open_store()?;
        Package::revision_of(&conn, name)
    }

    /// Delete every file in the staging cache
    pub fn clean_cache(&self) -> Result<()> {
        let _lock = self.lock()?;
        self.clean_cache_locked()
    }

    pub(crate) fn clean_cache_locked(&self) -> Result<()> {
        let cache = self.cache_dir();
        let mut removed = 0;
        for entry in fs::read_dir(&cache)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
            removed += 1;
        }
        if removed > 0 {
            debug!("Cleaned {} staged files from {}", removed, cache.display());
        }
        Ok(())
    }

    /// Run the distribution executable with `args`, discarding its output
    ///
    /// Outside Windows the executable is started through `wine`.
    pub fn launch(&self, args: &[String]) -> Result<std::process::ExitStatus> {
        let executable = self.executable_path();
        if !executable.is_file() {
            return Err(Error::NotFoundError(format!(
                "{} has no {}",
                self.name, self.executable
            )));
        }

        let mut command = if cfg!(windows) {
            Command::new(&executable)
        } else {
            let mut wine = Command::new("wine");
            wine.arg(&executable);
            wine
        };
        command
            .args(args)
            .current_dir(&self.root)
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        info!("Launching {}", executable.display());
        command
            .status()
            .map_err(|e| Error::IoError(format!("Failed to launch {}: {e}", executable.display())))
    }

    /// Delete the whole distribution tree
    pub fn exterminate(self) -> Result<()> {
        let lock = self.lock()?;
        info!("Exterminating distribution {} at {}", self.name, self.root.display());
        // The lock file lives inside the tree
        drop(lock);
        fs::remove_dir_all(&self.root).map_err(|e| {
            warn!("Failed to remove {}: {}", self.root.display(), e);
            Error::IoError(format!("Failed to remove {}: {e}", self.root.display()))
        })
    }
}
