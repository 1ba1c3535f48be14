// src/distro/remove.rs

//! Package removal

use super::Distribution;
use crate::db;
use crate::db::models::{Package, PathEntry};
use crate::error::{Error, Result};
use crate::outcome::{MSG_NOT_INSTALLED, Outcome};
use rusqlite::Connection;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// Path depth: `a` is 1, `a/b` is 2
fn depth(path: &str) -> usize {
    path.matches('/').count() + 1
}

/// Remove the given directories below `root`, deepest first
///
/// For every threshold from the deepest level up to 1, each directory at
/// or below the threshold is attempted. Directories that are already gone
/// or still hold something are left alone; any other failure is returned.
pub fn prune_dirs(root: &Path, dirs: &[String]) -> Result<()> {
    let max_depth = dirs.iter().map(|d| depth(d)).max().unwrap_or(0);

    for threshold in (1..=max_depth).rev() {
        for dir in dirs.iter().filter(|d| depth(d) >= threshold) {
            let path = root.join(dir);
            match fs::remove_dir(&path) {
                Ok(()) => debug!("Removed directory {}", dir),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e)
                    if matches!(e.kind(), ErrorKind::DirectoryNotEmpty | ErrorKind::AlreadyExists) => {}
                Err(e) => {
                    return Err(Error::IoError(format!(
                        "Failed to remove directory {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Give directories that survived pruning and lost their record to a
/// package that still owns something inside them
///
/// Returns the number of directories handed over. A surviving directory
/// with no owned path below it holds only foreign files and stays
/// unrecorded.
pub fn adopt_occupied_dirs(conn: &Connection, root: &Path, dirs: &[String]) -> Result<usize> {
    let mut adopted = 0;
    for dir in dirs {
        if !root.join(dir).is_dir() || PathEntry::find_by_path(conn, dir)?.is_some() {
            continue;
        }
        if let Some(owner) = PathEntry::owner_below(conn, dir)? {
            debug!("Directory {} passes to {}", dir, owner);
            PathEntry::new(dir, true, owner).insert(conn)?;
            adopted += 1;
        }
    }
    Ok(adopted)
}

impl Distribution {
    /// Remove an installed package and everything it recorded
    pub fn remove_package(&self, name: &str) -> Result<Outcome> {
        let _lock = self.lock()?;

        let mut conn = self.open_store()?;
        if Package::find(&conn, name)?.is_none() {
            return Ok(Outcome::failed(MSG_NOT_INSTALLED));
        }

        let files = PathEntry::files_of(&conn, name)?;
        let dirs = PathEntry::dirs_of(&conn, name)?;
        let root = self.root();

        db::transaction(&mut conn, |tx| {
            for file in &files {
                match fs::remove_file(root.join(file)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(Error::IoError(format!("Failed to remove {file}: {e}")));
                    }
                }
            }
            prune_dirs(root, &dirs)?;
            Package::delete(tx, name)?;
            adopt_occupied_dirs(tx, root, &dirs)
        })?;

        info!(
            "Removed {} from {} ({} files, {} directories)",
            name,
            self.name(),
            files.len(),
            dirs.len()
        );
        Ok(Outcome::Success)
    }
}
