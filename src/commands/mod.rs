// src/commands/mod.rs
//! Command handlers for the wapkg CLI

mod daemon;
mod dists;
mod packages;
mod sources;

pub use daemon::cmd_daemon;
pub use dists::{cmd_dist_exterminate, cmd_dist_install, cmd_dists, cmd_dists_available, cmd_run};
pub use packages::{cmd_install, cmd_packages, cmd_packages_available, cmd_remove};
pub use sources::{cmd_init, cmd_sources};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use wapkg::Repository;

/// Working directory from `--wd`, or the default one
pub fn working_directory(wd: Option<&Path>) -> Result<PathBuf> {
    match wd {
        Some(wd) => Ok(wd.to_path_buf()),
        None => wapkg::settings::working_directory().context("Failed to locate the working directory"),
    }
}

/// Open the repository the CLI operates on
pub fn open_repository(wd: Option<&Path>) -> Result<Repository> {
    let wd = working_directory(wd)?;
    Repository::open_at(&wd).with_context(|| format!("Failed to open repository at {}", wd.display()))
}
