// src/commands/sources.rs
//! Working directory and source list commands

use super::{open_repository, working_directory};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use wapkg::settings::{SETTINGS_FILE, Settings};

/// Create the working directory and its settings
pub fn cmd_init(wd: Option<&Path>, sources: &[String]) -> Result<()> {
    let wd = working_directory(wd)?;
    info!("Initializing repository at {}", wd.display());

    std::fs::create_dir_all(&wd)
        .with_context(|| format!("Failed to create {}", wd.display()))?;
    let settings = Settings::load_or_create(&wd.join(SETTINGS_FILE), sources)?;

    let repo = open_repository(Some(&wd))?;
    println!("Repository initialized at: {}", repo.working_dir().display());
    println!("  Sources: {}", settings.sources.len());
    Ok(())
}

/// Print the effective sources, after applying additions and removals
pub fn cmd_sources(wd: Option<&Path>, add: &[String], remove: &[String]) -> Result<()> {
    let repo = open_repository(wd)?;

    if !add.is_empty() || !remove.is_empty() {
        repo.update_settings(|settings| {
            for source in add {
                if !settings.add_source(source) {
                    println!("Already configured: {}", source);
                }
            }
            for source in remove {
                if !settings.remove_source(source) {
                    println!("Not configured: {}", source);
                }
            }
        })?;
    }

    let sources = repo.sources();
    if sources.is_empty() {
        println!("No sources configured");
    } else {
        for source in sources {
            println!("{}", source);
        }
    }
    Ok(())
}
