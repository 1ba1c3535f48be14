// src/commands/dists.rs
//! Distribution commands

use super::open_repository;
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::info;
use wapkg::Repository;
use wapkg::progress::CliProgress;

/// Install a distribution by name or from an installer archive
pub fn cmd_dist_install(wd: Option<&Path>, source: &str, name: Option<&str>) -> Result<()> {
    let repo = open_repository(wd)?;
    let path = Path::new(source);

    let (outcome, installed) = if path.is_file() {
        info!("Installing distribution from {}", path.display());
        repo.install_dist_from_archive(path, name)?
    } else {
        info!("Installing distribution {}", source);
        let progress = CliProgress::new();
        repo.install_dist_by_name(source, name, &progress)?
    };

    match installed {
        Some(installed) if outcome.is_ok() => {
            println!("Installed distribution: {}", installed);
            Ok(())
        }
        _ => anyhow::bail!("{}: {}", source, outcome),
    }
}

/// Delete a distribution tree
pub fn cmd_dist_exterminate(wd: Option<&Path>, distro: &str, yes: bool) -> Result<()> {
    let repo = open_repository(wd)?;
    let dist = repo
        .get_distribution(distro)
        .with_context(|| format!("No such distro installed: {}", distro))?;

    if !yes {
        print!("Delete {} and everything in {}? [y/N] ", distro, dist.root().display());
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted");
            return Ok(());
        }
    }

    dist.exterminate()?;
    println!("Removed distribution: {}", distro);
    Ok(())
}

/// List installed distributions
pub fn cmd_dists(wd: Option<&Path>) -> Result<()> {
    let repo = open_repository(wd)?;
    let names = repo.list_distributions()?;
    if names.is_empty() {
        println!("No distributions installed in {}", repo.dists_root().display());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// List distributions offered by the sources
pub fn cmd_dists_available(wd: Option<&Path>) -> Result<()> {
    let repo = open_repository(wd)?;
    let names = Repository::available_distributions(&repo.fetch_indices());
    if names.is_empty() {
        println!("No distributions available");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Launch a distribution's executable and wait for it
pub fn cmd_run(wd: Option<&Path>, distro: &str, args: &[String]) -> Result<()> {
    let repo = open_repository(wd)?;
    let dist = repo
        .get_distribution(distro)
        .with_context(|| format!("No such distro installed: {}", distro))?;

    let status = dist.launch(args)?;
    if !status.success() {
        anyhow::bail!("{} exited with {}", dist.executable_path().display(), status);
    }
    Ok(())
}
