// src/commands/packages.rs
//! Package commands

use super::open_repository;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use wapkg::index::available_packages;
use wapkg::progress::CliProgress;
use wapkg::{Distribution, Outcome, Repository};

fn open_distribution(repo: &Repository, distro: &str) -> Result<Distribution> {
    repo.get_distribution(distro)
        .with_context(|| format!("No such distro installed: {}", distro))
}

/// Print an outcome line; returns false for a failure
fn report(package: &str, outcome: &Outcome) -> bool {
    match outcome {
        Outcome::Success => {
            println!("{}: installed", package);
            true
        }
        Outcome::Satisfied(msg) => {
            println!("{}: {}", package, msg);
            true
        }
        Outcome::Failed(msg) => {
            eprintln!("{}: {}", package, msg);
            false
        }
    }
}

/// Install packages by name or from archive files
pub fn cmd_install(wd: Option<&Path>, distro: &str, packages: &[String]) -> Result<()> {
    let repo = open_repository(wd)?;
    let dist = open_distribution(&repo, distro)?;
    let sources = repo.sources();

    let mut failed = 0;
    for package in packages {
        info!("Installing {} into {}", package, distro);
        let path = Path::new(package);
        let result = if path.is_file() {
            dist.install_from_archive(path)
        } else {
            let progress = CliProgress::new();
            let mut ctx = repo.install_context(&sources).with_progress(&progress);
            dist.install_by_name(package, &mut ctx)
        };
        let outcome = result.with_context(|| format!("Failed to install {}", package))?;

        if !report(package, &outcome) {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} packages could not be installed", failed, packages.len());
    }
    Ok(())
}

/// Remove installed packages
pub fn cmd_remove(wd: Option<&Path>, distro: &str, packages: &[String]) -> Result<()> {
    let repo = open_repository(wd)?;
    let dist = open_distribution(&repo, distro)?;

    let mut failed = 0;
    for package in packages {
        info!("Removing {} from {}", package, distro);
        let outcome = dist
            .remove_package(package)
            .with_context(|| format!("Failed to remove {}", package))?;
        match outcome {
            Outcome::Success => println!("{}: removed", package),
            other => {
                eprintln!("{}: {}", package, other);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} packages could not be removed", failed, packages.len());
    }
    Ok(())
}

/// List installed packages
pub fn cmd_packages(wd: Option<&Path>, distro: &str) -> Result<()> {
    let repo = open_repository(wd)?;
    let dist = open_distribution(&repo, distro)?;

    let packages = dist.packages()?;
    if packages.is_empty() {
        println!("No packages installed in {}", distro);
    }
    for package in packages {
        println!("{}:{}", package.name, package.revision);
    }
    Ok(())
}

/// List packages installable into a distribution
pub fn cmd_packages_available(wd: Option<&Path>, distro: &str) -> Result<()> {
    let repo = open_repository(wd)?;
    let dist = open_distribution(&repo, distro)?;

    let indices = repo.fetch_indices();
    if indices.is_empty() {
        println!("No reachable sources");
        return Ok(());
    }

    for package in available_packages(&indices, dist.version_string()) {
        println!("{}:{}", package.name, package.revision_label());
    }
    Ok(())
}
