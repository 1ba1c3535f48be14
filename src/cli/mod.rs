// src/cli/mod.rs
//! CLI definitions for wapkg
//!
//! The command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wapkg")]
#[command(author, version)]
#[command(about = "Package manager for independently versioned application distributions", long_about = None)]
pub struct Cli {
    /// Repository working directory (default: per-user data directory,
    /// or the current directory when a `portable` file is present)
    #[arg(long, global = true)]
    pub wd: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the working directory and default settings
    Init {
        /// Source to configure in a fresh settings file
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// Install packages into a distribution
    Install {
        /// Target distribution
        distro: String,

        /// Package names, or paths of package archives
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Remove packages from a distribution
    Remove {
        /// Target distribution
        distro: String,

        /// Installed package names
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Install a distribution from the sources or from an installer archive
    DistInstall {
        /// Distribution name, or path of an installer archive
        source: String,

        /// Name of the new distribution (default: the installer's
        /// suggested name)
        name: Option<String>,
    },

    /// Delete a distribution and everything in it
    DistExterminate {
        distro: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List installed packages of a distribution
    Packages { distro: String },

    /// List packages the sources offer for a distribution
    PackagesAvailable { distro: String },

    /// List installed distributions
    Dists,

    /// List distributions the sources offer
    DistsAvailable,

    /// Show or edit the configured sources
    Sources {
        /// Add a source URL
        #[arg(long)]
        add: Vec<String>,

        /// Remove a source URL
        #[arg(long)]
        remove: Vec<String>,
    },

    /// Launch a distribution's executable
    Run {
        distro: String,

        /// Arguments passed to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run the WapkgQuack UDP daemon
    Daemon {
        /// Address to listen on
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Port to listen on (overrides the port of --listen)
        #[arg(short, long)]
        port: Option<u16>,

        /// Maximum number of requests handled at once
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print the tool version
    Version,
}
