// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let wd = cli.wd.as_deref();

    match cli.command {
        Some(Commands::Init { sources }) => commands::cmd_init(wd, &sources),
        Some(Commands::Install { distro, packages }) => commands::cmd_install(wd, &distro, &packages),
        Some(Commands::Remove { distro, packages }) => commands::cmd_remove(wd, &distro, &packages),
        Some(Commands::DistInstall { source, name }) => {
            commands::cmd_dist_install(wd, &source, name.as_deref())
        }
        Some(Commands::DistExterminate { distro, yes }) => {
            commands::cmd_dist_exterminate(wd, &distro, yes)
        }
        Some(Commands::Packages { distro }) => commands::cmd_packages(wd, &distro),
        Some(Commands::PackagesAvailable { distro }) => commands::cmd_packages_available(wd, &distro),
        Some(Commands::Dists) => commands::cmd_dists(wd),
        Some(Commands::DistsAvailable) => commands::cmd_dists_available(wd),
        Some(Commands::Sources { add, remove }) => commands::cmd_sources(wd, &add, &remove),
        Some(Commands::Run { distro, args }) => commands::cmd_run(wd, &distro, &args),
        Some(Commands::Daemon {
            listen,
            port,
            workers,
        }) => commands::cmd_daemon(wd, listen, port, workers),
        Some(Commands::Version) => {
            println!("{}", wapkg::version::tool_version());
            Ok(())
        }
        None => {
            println!("{}", wapkg::version::tool_version());
            println!("Run 'wapkg --help' for usage information");
            Ok(())
        }
    }
}
