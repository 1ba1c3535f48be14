// src/commands/daemon.rs
//! Daemon command

use super::open_repository;
use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use wapkg::daemon::{DaemonConfig, run_daemon, running_daemon_pid};

/// Run the UDP daemon in the foreground
pub fn cmd_daemon(
    wd: Option<&Path>,
    listen: Option<SocketAddr>,
    port: Option<u16>,
    workers: Option<usize>,
) -> Result<()> {
    let repo = open_repository(wd)?;
    let mut config = DaemonConfig::for_repository(&repo);

    if let Some(pid) = running_daemon_pid(&config) {
        anyhow::bail!("A daemon is already running for this repository (pid {})", pid);
    }

    if let Some(listen) = listen {
        config = config.with_listen(listen);
    }
    if let Some(port) = port {
        config.listen.set_port(port);
    }
    if let Some(workers) = workers {
        config = config.with_workers(workers);
    }

    println!("Listening on {}", config.listen);
    run_daemon(config, repo)?;
    Ok(())
}
