// src/daemon/mod.rs

//! WapkgQuack daemon
//!
//! A UDP front end over a single shared [`Repository`]:
//!
//! ```text
//! client ── wq/0.1;install;stock;pak ──►  poll loop ── spawn ──► worker
//!                                                                 │
//! subscribers ◄── quack!packages-changed ── broadcaster ◄─────────┘
//! ```
//!
//! The poll loop only reads and parses datagrams. Each valid request is
//! handled on a blocking worker, bounded by a semaphore. Notifications go
//! through one channel to a broadcaster task that sends them to every
//! current subscriber, not only to the requester.
//!
//! Only one daemon may run per working directory; this is enforced with a
//! [`FileLock`] on `<wd>/daemon.lock`.

pub mod handler;
pub mod protocol;
pub mod subscribers;

pub use handler::Handler;
pub use protocol::{MAX_DATAGRAM, NOTIFICATION_TAG, Notification, PROTOCOL_TAG, Request};
pub use subscribers::Subscribers;

use crate::error::{Error, Result};
use crate::lock::FileLock;
use crate::repository::Repository;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

/// Default UDP port
pub const DEFAULT_PORT: u16 = 16723;

/// Daemon lock file inside the working directory
pub const DAEMON_LOCK_FILE: &str = "daemon.lock";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Address the socket binds to (default: 127.0.0.1:16723)
    pub listen: SocketAddr,
    /// Upper bound of a single readiness wait; also how quickly a
    /// shutdown request is noticed
    pub poll_interval: Duration,
    /// Maximum number of requests handled at once
    pub max_workers: usize,
    /// Daemon lock path
    pub lock_path: PathBuf,
}

impl DaemonConfig {
    /// Defaults for a repository rooted at `wd`
    pub fn for_working_dir(wd: &Path) -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            poll_interval: Duration::from_secs(1),
            max_workers: 8,
            lock_path: wd.join(DAEMON_LOCK_FILE),
        }
    }

    pub fn for_repository(repo: &Repository) -> Self {
        Self::for_working_dir(repo.working_dir())
    }

    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// PID of the daemon serving the working directory of `config`, if any
pub fn running_daemon_pid(config: &DaemonConfig) -> Option<u32> {
    if FileLock::is_held(&config.lock_path) {
        FileLock::holder_pid(&config.lock_path)
    } else {
        None
    }
}

/// Run the daemon until interrupted
///
/// Blocks the calling thread. Fails when another daemon already holds the
/// lock or the socket cannot be bound.
pub fn run_daemon(config: DaemonConfig, repo: Repository) -> Result<()> {
    let mut lock = match FileLock::try_acquire(&config.lock_path)? {
        Some(lock) => lock,
        None => {
            let holder = FileLock::holder_pid(&config.lock_path)
                .map(|pid| format!(" (pid {pid})"))
                .unwrap_or_default();
            return Err(Error::InitError(format!(
                "Another daemon is already running for {}{holder}",
                config.lock_path.display()
            )));
        }
    };
    lock.write_pid()?;

    info!("Starting {} daemon, pid {}", crate::version::tool_version(), std::process::id());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::InitError(format!("Failed to create async runtime: {e}")))?;

    let repo = Arc::new(repo);
    let shutdown = Arc::new(AtomicBool::new(false));
    let result = runtime.block_on(async {
        let socket = UdpSocket::bind(config.listen)
            .await
            .map_err(|e| Error::InitError(format!("Failed to bind {}: {e}", config.listen)))?;

        let flag = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                flag.store(true, Ordering::SeqCst);
            }
        });

        serve(socket, repo.clone(), &config, shutdown.clone()).await
    });

    // Workers stuck in a download are not waited for
    runtime.shutdown_timeout(Duration::from_secs(5));
    drop(repo);
    info!("Daemon stopped");
    drop(lock);
    result
}

/// Serve requests on `socket` until `shutdown` is set
pub async fn serve(
    socket: UdpSocket,
    repo: Arc<Repository>,
    config: &DaemonConfig,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let socket = Arc::new(socket);
    let subscribers = Arc::new(Subscribers::new());
    let (notify, mut notifications) = mpsc::unbounded_channel::<Notification>();
    let handler = Arc::new(Handler::new(repo, subscribers.clone(), notify.clone()));
    let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));

    let broadcaster = {
        let socket = socket.clone();
        let subscribers = subscribers.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                let payload = notification.encode();
                for addr in subscribers.snapshot() {
                    if let Err(e) = socket.send_to(payload.as_bytes(), addr).await {
                        warn!(subscriber = %addr, "Failed to send {}: {}", notification.kind(), e);
                    }
                }
            }
        })
    };

    match socket.local_addr() {
        Ok(addr) => info!(listen = %addr, "Daemon ready"),
        Err(e) => warn!("Daemon ready, local address unknown: {}", e),
    }

    let mut buf = vec![0u8; MAX_DATAGRAM];
    while !shutdown.load(Ordering::SeqCst) {
        let (len, peer) =
            match tokio::time::timeout(config.poll_interval, socket.recv_from(&mut buf)).await {
                Err(_) => continue,
                Ok(Err(e)) => {
                    // ICMP port-unreachable from a gone subscriber surfaces here on some platforms
                    debug!("Receive failed: {}", e);
                    continue;
                }
                Ok(Ok(received)) => received,
            };

        let request = match Request::parse(&buf[..len]) {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = %peer, "Dropping datagram: {}", e);
                continue;
            }
        };

        let command = request.command();
        debug!(peer = %peer, command, "Dispatching request");

        let handler = handler.clone();
        let workers = workers.clone();
        let notify = notify.clone();
        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            match tokio::task::spawn_blocking(move || handler.handle(request, peer)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(peer = %peer, command, "Request failed: {}", e);
                    let _ = notify.send(Notification::Text(format!("{command} failed: {e}")));
                }
                Err(e) => {
                    error!(peer = %peer, command, "Worker panicked: {}", e);
                    let _ = notify.send(Notification::Text(format!(
                        "internal error while handling {command}"
                    )));
                }
            }
        });
    }

    info!("Daemon shutting down");
    broadcaster.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let temp = TempDir::new().unwrap();
        let config = DaemonConfig::for_working_dir(temp.path()).with_workers(0);

        assert_eq!(config.listen.port(), DEFAULT_PORT);
        assert!(config.listen.ip().is_loopback());
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.lock_path, temp.path().join("daemon.lock"));
        assert_eq!(running_daemon_pid(&config), None);
    }

    #[test]
    fn test_second_daemon_refused() {
        let temp = TempDir::new().unwrap();
        let config = DaemonConfig::for_working_dir(temp.path());
        let _held = FileLock::try_acquire(&config.lock_path).unwrap().unwrap();

        let repo = Repository::open_at(temp.path()).unwrap();
        assert!(matches!(run_daemon(config, repo), Err(Error::InitError(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serve_broadcasts_to_subscribers() {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(Repository::open_at(temp.path()).unwrap());
        let config = DaemonConfig::for_working_dir(temp.path())
            .with_poll_interval(Duration::from_millis(50));

        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_port = client.local_addr().unwrap().port();

        let shutdown = Arc::new(AtomicBool::new(false));
        let serving = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(server, repo, &config, shutdown).await })
        };

        let subscribe = format!("wq/0.1;subscribe;127.0.0.1;{client_port}");
        client.send_to(subscribe.as_bytes(), server_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        client.send_to(b"garbage", server_addr).await.unwrap();
        client.send_to(b"wq/0.1;dists", server_addr).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"quack!dists\n");

        shutdown.store(true, Ordering::SeqCst);
        serving.await.unwrap().unwrap();
    }
}
