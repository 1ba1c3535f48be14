// src/daemon/handler.rs

//! Request dispatch
//!
//! Runs on a blocking worker. Every result is pushed to the subscribers
//! through the notification channel; nothing is sent back to the
//! requester directly.

use super::protocol::{Notification, Request};
use super::subscribers::Subscribers;
use crate::error::Result;
use crate::outcome::Outcome;
use crate::distro::IndexCache;
use crate::index::{RemoteIndex, available_packages};
use crate::progress::{CallbackProgress, LogProgress, ProgressSink};
use crate::repository::Repository;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Shared daemon state plus the dispatch logic
pub struct Handler {
    repo: Arc<Repository>,
    subscribers: Arc<Subscribers>,
    /// Filled only by `update-index`
    index_cache: RwLock<Vec<RemoteIndex>>,
    notify: UnboundedSender<Notification>,
}

impl Handler {
    pub fn new(
        repo: Arc<Repository>,
        subscribers: Arc<Subscribers>,
        notify: UnboundedSender<Notification>,
    ) -> Self {
        Self {
            repo,
            subscribers,
            index_cache: RwLock::new(Vec::new()),
            notify,
        }
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    fn send(&self, notification: Notification) {
        if self.notify.send(notification).is_err() {
            debug!("Notification channel closed");
        }
    }

    fn send_text(&self, text: impl Into<String>) {
        self.send(Notification::Text(text.into()));
    }

    fn cached_indices(&self) -> Vec<RemoteIndex> {
        self.index_cache
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Cached indices, or a fresh fetch when nothing is cached
    fn indices(&self) -> Vec<RemoteIndex> {
        let cached = self.cached_indices();
        if cached.is_empty() {
            self.repo.fetch_indices()
        } else {
            cached
        }
    }

    /// Handle one request sent by `peer`
    pub fn handle(&self, request: Request, peer: SocketAddr) -> Result<()> {
        debug!(peer = %peer, command = request.command(), "Handling request");

        match request {
            Request::Subscribe(addr) => {
                if addr.ip() != peer.ip() {
                    warn!(peer = %peer, declared = %addr, "Ignoring subscription for another host");
                    return Ok(());
                }
                self.subscribers.subscribe(addr);
            }
            Request::Unsubscribe(addr) => {
                self.subscribers.unsubscribe(addr);
            }
            Request::UpdateIndex => self.update_index(),
            Request::Install { distro, packages } => self.install(&distro, &packages)?,
            Request::Remove { distro, packages } => self.remove(&distro, &packages)?,
            Request::DistInstall {
                source,
                name,
                token,
            } => self.dist_install(&source, name.as_deref(), token)?,
            Request::Packages(distro) => {
                if let Some(packages) = self.package_list(&distro)? {
                    self.send(Notification::Packages { distro, packages });
                }
            }
            Request::PackagesAvailable(distro) => self.packages_available(distro)?,
            Request::Dists => self.send(Notification::Dists(self.repo.list_distributions()?)),
            Request::DistsAvailable => {
                let names = Repository::available_distributions(&self.indices());
                self.send(Notification::DistsAvailable(names));
            }
            Request::Wd => self.send(Notification::Wd(
                self.repo.working_dir().display().to_string(),
            )),
            Request::Sources => self.send(Notification::Sources(self.repo.sources())),
            Request::PushSources(sources) => {
                self.repo.set_sources(sources)?;
                self.send(Notification::Sources(self.repo.sources()));
            }
        }
        Ok(())
    }

    fn update_index(&self) {
        let indices = self.repo.fetch_indices();
        let count = indices.len();
        *self.index_cache.write().unwrap_or_else(|p| p.into_inner()) = indices;
        info!("Index cache refreshed ({} sources)", count);
        self.send(Notification::IndexUpdated(count));
    }

    /// Installed packages of `distro`, or `None` (after telling the
    /// subscribers) when there is no such distribution
    fn package_list(&self, distro: &str) -> Result<Option<Vec<(String, i64)>>> {
        if !self.repo.list_distributions()?.iter().any(|d| d == distro) {
            self.send_text(format!("No such distro installed: {distro}"));
            return Ok(None);
        }
        let packages = self
            .repo
            .get_distribution(distro)?
            .packages()?
            .into_iter()
            .map(|p| (p.name, p.revision))
            .collect();
        Ok(Some(packages))
    }

    fn send_packages_changed(&self, distro: &str) -> Result<()> {
        if let Some(packages) = self.package_list(distro)? {
            self.send(Notification::PackagesChanged {
                distro: distro.to_string(),
                packages,
            });
        }
        Ok(())
    }

    fn install(&self, distro: &str, packages: &[String]) -> Result<()> {
        if !self.repo.list_distributions()?.iter().any(|d| d == distro) {
            self.send_text(format!("No such distro installed: {distro}"));
            return Ok(());
        }
        let dist = self.repo.get_distribution(distro)?;
        let sources = self.repo.sources();

        let mut changed = false;
        for package in packages {
            let path = Path::new(package);
            let result = if path.is_file() {
                dist.install_from_archive(path)
            } else {
                let mut ctx = self
                    .repo
                    .install_context(&sources)
                    .with_indices(IndexCache::seeded(self.cached_indices()));
                dist.install_by_name(package, &mut ctx)
            };

            // One broken package does not hide what the others changed
            match result {
                Ok(Outcome::Success) => changed = true,
                Ok(Outcome::Satisfied(msg)) => self.send_text(format!("{package}: {msg}")),
                Ok(Outcome::Failed(msg)) => {
                    self.send_text(format!("package installation error ({package}): {msg}"))
                }
                Err(e) => {
                    warn!(distro, package = %package, "Install failed: {}", e);
                    self.send_text(format!("package installation error ({package}): {e}"));
                }
            }
        }

        if changed {
            self.send_packages_changed(distro)?;
        }
        Ok(())
    }

    fn remove(&self, distro: &str, packages: &[String]) -> Result<()> {
        if !self.repo.list_distributions()?.iter().any(|d| d == distro) {
            self.send_text(format!("No such distro installed: {distro}"));
            return Ok(());
        }
        let dist = self.repo.get_distribution(distro)?;

        let mut changed = false;
        for package in packages {
            match dist.remove_package(package) {
                Ok(outcome) if outcome.is_ok() => changed = true,
                Ok(outcome) => self.send_text(format!(
                    "package removal error ({package}): {}",
                    outcome.message()
                )),
                Err(e) => {
                    warn!(distro, package = %package, "Removal failed: {}", e);
                    self.send_text(format!("package removal error ({package}): {e}"));
                }
            }
        }

        if changed {
            self.send_packages_changed(distro)?;
        }
        Ok(())
    }

    fn dist_install(&self, source: &str, name: Option<&str>, token: Option<String>) -> Result<()> {
        let path = Path::new(source);
        let result = if path.is_file() {
            self.repo.install_dist_from_archive(path, name)
        } else {
            match &token {
                Some(token) => {
                    let notify = self.notify.clone();
                    let token = token.clone();
                    let progress = CallbackProgress::new(move |current, total| {
                        let _ = notify.send(Notification::Progress {
                            token: token.clone(),
                            current,
                            total,
                        });
                    });
                    self.repo.install_dist_by_name(source, name, &progress as &dyn ProgressSink)
                }
                None => {
                    let progress = LogProgress::new(format!("distribution {source}"));
                    self.repo.install_dist_by_name(source, name, &progress)
                }
            }
        };

        // The completion token goes out even when the install errored
        let ok = matches!(&result, Ok((outcome, _)) if outcome.is_ok());
        if let Some(token) = token {
            self.send(Notification::Done { token, ok });
        }

        let (outcome, _installed) = result?;
        if outcome.is_ok() {
            self.send(Notification::DistsChanged(self.repo.list_distributions()?));
        } else {
            self.send_text(format!(
                "distribution installation error ({source}): {}",
                outcome.message()
            ));
        }
        Ok(())
    }

    fn packages_available(&self, distro: String) -> Result<()> {
        if !self.repo.list_distributions()?.iter().any(|d| *d == distro) {
            self.send_text(format!("No such distro installed: {distro}"));
            return Ok(());
        }
        let dist = self.repo.get_distribution(&distro)?;
        let packages = available_packages(&self.indices(), dist.version_string());
        self.send(Notification::PackagesAvailable { distro, packages });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    fn create_handler() -> (TempDir, Handler, UnboundedReceiver<Notification>) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::open_at(temp.path()).unwrap();
        let (tx, rx) = unbounded_channel();
        let handler = Handler::new(Arc::new(repo), Arc::new(Subscribers::new()), tx);
        (temp, handler, rx)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_subscribe_requires_matching_address() {
        let (_temp, handler, _rx) = create_handler();

        handler
            .handle(Request::Subscribe("10.0.0.5:5000".parse().unwrap()), peer())
            .unwrap();
        assert!(handler.subscribers().is_empty());

        handler
            .handle(Request::Subscribe("127.0.0.1:5000".parse().unwrap()), peer())
            .unwrap();
        assert_eq!(handler.subscribers().len(), 1);

        handler
            .handle(Request::Unsubscribe("127.0.0.1:5000".parse().unwrap()), peer())
            .unwrap();
        assert!(handler.subscribers().is_empty());
    }

    #[test]
    fn test_install_into_unknown_distro() {
        let (_temp, handler, mut rx) = create_handler();
        handler
            .handle(
                Request::Install {
                    distro: "ghost".to_string(),
                    packages: vec!["pak".to_string()],
                },
                peer(),
            )
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::Text("No such distro installed: ghost".to_string())
        );
    }

    #[test]
    fn test_push_sources() {
        let (_temp, handler, mut rx) = create_handler();
        handler
            .handle(Request::PushSources(vec!["http://a/".to_string()]), peer())
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::Sources(vec!["http://a/".to_string()])
        );
    }

    #[test]
    fn test_dist_install_without_source_reports_done() {
        let (_temp, handler, mut rx) = create_handler();
        handler
            .handle(
                Request::DistInstall {
                    source: "stock".to_string(),
                    name: None,
                    token: Some("t1".to_string()),
                },
                peer(),
            )
            .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::Done {
                token: "t1".to_string(),
                ok: false,
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), Notification::Text(t) if t.contains("No suitable distro source found")));
    }

    #[test]
    fn test_wd_and_dists() {
        let (temp, handler, mut rx) = create_handler();
        handler.handle(Request::Wd, peer()).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::Wd(temp.path().display().to_string())
        );

        handler.handle(Request::Dists, peer()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Notification::Dists(Vec::new()));
    }

    #[test]
    fn test_install_reports_changes_before_a_broken_archive() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let (temp, handler, mut rx) = create_handler();
        let root = handler.repo.dists_root().join("stock");
        crate::distro::create_marker(&root).unwrap();

        let good = temp.path().join("good.zip");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&good).unwrap());
        zip.start_file("wapkg.json", SimpleFileOptions::default()).unwrap();
        zip.write_all(br#"{"version": 1, "name": "good", "revision": 3}"#).unwrap();
        zip.start_file("good.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"good").unwrap();
        zip.finish().unwrap();

        let corrupt = temp.path().join("corrupt.zip");
        std::fs::write(&corrupt, b"not a zip archive").unwrap();

        handler
            .handle(
                Request::Install {
                    distro: "stock".to_string(),
                    packages: vec![
                        good.display().to_string(),
                        corrupt.display().to_string(),
                    ],
                },
                peer(),
            )
            .unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            Notification::Text(t) if t.starts_with("package installation error (")
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::PackagesChanged {
                distro: "stock".to_string(),
                packages: vec![("good".to_string(), 3)],
            }
        );
    }
}
