// src/repository/mod.rs

//! The repository: every known distribution plus the configured sources
//!
//! The working directory holds `settings.json`, the daemon lock and
//! distribution-level staging files. Distributions live in the working
//! directory too, unless `settings.path` points elsewhere.

pub mod client;
pub mod download;
pub mod sources;

pub use client::{Fetcher, HttpFetcher};
pub use download::{DOWNLOAD_SUFFIX, StagedDownload, download_verified, purge_stale_downloads};

use crate::archive::{Archive, DIST_MANIFEST};
use crate::distro::{self, Distribution, InstallContext, MARKER_DIR};
use crate::error::{Error, Result};
use crate::index::{RemoteIndex, fetch_index};
use crate::outcome::{MSG_DIST_EXISTS, MSG_NO_DIST_SOURCE, MSG_UNSUPPORTED_DISTRIBUTION, Outcome};
use crate::progress::ProgressSink;
use crate::settings::{SETTINGS_FILE, Settings};
use crate::version::{PeVersionProber, VersionProber};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, info, warn};

/// Result of a distribution install: the outcome and the installed name
pub type DistInstall = (Outcome, Option<String>);

/// Whether `name` can name a directory directly below the root
fn valid_dist_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name != MARKER_DIR
        && !name.contains(['/', '\\', '\0'])
}

/// Registry of distributions and sources
pub struct Repository {
    wd: PathBuf,
    settings: RwLock<Settings>,
    external: OnceLock<Vec<String>>,
    fetcher: Arc<dyn Fetcher>,
    prober: Arc<dyn VersionProber>,
}

impl Repository {
    /// Open the repository in the default working directory
    pub fn open() -> Result<Self> {
        Self::open_at(crate::settings::working_directory()?)
    }

    /// Open (creating if needed) the repository rooted at `wd`
    pub fn open_at(wd: impl Into<PathBuf>) -> Result<Self> {
        let wd = wd.into();
        fs::create_dir_all(&wd).map_err(|e| {
            Error::InitError(format!("Cannot create working directory {}: {e}", wd.display()))
        })?;

        let settings = Settings::load(&wd.join(SETTINGS_FILE))?;
        purge_stale_downloads(&wd)?;
        debug!("Opened repository at {}", wd.display());

        Ok(Self {
            wd,
            settings: RwLock::new(settings),
            external: OnceLock::new(),
            fetcher: Arc::new(HttpFetcher::new()),
            prober: Arc::new(PeVersionProber),
        })
    }

    /// Replace the transport
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the version prober
    pub fn with_prober(mut self, prober: Arc<dyn VersionProber>) -> Self {
        self.prober = prober;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.wd
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Snapshot of the in-memory settings
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Directory holding the distributions
    pub fn dists_root(&self) -> PathBuf {
        self.settings().path.unwrap_or_else(|| self.wd.clone())
    }

    /// Names of all distributions, sorted
    pub fn list_distributions(&self) -> Result<Vec<String>> {
        let root = self.dists_root();
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && distro::is_distribution(&entry.path()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Open the distribution called `name`
    pub fn get_distribution(&self, name: &str) -> Result<Distribution> {
        if !valid_dist_name(name) {
            return Err(Error::NotFoundError(format!("Invalid distribution name: {name}")));
        }
        let executable = self.settings().executable;
        Distribution::open(self.dists_root().join(name), executable, self.prober.clone())
    }

    /// Configured sources followed by the external list
    ///
    /// The external list is fetched once per repository instance, unless
    /// disabled in the settings.
    pub fn sources(&self) -> Vec<String> {
        let settings = self.settings();
        let mut sources = settings.sources.clone();

        if settings.disable_external_sources_list {
            return sources;
        }
        if let Some(url) = settings.external_sources_list.as_deref() {
            let external = self
                .external
                .get_or_init(|| sources::fetch_external_sources(self.fetcher.as_ref(), url));
            sources::merge_sources(&mut sources, external.clone());
        }
        sources
    }

    /// Replace the configured sources and persist the settings
    pub fn set_sources(&self, new_sources: Vec<String>) -> Result<()> {
        self.update_settings(|settings| settings.sources = new_sources)
    }

    /// Apply `edit` to the settings and persist them
    pub fn update_settings<F: FnOnce(&mut Settings)>(&self, edit: F) -> Result<()> {
        let mut settings = self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        edit(&mut settings);
        settings.persist(&self.wd.join(SETTINGS_FILE))?;
        info!("Saved settings ({} sources)", settings.sources.len());
        Ok(())
    }

    /// Fetch the index of every source; unusable sources are skipped
    pub fn fetch_indices(&self) -> Vec<RemoteIndex> {
        self.sources()
            .iter()
            .filter_map(|source| fetch_index(self.fetcher.as_ref(), source))
            .collect()
    }

    /// Distribution names offered by any source, sorted
    pub fn available_distributions(indices: &[RemoteIndex]) -> Vec<String> {
        indices
            .iter()
            .flat_map(|index| index.distributions.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Context for installing packages from `sources` with this
    /// repository's transport
    pub fn install_context<'a>(&'a self, sources: &'a [String]) -> InstallContext<'a> {
        InstallContext::new(sources, self.fetcher.as_ref())
    }

    /// Create a distribution from an installer archive
    ///
    /// The name defaults to the archive's suggested name.
    pub fn install_dist_from_archive(&self, path: &Path, target: Option<&str>) -> Result<DistInstall> {
        let mut archive = Archive::open(path)?;
        let manifest = match archive.dist_manifest() {
            Ok(manifest) => manifest,
            Err(Error::FormatVersion { found, .. }) => {
                debug!("{} uses distribution format {}", path.display(), found);
                return Ok((Outcome::failed(MSG_UNSUPPORTED_DISTRIBUTION), None));
            }
            Err(e) => return Err(e),
        };

        let name = target.unwrap_or(&manifest.suggested_name).to_string();
        if !valid_dist_name(&name) {
            return Ok((Outcome::failed(format!("Invalid distribution name: {name}")), None));
        }

        let dists_root = self.dists_root();
        fs::create_dir_all(&dists_root)?;
        let root = dists_root.join(&name);
        match fs::create_dir(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok((Outcome::failed(MSG_DIST_EXISTS), None));
            }
            Err(e) => return Err(e.into()),
        }

        let populated = distro::create_marker(&root).and_then(|()| {
            let entries = archive.entries(DIST_MANIFEST)?;
            for entry in entries.iter().filter(|e| e.top_level() != MARKER_DIR) {
                archive.extract(entry, &root)?;
            }
            Ok(entries.len())
        });

        match populated {
            Ok(count) => {
                info!("Installed distribution {} ({} entries)", name, count);
                Ok((Outcome::Success, Some(name)))
            }
            Err(e) => {
                warn!("Installing distribution {} failed: {}", name, e);
                let _ = fs::remove_dir_all(&root);
                Err(e)
            }
        }
    }

    /// Download a distribution installer from the sources and install it
    ///
    /// Without `target` the installer's suggested name is used, as for
    /// [`Repository::install_dist_from_archive`].
    pub fn install_dist_by_name(
        &self,
        name: &str,
        target: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<DistInstall> {
        if self.dists_root().join(target.unwrap_or(name)).exists() {
            return Ok((Outcome::failed(MSG_DIST_EXISTS), None));
        }

        for source in self.sources() {
            let Some(index) = fetch_index(self.fetcher.as_ref(), &source) else {
                continue;
            };
            let Some(descriptor) = index.distributions.get(name) else {
                continue;
            };
            let link = match descriptor.link(&source) {
                Ok(Some(link)) => link,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping distribution {} from {}: {}", name, source, e);
                    continue;
                }
            };
            let checksum = descriptor.checksum()?;

            let staged = StagedDownload::new(&self.wd, DOWNLOAD_SUFFIX);
            match download_verified(self.fetcher.as_ref(), &link, &staged, checksum.as_ref(), progress) {
                Ok(()) => {}
                Err(e) if e.is_transport() => {
                    warn!("Failed to download distribution {} from {}: {}", name, link, e);
                    continue;
                }
                Err(e @ Error::ChecksumMismatch { .. }) => {
                    warn!("Rejected distribution {} from {}: {}", name, link, e);
                    return Ok((Outcome::failed(e.to_string()), None));
                }
                Err(e) => return Err(e),
            }

            return self.install_dist_from_archive(staged.path(), target);
        }

        Ok((Outcome::failed(MSG_NO_DIST_SOURCE), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_working_dir() {
        let temp = TempDir::new().unwrap();
        let wd = temp.path().join("wapkg");

        let repo = Repository::open_at(&wd).unwrap();
        assert!(wd.join(SETTINGS_FILE).exists());
        assert!(repo.list_distributions().unwrap().is_empty());
    }

    #[test]
    fn test_open_purges_stale_downloads() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("abc.download"), b"partial").unwrap();
        Repository::open_at(temp.path()).unwrap();
        assert!(!temp.path().join("abc.download").exists());
    }

    #[test]
    fn test_list_distributions_requires_marker() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::open_at(temp.path()).unwrap();

        fs::create_dir_all(temp.path().join("plain")).unwrap();
        let dist = temp.path().join("stock");
        fs::create_dir_all(&dist).unwrap();
        distro::create_marker(&dist).unwrap();

        assert_eq!(repo.list_distributions().unwrap(), vec!["stock"]);
    }

    #[test]
    fn test_get_distribution_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::open_at(temp.path()).unwrap();
        assert!(matches!(repo.get_distribution("../etc"), Err(Error::NotFoundError(_))));
        assert!(matches!(repo.get_distribution("missing"), Err(Error::NotFoundError(_))));
    }

    #[test]
    fn test_set_sources_persists() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::open_at(temp.path()).unwrap();
        repo.set_sources(vec!["http://example.com/".to_string()]).unwrap();

        let reloaded = Settings::load(&temp.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(reloaded.sources, vec!["http://example.com/"]);
        assert_eq!(repo.sources(), vec!["http://example.com/"]);
    }

    #[test]
    fn test_valid_dist_name() {
        assert!(valid_dist_name("stock-5.66"));
        assert!(!valid_dist_name(""));
        assert!(!valid_dist_name(".."));
        assert!(!valid_dist_name("a/b"));
        assert!(!valid_dist_name(".wadist"));
    }
}
