// src/distro/install.rs

//! Package installation
//!
//! `install_by_name` walks the configured sources in order, resolves the
//! variant for the distribution version, installs requirements first and
//! then stages, verifies and installs the payload. `install_from_archive`
//! records and extracts a package archive in one transaction.

use super::{Distribution, MARKER_DIR};
use crate::archive::{Archive, ArchiveEntry, PACKAGE_MANIFEST};
use crate::db;
use crate::db::models::{Package, PathEntry};
use crate::error::{Error, Result};
use crate::index::{RemoteIndex, fetch_index, select_variant};
use crate::outcome::{
    MSG_LATEST_INSTALLED, MSG_NO_PACKAGE_SOURCE, MSG_UNSUPPORTED_PACKAGE, MSG_UP_TO_DATE,
    MSG_VIRTUAL_UP_TO_DATE, Outcome,
};
use crate::progress::{ProgressSink, SilentProgress};
use crate::repository::client::Fetcher;
use crate::repository::download::{StagedDownload, download_verified};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Indices fetched during one request, keyed by source URL
///
/// A failed fetch is remembered too, so an unreachable source is tried
/// once per request.
#[derive(Debug, Default, Clone)]
pub struct IndexCache {
    entries: HashMap<String, Option<RemoteIndex>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from indices fetched earlier (the daemon's `update-index`)
    pub fn seeded(indices: impl IntoIterator<Item = RemoteIndex>) -> Self {
        Self {
            entries: indices
                .into_iter()
                .map(|index| (index.source.clone(), Some(index)))
                .collect(),
        }
    }

    /// Index of `source`, fetching it on first use
    pub fn get(&mut self, fetcher: &dyn Fetcher, source: &str) -> Option<&RemoteIndex> {
        self.entries
            .entry(source.to_string())
            .or_insert_with(|| fetch_index(fetcher, source))
            .as_ref()
    }
}

/// Everything an install by name needs besides the distribution
pub struct InstallContext<'a> {
    pub sources: &'a [String],
    pub fetcher: &'a dyn Fetcher,
    pub progress: &'a dyn ProgressSink,
    pub indices: IndexCache,
    resolving: HashSet<String>,
}

impl<'a> InstallContext<'a> {
    pub fn new(sources: &'a [String], fetcher: &'a dyn Fetcher) -> Self {
        Self {
            sources,
            fetcher,
            progress: &SilentProgress,
            indices: IndexCache::new(),
            resolving: HashSet::new(),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_indices(mut self, indices: IndexCache) -> Self {
        self.indices = indices;
        self
    }
}

/// Every ancestor directory of `path`, shallowest first
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

impl Distribution {
    /// Install a package archive
    ///
    /// A newer revision of an installed package replaces it; an equal or
    /// older one is refused.
    pub fn install_from_archive(&self, path: &Path) -> Result<Outcome> {
        let _lock = self.lock()?;
        self.install_from_archive_locked(path)
    }

    /// Resolve `name` from the context's sources and install it
    pub fn install_by_name(&self, name: &str, ctx: &mut InstallContext<'_>) -> Result<Outcome> {
        let _lock = self.lock()?;
        self.install_by_name_locked(name, ctx)
    }

    fn install_by_name_locked(&self, name: &str, ctx: &mut InstallContext<'_>) -> Result<Outcome> {
        if !ctx.resolving.insert(name.to_string()) {
            warn!("Requirement cycle through {} in {}", name, self.name());
            return Ok(Outcome::failed(format!("Circular requirement on '{name}'")));
        }
        let outcome = self.resolve_and_install(name, ctx);
        ctx.resolving.remove(name);
        outcome
    }

    fn resolve_and_install(&self, name: &str, ctx: &mut InstallContext<'_>) -> Result<Outcome> {
        let version = self.version_string().map(str::to_string);
        let sources = ctx.sources;
        let mut revision_fail = false;
        let mut installed_any_reqs = false;

        for source in sources {
            let direct = match ctx.indices.get(ctx.fetcher, source) {
                Some(index) => index
                    .packages
                    .get(name)
                    .and_then(|descriptor| select_variant(descriptor, version.as_deref()))
                    .cloned(),
                None => continue,
            };
            let Some(direct) = direct else {
                continue;
            };

            for requirement in &direct.requirements {
                let outcome = self.install_by_name_locked(requirement, ctx)?;
                debug!("Requirement {} of {}: {}", requirement, name, outcome);
                installed_any_reqs |= outcome.is_ok();
            }

            let Some(revision) = direct.revision else {
                return Ok(if installed_any_reqs {
                    Outcome::Success
                } else {
                    Outcome::satisfied(MSG_VIRTUAL_UP_TO_DATE)
                });
            };

            if let Some(installed) = self.revision(name)? {
                if revision <= installed {
                    debug!("{} offers {} revision {}, {} installed", source, name, revision, installed);
                    revision_fail = true;
                    continue;
                }
            }

            let link = match direct.link(source) {
                Ok(Some(link)) => link,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping {} from {}: {}", name, source, e);
                    continue;
                }
            };
            let checksum = direct.checksum()?;

            let staged = StagedDownload::new(&self.cache_dir(), "");
            let fetched = download_verified(ctx.fetcher, &link, &staged, checksum.as_ref(), ctx.progress);
            let outcome = match fetched {
                Ok(()) => self.install_from_archive_locked(staged.path()),
                Err(e) if e.is_transport() => {
                    warn!("Failed to download {} from {}: {}", name, link, e);
                    drop(staged);
                    self.clean_cache_locked()?;
                    continue;
                }
                Err(e @ Error::ChecksumMismatch { .. }) => {
                    warn!("Rejected {} from {}: {}", name, link, e);
                    Ok(Outcome::failed(e.to_string()))
                }
                Err(e) => Err(e),
            };
            drop(staged);
            self.clean_cache_locked()?;
            return outcome;
        }

        Ok(match (revision_fail, installed_any_reqs) {
            (true, true) => Outcome::Success,
            (true, false) => Outcome::satisfied(MSG_LATEST_INSTALLED),
            _ => Outcome::failed(MSG_NO_PACKAGE_SOURCE),
        })
    }

    pub(crate) fn install_from_archive_locked(&self, path: &Path) -> Result<Outcome> {
        let mut archive = Archive::open(path)?;
        let manifest = match archive.package_manifest() {
            Ok(manifest) => manifest,
            Err(Error::FormatVersion { found, .. }) => {
                debug!("{} uses package format {}", path.display(), found);
                return Ok(Outcome::failed(MSG_UNSUPPORTED_PACKAGE));
            }
            Err(e) => return Err(e),
        };
        let name = manifest.name.as_str();

        let mut conn = self.open_store()?;
        let previous = Package::find(&conn, name)?;
        if let Some(previous) = &previous {
            if manifest.revision <= previous.revision {
                return Ok(Outcome::satisfied(MSG_UP_TO_DATE));
            }
        }

        let entries: Vec<ArchiveEntry> = archive
            .entries(PACKAGE_MANIFEST)?
            .into_iter()
            .filter(|entry| entry.top_level() != MARKER_DIR)
            .collect();

        for entry in &entries {
            if let Some(owner) = PathEntry::find_by_path(&conn, &entry.path)? {
                if owner.package != name && !(entry.is_dir && owner.is_dir) {
                    return Ok(Outcome::failed(format!(
                        "File '{}' is already owned by package '{}'",
                        entry.path, owner.package
                    )));
                }
            }
        }

        // Directories extraction will create that nobody listed explicitly
        let explicit_dirs: BTreeSet<&str> = entries
            .iter()
            .filter(|e| e.is_dir)
            .map(|e| e.path.as_str())
            .collect();
        let implicit_dirs: BTreeSet<String> = entries
            .iter()
            .flat_map(|e| ancestors(&e.path))
            .filter(|dir| !explicit_dirs.contains(dir) && !self.root().join(dir).exists())
            .map(str::to_string)
            .collect();
        let fresh_files: Vec<&str> = entries
            .iter()
            .filter(|e| !e.is_dir && !self.root().join(&e.path).exists())
            .map(|e| e.path.as_str())
            .collect();

        let (old_files, old_dirs) = match &previous {
            Some(_) => (PathEntry::files_of(&conn, name)?, PathEntry::dirs_of(&conn, name)?),
            None => (Vec::new(), Vec::new()),
        };

        let root = self.root().to_path_buf();
        let applied = db::transaction(&mut conn, |tx| {
            if previous.is_some() {
                Package::delete(tx, name)?;
            }
            Package::new(name, manifest.revision).insert(tx)?;

            for entry in &entries {
                if entry.is_dir {
                    PathEntry::new(&entry.path, true, name).insert_if_unowned(tx)?;
                } else {
                    PathEntry::new(&entry.path, false, name).insert(tx)?;
                }
                archive.extract(entry, &root)?;
            }
            for dir in &implicit_dirs {
                PathEntry::new(dir, true, name).insert_if_unowned(tx)?;
            }
            Ok(())
        });

        if let Err(e) = applied {
            warn!("Installing {} into {} failed: {}", name, self.name(), e);
            self.undo_partial_extraction(&fresh_files, &implicit_dirs);
            return Err(e);
        }

        if previous.is_some() {
            self.drop_stale_paths(&conn, name, &old_files, &old_dirs)?;
        }

        info!(
            "Installed {} revision {} into {} ({} entries)",
            name,
            manifest.revision,
            self.name(),
            entries.len()
        );
        Ok(Outcome::Success)
    }

    /// After an update: delete what the old revision shipped and the new
    /// one no longer records
    fn drop_stale_paths(
        &self,
        conn: &rusqlite::Connection,
        name: &str,
        old_files: &[String],
        old_dirs: &[String],
    ) -> Result<()> {
        let current: HashSet<String> = PathEntry::find_by_package(conn, name)?
            .into_iter()
            .map(|entry| entry.path)
            .collect();

        for file in old_files.iter().filter(|f| !current.contains(*f)) {
            if PathEntry::find_by_path(conn, file)?.is_some() {
                continue;
            }
            match fs::remove_file(self.root().join(file)) {
                Ok(()) => debug!("Removed stale {}", file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stale_dirs: Vec<String> = old_dirs
            .iter()
            .filter(|d| !current.contains(*d))
            .cloned()
            .collect();
        super::prune_dirs(self.root(), &stale_dirs)?;
        super::adopt_occupied_dirs(conn, self.root(), &stale_dirs)?;
        Ok(())
    }

    /// Best-effort removal of files and directories a failed install created
    fn undo_partial_extraction(&self, fresh_files: &[&str], implicit_dirs: &BTreeSet<String>) {
        for file in fresh_files {
            let _ = fs::remove_file(self.root().join(file));
        }
        let dirs: Vec<String> = implicit_dirs.iter().cloned().collect();
        if let Err(e) = super::prune_dirs(self.root(), &dirs) {
            warn!("Cleanup after failed install left directories behind: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("a/b/c.txt").collect::<Vec<_>>(), vec!["a", "a/b"]);
        assert!(ancestors("top.txt").next().is_none());
    }

    #[test]
    fn test_index_cache_remembers_failures() {
        struct CountingFetcher(std::sync::atomic::AtomicUsize);

        impl Fetcher for CountingFetcher {
            fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(Error::DownloadError("offline".to_string()))
            }

            fn fetch_to_file(&self, _url: &str, _dest: &Path, _p: &dyn ProgressSink) -> Result<u64> {
                Err(Error::DownloadError("offline".to_string()))
            }
        }

        let fetcher = CountingFetcher(std::sync::atomic::AtomicUsize::new(0));
        let mut cache = IndexCache::new();
        assert!(cache.get(&fetcher, "http://example.com/").is_none());
        assert!(cache.get(&fetcher, "http://example.com/").is_none());
        assert_eq!(fetcher.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
