// src/archive.rs

//! Package and distribution archives
//!
//! Both archive kinds are zip containers carrying a small JSON manifest:
//! - package archives: `wapkg.json` = `{version, name, revision, requirements?}`
//! - distribution archives: `wadist.json` = `{version, suggestedName}`
//!
//! Every other entry is payload, extracted relative to a distribution root.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path};
use tracing::debug;
use zip::ZipArchive;

/// Manifest entry name inside package archives
pub const PACKAGE_MANIFEST: &str = "wapkg.json";

/// Manifest entry name inside distribution archives
pub const DIST_MANIFEST: &str = "wadist.json";

/// The only archive format version understood
pub const FORMAT_VERSION: u64 = 1;

/// Manifest of a package archive
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageManifest {
    pub version: u64,
    pub name: String,
    pub revision: i64,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// Manifest of a distribution archive
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DistManifest {
    pub version: u64,
    #[serde(rename = "suggestedName")]
    pub suggested_name: String,
}

/// One payload entry of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated path relative to the extraction root, no trailing slash
    pub path: String,
    pub is_dir: bool,
    index: usize,
}

impl ArchiveEntry {
    /// First path component
    pub fn top_level(&self) -> &str {
        self.path.split('/').next().unwrap_or(&self.path)
    }
}

/// An opened zip archive
pub struct Archive {
    inner: ZipArchive<BufReader<File>>,
}

impl Archive {
    /// Open an archive; a file that is not a readable zip is an error
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::IoError(format!("Failed to open archive {}: {e}", path.display()))
        })?;
        let inner = ZipArchive::new(BufReader::new(file))?;
        debug!("Opened archive {} ({} entries)", path.display(), inner.len());
        Ok(Self { inner })
    }

    /// Read the package manifest, checking its format version
    pub fn package_manifest(&mut self) -> Result<PackageManifest> {
        self.read_manifest(PACKAGE_MANIFEST, "package")
    }

    /// Read the distribution manifest, checking its format version
    pub fn dist_manifest(&mut self) -> Result<DistManifest> {
        self.read_manifest(DIST_MANIFEST, "distribution")
    }

    /// The version is checked before the full shape, so a newer format
    /// reports as unsupported rather than malformed.
    fn read_manifest<T: DeserializeOwned>(&mut self, name: &str, what: &'static str) -> Result<T> {
        let mut raw = String::new();
        match self.inner.by_name(name) {
            Ok(mut file) => {
                file.read_to_string(&mut raw)?;
            }
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(Error::ParseError(format!("Archive has no {name}")));
            }
            Err(e) => return Err(e.into()),
        }

        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let version = value.get("version").and_then(|v| v.as_u64());
        if version != Some(FORMAT_VERSION) {
            return Err(Error::FormatVersion {
                what,
                found: value
                    .get("version")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    /// All entries except `manifest`
    ///
    /// Entry names that would escape the extraction root make the whole
    /// archive invalid.
    pub fn entries(&mut self, manifest: &str) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.inner.len());

        for index in 0..self.inner.len() {
            let file = self.inner.by_index(index)?;
            let raw_name = file.name().to_string();
            if raw_name == manifest {
                continue;
            }

            let enclosed = file.enclosed_name().ok_or_else(|| {
                Error::ParseError(format!("Unsafe archive entry name: {raw_name}"))
            })?;

            let mut parts = Vec::new();
            for component in enclosed.components() {
                match component {
                    Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                    Component::CurDir => {}
                    _ => {
                        return Err(Error::ParseError(format!(
                            "Unsafe archive entry name: {raw_name}"
                        )));
                    }
                }
            }
            if parts.is_empty() {
                continue;
            }

            entries.push(ArchiveEntry {
                path: parts.join("/"),
                is_dir: file.is_dir(),
                index,
            });
        }

        Ok(entries)
    }

    /// Extract one entry below `root`, overwriting existing files
    pub fn extract(&mut self, entry: &ArchiveEntry, root: &Path) -> Result<()> {
        let dest = root.join(&entry.path);

        if entry.is_dir {
            fs::create_dir_all(&dest)?;
            return Ok(());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = self.inner.by_index(entry.index)?;
        let mut out = File::create(&dest).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", dest.display()))
        })?;
        io::copy(&mut file, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&dest, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }

        Ok(())
    }
}
