// src/index/mod.rs

//! Remote index documents
//!
//! Every source publishes `index.json` next to its payloads:
//!
//! ```text
//! {
//!   "repo": "wapkg",
//!   "version": 1,
//!   "distributions": { "<name>": { "path" | "uri", "checksum"? } },
//!   "packages": {
//!     "<name>": { "revision"?, "path" | "uri", "checksum"?, "requirements"? },
//!     "<name>": { "1.0,1.1": { ... }, "*": { ... } }
//!   }
//! }
//! ```
//!
//! Descriptors are decoded strictly into [`PackageDescriptor`]; a document
//! with a malformed descriptor is rejected as a whole.

pub mod resolver;

use crate::error::{Error, Result};
use crate::hash::Checksum;
use crate::repository::client::Fetcher;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Once;
use tracing::{debug, warn};
use url::Url;

pub use resolver::{AvailablePackage, available_packages, select_variant, trace_dependencies};

/// Repository tag every index must carry
pub const REPO_TAG: &str = "wapkg";

/// Index protocol version understood by this build
pub const PROTOCOL_VERSION: u64 = 1;

/// Index document name, relative to the source URL
pub const INDEX_FILE: &str = "index.json";

/// Switch key matching any distribution version
pub const WILDCARD: &str = "*";

static NEWER_PROTOCOL_ADVISORY: Once = Once::new();

/// A concrete (non-switch) package descriptor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectDescriptor {
    /// Absent for virtual packages
    #[serde(default)]
    pub revision: Option<i64>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default, alias = "sha1")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl DirectDescriptor {
    /// Virtual packages only pull in their requirements
    pub fn is_virtual(&self) -> bool {
        self.revision.is_none()
    }

    /// Payload URL: `path` is relative to the source, `uri` is absolute
    pub fn link(&self, source: &str) -> Result<Option<String>> {
        resolve_link(source, self.path.as_deref(), self.uri.as_deref())
    }

    pub fn checksum(&self) -> Result<Option<Checksum>> {
        parse_checksum(self.checksum.as_deref())
    }

    fn validate(&self, name: &str) -> Result<()> {
        match self.revision {
            Some(_) if self.path.is_none() && self.uri.is_none() => {
                return Err(Error::ParseError(format!(
                    "Package '{name}' has a revision but no path or uri"
                )));
            }
            None if self.requirements.is_empty() => {
                return Err(Error::ParseError(format!(
                    "Package '{name}' has neither a revision nor requirements"
                )));
            }
            _ => {}
        }
        self.checksum()?;
        Ok(())
    }
}

/// A package entry: one descriptor, or one per set of distribution versions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PackageDescriptor {
    Direct(DirectDescriptor),
    /// Keys are comma-separated version lists, or [`WILDCARD`]
    Switch(BTreeMap<String, DirectDescriptor>),
}

impl PackageDescriptor {
    fn validate(&self, name: &str) -> Result<()> {
        match self {
            PackageDescriptor::Direct(direct) => direct.validate(name),
            PackageDescriptor::Switch(variants) => {
                if variants.is_empty() {
                    return Err(Error::ParseError(format!("Package '{name}' has an empty switch")));
                }
                variants.values().try_for_each(|direct| direct.validate(name))
            }
        }
    }
}

/// A distribution installer entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistDescriptor {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default, alias = "sha1")]
    pub checksum: Option<String>,
}

impl DistDescriptor {
    pub fn link(&self, source: &str) -> Result<Option<String>> {
        resolve_link(source, self.path.as_deref(), self.uri.as_deref())
    }

    pub fn checksum(&self) -> Result<Option<Checksum>> {
        parse_checksum(self.checksum.as_deref())
    }
}

/// An accepted index document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteIndex {
    /// Source URL the index was fetched from
    #[serde(skip)]
    pub source: String,
    pub repo: String,
    pub version: u64,
    #[serde(default)]
    pub distributions: BTreeMap<String, DistDescriptor>,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageDescriptor>,
}

impl RemoteIndex {
    /// Decode and validate an index document fetched from `source`
    ///
    /// The tag and protocol version are checked before the body, so a
    /// newer protocol is reported as [`Error::FormatVersion`].
    pub fn parse(source: &str, raw: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;

        if value.get("repo").and_then(|v| v.as_str()) != Some(REPO_TAG) {
            return Err(Error::ParseError(format!("{source} is not a {REPO_TAG} index")));
        }
        let version = value.get("version").and_then(|v| v.as_u64());
        if version != Some(PROTOCOL_VERSION) {
            return Err(Error::FormatVersion {
                what: "index",
                found: value
                    .get("version")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "none".to_string()),
            });
        }

        let mut index: RemoteIndex = serde_json::from_value(value)?;
        for (name, descriptor) in &index.packages {
            descriptor.validate(name)?;
        }
        for (name, descriptor) in &index.distributions {
            if descriptor.path.is_none() && descriptor.uri.is_none() {
                return Err(Error::ParseError(format!(
                    "Distribution '{name}' has no path or uri"
                )));
            }
            descriptor.checksum()?;
        }
        index.source = source.to_string();
        Ok(index)
    }
}

/// URL of the index document for `source`
pub fn index_url(source: &str) -> Result<String> {
    let base = Url::parse(source)
        .map_err(|e| Error::ParseError(format!("Invalid source URL {source}: {e}")))?;
    let url = base
        .join(INDEX_FILE)
        .map_err(|e| Error::ParseError(format!("Invalid source URL {source}: {e}")))?;
    Ok(url.to_string())
}

/// Fetch and accept the index of `source`
///
/// Any failure (transport, wrong tag, protocol mismatch, malformed
/// descriptor) yields `None`; callers move on to the next source.
pub fn fetch_index(fetcher: &dyn Fetcher, source: &str) -> Option<RemoteIndex> {
    let url = match index_url(source) {
        Ok(url) => url,
        Err(e) => {
            warn!("Skipping source: {}", e);
            return None;
        }
    };

    let raw = match fetcher.fetch_bytes(&url) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Source {} unreachable: {}", source, e);
            return None;
        }
    };

    match RemoteIndex::parse(source, &raw) {
        Ok(index) => {
            debug!(
                "Accepted index from {} ({} packages, {} distributions)",
                source,
                index.packages.len(),
                index.distributions.len()
            );
            Some(index)
        }
        Err(Error::FormatVersion { found, .. }) => {
            let newer = found.parse::<u64>().is_ok_and(|v| v > PROTOCOL_VERSION);
            if newer {
                NEWER_PROTOCOL_ADVISORY.call_once(|| {
                    warn!(
                        "Source {} requires index protocol {}, this build supports {}; consider upgrading",
                        source, found, PROTOCOL_VERSION
                    );
                });
            } else {
                debug!("Source {} has unsupported index version {}", source, found);
            }
            None
        }
        Err(e) => {
            debug!("Rejected index from {}: {}", source, e);
            None
        }
    }
}

fn resolve_link(source: &str, path: Option<&str>, uri: Option<&str>) -> Result<Option<String>> {
    if let Some(path) = path {
        let base = Url::parse(source)
            .map_err(|e| Error::ParseError(format!("Invalid source URL {source}: {e}")))?;
        let url = base
            .join(path)
            .map_err(|e| Error::ParseError(format!("Invalid path {path}: {e}")))?;
        return Ok(Some(url.to_string()));
    }
    Ok(uri.map(str::to_string))
}

fn parse_checksum(raw: Option<&str>) -> Result<Option<Checksum>> {
    raw.map(|raw| {
        Checksum::parse(raw).map_err(|e| Error::ParseError(format!("Invalid checksum {raw}: {e}")))
    })
    .transpose()
}
