// src/settings.rs

//! Repository settings
//!
//! Stored as `settings.json` in the repository working directory. Loading
//! and persisting happen only where a caller asks for it; the in-memory
//! copy is owned by the [`crate::Repository`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Settings file name inside the working directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Marker file that keeps the repository in the current directory
pub const PORTABLE_MARKER: &str = "portable";

/// Executable probed for a distribution's version
pub const DEFAULT_EXECUTABLE: &str = "WA.exe";

fn default_executable() -> String {
    DEFAULT_EXECUTABLE.to_string()
}

/// Persisted repository settings
///
/// Fields are declared in key order so the written JSON is sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Skip merging the external sources list
    #[serde(default)]
    pub disable_external_sources_list: bool,

    /// Executable (relative to a distribution root) probed for its version
    #[serde(default = "default_executable")]
    pub executable: String,

    /// URL of a JSON array of additional source URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_sources_list: Option<String>,

    /// Directory holding the distributions, when not the working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Source base URLs, in priority order
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            disable_external_sources_list: false,
            executable: default_executable(),
            external_sources_list: None,
            path: None,
            sources: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings, writing defaults first when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_or_create(path, &[])
    }

    /// Like [`Settings::load`], seeding a new file with `default_sources`
    pub fn load_or_create(path: &Path, default_sources: &[String]) -> Result<Self> {
        if !path.exists() {
            info!("Creating settings at {}", path.display());
            let settings = Self {
                sources: default_sources.to_vec(),
                ..Self::default()
            };
            settings.persist(path)?;
            return Ok(settings);
        }

        let raw = fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read settings {}: {e}", path.display()))
        })?;
        let settings: Settings = serde_json::from_str(&raw).map_err(|e| {
            Error::ParseError(format!("Invalid settings {}: {e}", path.display()))
        })?;
        debug!("Loaded settings from {} ({} sources)", path.display(), settings.sources.len());
        Ok(settings)
    }

    /// Write settings as pretty JSON, replacing the file atomically
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path).map_err(|e| {
            Error::IoError(format!("Failed to write settings {}: {e}", path.display()))
        })?;
        Ok(())
    }

    /// Add a source unless already configured; returns whether it was added
    pub fn add_source(&mut self, source: &str) -> bool {
        if self.sources.iter().any(|s| s == source) {
            return false;
        }
        self.sources.push(source.to_string());
        true
    }

    /// Remove a source; returns whether it was configured
    pub fn remove_source(&mut self, source: &str) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s != source);
        self.sources.len() != before
    }
}

/// Repository working directory
///
/// The current directory when it contains a `portable` file, otherwise
/// `%APPDATA%\wapkg` on Windows and `~/.wapkg` elsewhere.
pub fn working_directory() -> Result<PathBuf> {
    if Path::new(PORTABLE_MARKER).is_file() {
        return Ok(PathBuf::from("."));
    }

    #[cfg(windows)]
    let base = dirs::config_dir().map(|dir| dir.join("wapkg"));
    #[cfg(not(windows))]
    let base = dirs::home_dir().map(|dir| dir.join(".wapkg"));

    base.ok_or_else(|| Error::InitError("Cannot determine the home directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);

        let settings =
            Settings::load_or_create(&path, &["http://example.com/repo/".to_string()]).unwrap();
        assert!(path.exists());
        assert_eq!(settings.sources, vec!["http://example.com/repo/"]);
        assert_eq!(settings.executable, DEFAULT_EXECUTABLE);

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_reads_minimal_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            r#"{"sources": ["a", "b"], "disable_external_sources_list": true, "path": "/srv/dists"}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.sources, vec!["a", "b"]);
        assert!(settings.disable_external_sources_list);
        assert_eq!(settings.path, Some(PathBuf::from("/srv/dists")));
        assert_eq!(settings.executable, DEFAULT_EXECUTABLE);
    }

    #[test]
    fn test_persist_sorted_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        Settings::default().persist(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let disable = raw.find("disable_external_sources_list").unwrap();
        let executable = raw.find("executable").unwrap();
        let sources = raw.find("sources\"").unwrap();
        assert!(disable < executable && executable < sources);
    }

    #[test]
    fn test_invalid_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_source_edits() {
        let mut settings = Settings::default();
        assert!(settings.add_source("a"));
        assert!(!settings.add_source("a"));
        assert!(settings.add_source("b"));
        assert!(settings.remove_source("a"));
        assert!(!settings.remove_source("a"));
        assert_eq!(settings.sources, vec!["b"]);
    }
}
