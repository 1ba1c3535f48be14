// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use serde_json::{Map, Value, json};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wapkg::hash::{HashAlgorithm, hash_bytes};
use wapkg::version::VersionProber;
use wapkg::{Distribution, Repository, distro};
use zip::write::SimpleFileOptions;

/// Reports a fixed application version
pub struct FixedProber(pub Option<String>);

impl VersionProber for FixedProber {
    fn probe(&self, _path: &Path) -> Option<String> {
        self.0.clone()
    }
}

/// Write a zip archive; entries ending in `/` are directories.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
        } else {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Write a package archive with a `wapkg.json` manifest.
pub fn package_zip(
    path: &Path,
    name: &str,
    revision: i64,
    requirements: &[&str],
    entries: &[(&str, &[u8])],
) -> PathBuf {
    let manifest = json!({
        "version": 1,
        "name": name,
        "revision": revision,
        "requirements": requirements,
    })
    .to_string();

    let mut all: Vec<(&str, &[u8])> = vec![("wapkg.json", manifest.as_bytes())];
    all.extend_from_slice(entries);
    write_zip(path, &all);
    path.to_path_buf()
}

/// Write a distribution installer archive with a `wadist.json` manifest.
pub fn dist_zip(path: &Path, suggested_name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let manifest = json!({ "version": 1, "suggestedName": suggested_name }).to_string();
    let mut all: Vec<(&str, &[u8])> = vec![("wadist.json", manifest.as_bytes())];
    all.extend_from_slice(entries);
    write_zip(path, &all);
    path.to_path_buf()
}

/// A package source served from a local directory through `file://` URLs.
pub struct TestSource {
    pub dir: PathBuf,
    packages: Map<String, Value>,
    distributions: Map<String, Value>,
}

impl TestSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        fs::create_dir_all(&dir).unwrap();
        Self {
            dir,
            packages: Map::new(),
            distributions: Map::new(),
        }
    }

    /// Base URL, with the trailing slash relative paths resolve against
    pub fn url(&self) -> String {
        Url::from_directory_path(&self.dir).unwrap().to_string()
    }

    /// Checksum string for a file inside the source
    pub fn checksum_of(&self, file: &str) -> String {
        let data = fs::read(self.dir.join(file)).unwrap();
        hash_bytes(HashAlgorithm::Sha256, &data).to_prefixed_string()
    }

    /// A direct descriptor for an archive inside the source, with its checksum
    pub fn direct(&self, revision: i64, file: &str, requirements: &[&str]) -> Value {
        json!({
            "revision": revision,
            "path": file,
            "checksum": self.checksum_of(file),
            "requirements": requirements,
        })
    }

    pub fn package(&mut self, name: &str, descriptor: Value) -> &mut Self {
        self.packages.insert(name.to_string(), descriptor);
        self
    }

    pub fn distribution(&mut self, name: &str, file: &str) -> &mut Self {
        let descriptor = json!({ "path": file, "checksum": self.checksum_of(file) });
        self.distributions.insert(name.to_string(), descriptor);
        self
    }

    /// Write `index.json`
    pub fn publish(&self) {
        let index = json!({
            "repo": "wapkg",
            "version": 1,
            "distributions": self.distributions,
            "packages": self.packages,
        });
        fs::write(self.dir.join("index.json"), index.to_string()).unwrap();
    }
}

/// A repository in a fresh temp dir whose distributions report `version`.
///
/// Returns (TempDir, Repository) - keep the TempDir alive to prevent cleanup.
pub fn setup_repository(version: Option<&str>) -> (TempDir, Repository) {
    let temp = tempfile::tempdir().unwrap();
    let repo = Repository::open_at(temp.path().join("wd"))
        .unwrap()
        .with_prober(Arc::new(FixedProber(version.map(str::to_string))));
    (temp, repo)
}

/// Create an empty distribution called `name` in `repo` and open it.
pub fn create_distribution(repo: &Repository, name: &str) -> Distribution {
    let root = repo.dists_root().join(name);
    fs::create_dir_all(&root).unwrap();
    distro::create_marker(&root).unwrap();
    fs::write(root.join("WA.exe"), b"MZ").unwrap();
    repo.get_distribution(name).unwrap()
}

/// Every path below `root` outside the marker directory, with file contents.
pub fn tree_snapshot(root: &Path) -> Vec<(String, Option<Vec<u8>>)> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, Option<Vec<u8>>)>) {
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if rel == ".wadist" {
                continue;
            }
            if entry.file_type().unwrap().is_dir() {
                out.push((rel, None));
                walk(root, &path, out);
            } else {
                out.push((rel, Some(fs::read(&path).unwrap())));
            }
        }
    }

    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
