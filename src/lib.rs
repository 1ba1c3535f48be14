// src/lib.rs

//! wapkg: package manager for application distributions
//!
//! A distribution is an installed application tree with its own manifest
//! store. Packages are resolved from remote sources for the distribution's
//! version, installed with their requirements, and removed again without
//! leaving files behind.
//!
//! # Architecture
//!
//! - `repository`: the set of distributions plus the configured sources
//! - `distro`: one distribution; install and remove under its lock
//! - `index`: remote index documents and variant/dependency resolution
//! - `db`: the per-distribution SQLite manifest store
//! - `archive`: package and distribution zip archives
//! - `daemon`: the WapkgQuack UDP front end

pub mod archive;
pub mod daemon;
pub mod db;
pub mod distro;
mod error;
pub mod hash;
pub mod index;
pub mod lock;
pub mod outcome;
pub mod progress;
pub mod repository;
pub mod settings;
pub mod version;

pub use distro::Distribution;
pub use error::{Error, Result};
pub use hash::{Checksum, HashAlgorithm};
pub use outcome::Outcome;
pub use progress::{CallbackProgress, CliProgress, LogProgress, ProgressSink, SilentProgress};
pub use repository::{Fetcher, HttpFetcher, Repository};
pub use settings::Settings;
