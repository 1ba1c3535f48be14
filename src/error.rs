// src/error.rs

//! Error types for wapkg
//!
//! Operations that mutate a distribution report expected failures through
//! [`crate::Outcome`]. This type covers everything else: broken on-disk
//! state, corrupt archives, database and I/O failures.

use thiserror::Error;

/// Result type alias for wapkg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wapkg operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Unsupported {what} format version: {found}")]
    FormatVersion { what: &'static str, found: String },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

impl Error {
    /// Whether this error came from the transport layer.
    ///
    /// Transport failures make a source unusable for the current request
    /// and are skipped in favour of the next configured source.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::DownloadError(_))
    }
}
