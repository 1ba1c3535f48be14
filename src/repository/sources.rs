// src/repository/sources.rs

//! External sources list
//!
//! A JSON array of source URLs published at a well-known location and
//! merged once per process after the configured sources.

use crate::error::{Error, Result};
use tracing::{debug, warn};

use super::client::Fetcher;

/// Parse an external sources document
pub fn parse_sources_list(raw: &[u8]) -> Result<Vec<String>> {
    let sources: Vec<String> = serde_json::from_slice(raw)
        .map_err(|e| Error::ParseError(format!("Invalid external sources list: {e}")))?;
    Ok(sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Fetch the external list; failures yield an empty list
pub fn fetch_external_sources(fetcher: &dyn Fetcher, url: &str) -> Vec<String> {
    match fetcher.fetch_bytes(url).and_then(|raw| parse_sources_list(&raw)) {
        Ok(sources) => {
            debug!("External sources list {} provided {} sources", url, sources.len());
            sources
        }
        Err(e) => {
            warn!("Ignoring external sources list {}: {}", url, e);
            Vec::new()
        }
    }
}

/// Append `extra` to `sources`, skipping entries already present
pub fn merge_sources(sources: &mut Vec<String>, extra: Vec<String>) {
    for source in extra {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
}
