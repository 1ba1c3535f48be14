// src/repository/client.rs

//! Byte transport for sources
//!
//! [`Fetcher`] is the seam between resolution and the network. The default
//! [`HttpFetcher`] wraps a blocking reqwest client with retry support and
//! also serves `file://` URLs, which local mirrors and the test suite use.

use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a request that fails before a response arrives
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Read increment for streamed downloads (128 KiB)
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Fetches bytes from a URL
///
/// Failures to reach or read the remote end are reported as
/// [`Error::DownloadError`]; callers treat those as "skip this source".
pub trait Fetcher: Send + Sync {
    /// Fetch a small document into memory
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// Stream a URL into `dest`, reporting progress after every chunk
    ///
    /// Returns the number of bytes written.
    fn fetch_to_file(&self, url: &str, dest: &Path, progress: &dyn ProgressSink) -> Result<u64>;
}

/// Copy `reader` into `file` in [`CHUNK_SIZE`] increments
fn stream_to_file<R: Read>(
    reader: &mut R,
    file: &mut File,
    total: Option<u64>,
    progress: &dyn ProgressSink,
) -> Result<u64> {
    let mut downloaded: u64 = 0;
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| Error::IoError(format!("Failed to write data: {e}")))?;

        downloaded += bytes_read as u64;
        progress.advance(downloaded, total);
    }

    file.flush()?;
    Ok(downloaded)
}

/// Name shown for a download: the last URL segment
pub fn display_name(url: &str) -> &str {
    url.rsplit('/').find(|s| !s.is_empty()).unwrap_or(url)
}

/// HTTP and `file://` fetcher
pub struct HttpFetcher {
    client: OnceLock<Client>,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: OnceLock::new(),
            max_retries: MAX_RETRIES,
        }
    }

    /// The blocking client is built on first use so that constructing a
    /// fetcher inside an async runtime is harmless.
    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(crate::version::tool_version())
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn local_path(url: &str) -> Option<std::path::PathBuf> {
        let parsed = Url::parse(url).ok()?;
        if parsed.scheme() != "file" {
            return None;
        }
        parsed.to_file_path().ok()
    }

    /// Send a GET request, retrying when no response arrives
    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let client = self.client()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);

        if let Some(path) = Self::local_path(url) {
            return fs::read(&path).map_err(|e| {
                Error::DownloadError(format!("Failed to read {}: {e}", path.display()))
            });
        }

        let bytes = self
            .get(url)?
            .bytes()
            .map_err(|e| Error::DownloadError(format!("Failed to read response: {e}")))?;
        Ok(bytes.to_vec())
    }

    fn fetch_to_file(&self, url: &str, dest: &Path, progress: &dyn ProgressSink) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {e}", parent.display()))
            })?;
        }

        let mut file = File::create(dest).map_err(|e| {
            Error::IoError(format!("Failed to create file {}: {e}", dest.display()))
        })?;

        let name = display_name(url);
        let result = if let Some(path) = Self::local_path(url) {
            let mut source = File::open(&path).map_err(|e| {
                Error::DownloadError(format!("Failed to open {}: {e}", path.display()))
            })?;
            let total = source.metadata().ok().map(|m| m.len());
            progress.start(name, total);
            stream_to_file(&mut source, &mut file, total, progress)
        } else {
            let mut response = self.get(url)?;
            let total = response.content_length();
            progress.start(name, total);
            stream_to_file(&mut response, &mut file, total, progress)
        };
        progress.finish();

        let written = result?;
        debug!("Downloaded {} bytes from {}", written, url);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CallbackProgress, SilentProgress};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn test_fetch_bytes_from_file_url() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("index.json");
        fs::write(&src, b"{}").unwrap();

        let fetcher = HttpFetcher::new();
        assert_eq!(fetcher.fetch_bytes(&file_url(&src)).unwrap(), b"{}");
    }

    #[test]
    fn test_missing_file_is_transport_error() {
        let temp = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new();
        let err = fetcher
            .fetch_bytes(&file_url(&temp.path().join("missing.json")))
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_fetch_to_file_reports_chunks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("big.bin");
        let payload = vec![7u8; CHUNK_SIZE * 2 + 10];
        fs::write(&src, &payload).unwrap();

        let seen = Mutex::new(Vec::new());
        let sink = CallbackProgress::new(|cur, total| seen.lock().unwrap().push((cur, total)));

        let dest = temp.path().join("cache").join("out.bin");
        let fetcher = HttpFetcher::new();
        let written = fetcher.fetch_to_file(&file_url(&src), &dest, &sink).unwrap();

        assert_eq!(written, payload.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), payload);

        let total = Some(payload.len() as u64);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (CHUNK_SIZE as u64, total),
                (CHUNK_SIZE as u64 * 2, total),
                (payload.len() as u64, total),
            ]
        );
    }

    #[test]
    fn test_fetch_to_file_missing_source() {
        let temp = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new();
        let err = fetcher
            .fetch_to_file(
                &file_url(&temp.path().join("nope.zip")),
                &temp.path().join("out"),
                &SilentProgress::new(),
            )
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("http://host/pkgs/pak.zip"), "pak.zip");
        assert_eq!(display_name("http://host/pkgs/"), "pkgs");
    }
}
