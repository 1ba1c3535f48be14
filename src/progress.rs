// src/progress.rs

//! Download progress reporting
//!
//! Fetchers report `(bytes so far, total if known)` after every chunk to a
//! [`ProgressSink`]. Implementations:
//! - `SilentProgress`: no-op
//! - `LogProgress`: periodic `tracing` lines
//! - `CallbackProgress`: forwards to a closure (the daemon turns these into
//!   `quack!progress` notifications)
//! - `CliProgress`: an indicatif byte bar

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Receiver of download progress
pub trait ProgressSink: Send + Sync {
    /// Called once before the first chunk
    fn start(&self, _name: &str, _total: Option<u64>) {}

    /// Called after every chunk
    fn advance(&self, current: u64, total: Option<u64>);

    /// Called once the transfer ended, successfully or not
    fn finish(&self) {}
}

/// Discards all progress
#[derive(Debug, Default)]
pub struct SilentProgress;

impl SilentProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressSink for SilentProgress {
    fn advance(&self, _current: u64, _total: Option<u64>) {}
}

/// Logs progress through tracing every `interval` bytes
pub struct LogProgress {
    name: String,
    interval: u64,
    last_logged: AtomicU64,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval: 4 * 1024 * 1024,
            last_logged: AtomicU64::new(0),
        }
    }

    /// Log every `interval` bytes instead of the default 4 MiB
    pub fn with_log_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }
}

impl ProgressSink for LogProgress {
    fn advance(&self, current: u64, total: Option<u64>) {
        let last = self.last_logged.load(Ordering::Relaxed);
        if current < last + self.interval && Some(current) != total {
            return;
        }
        self.last_logged.store(current, Ordering::Relaxed);

        match total {
            Some(total) if total > 0 => info!(
                "{}: {} / {} KiB ({}%)",
                self.name,
                current / 1024,
                total / 1024,
                current * 100 / total
            ),
            _ => info!("{}: {} KiB", self.name, current / 1024),
        }
    }

    fn finish(&self) {
        info!("{}: done", self.name);
    }
}

/// Forwards progress to a closure
pub struct CallbackProgress<F>
where
    F: Fn(u64, Option<u64>) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackProgress<F>
where
    F: Fn(u64, Option<u64>) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressSink for CallbackProgress<F>
where
    F: Fn(u64, Option<u64>) + Send + Sync,
{
    fn advance(&self, current: u64, total: Option<u64>) {
        (self.callback)(current, total);
    }
}

/// Terminal progress bar
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for CliProgress {
    fn start(&self, name: &str, total: Option<u64>) {
        self.bar.set_message(format!("Downloading {name}"));
        match total {
            Some(total) => self.bar.set_length(total),
            None => self.bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner} {msg} {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            ),
        }
    }

    fn advance(&self, current: u64, _total: Option<u64>) {
        self.bar.set_position(current);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Render progress as `current/total`, with `?` for an unknown total
pub fn format_progress(current: u64, total: Option<u64>) -> String {
    match total {
        Some(total) => format!("{current}/{total}"),
        None => format!("{current}/?"),
    }
}
