//! Log and replay configuration.

use crate::replay::CancellationToken;
use crate::types::FormatVersion;
use std::time::Duration;

/// Configuration for opening a log writer.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Size at which the active segment is sealed and a new one opened.
    pub max_segment_size: u64,

    /// Age at which the active segment is sealed (`Duration::ZERO` = never).
    pub max_segment_age: Duration,

    /// Whether each append waits for `sync` before returning.
    ///
    /// Turning this off trades the per-record durability guarantee for
    /// throughput; call [`crate::LogWriter::sync`] at the commit boundary
    /// instead.
    pub sync_on_append: bool,

    /// Newest format version the writer emits.
    ///
    /// Records at a newer version are written at this one, and kinds
    /// introduced after it are refused. Seals are stamped with it too.
    pub format_version: FormatVersion,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_segment_size: 64 * 1024 * 1024, // 64 MB
            max_segment_age: Duration::ZERO,    // disabled
            sync_on_append: true,
            format_version: FormatVersion::CURRENT,
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the log directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the segment rotation size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the segment rotation age.
    #[must_use]
    pub const fn max_segment_age(mut self, age: Duration) -> Self {
        self.max_segment_age = age;
        self
    }

    /// Sets whether every append syncs.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Sets the newest format version the writer emits.
    #[must_use]
    pub const fn format_version(mut self, version: FormatVersion) -> Self {
        self.format_version = version;
        self
    }
}

/// Configuration for a replay pass.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Worker threads for [`crate::replay_parallel`]. Values below 1 are
    /// treated as 1.
    pub workers: usize,

    /// Checked between records; once cancelled the pass stops.
    pub cancel: CancellationToken,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            cancel: CancellationToken::new(),
        }
    }
}

impl ReplayConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Uses `token` to cancel the pass.
    #[must_use]
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}
