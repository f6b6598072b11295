//! Runtime configuration.
//!
//! [`StoreConfig`] and [`FinderConfig`] are what the library consumes;
//! [`ConfigFile`] reads them (plus CLI-only settings) from
//! `~/.ssim/config.ini`.

mod file;
mod size;

pub use file::{config_directory, config_file_path, ConfigFile};
pub use size::{format_size, parse_size, SizeParseError};

use std::path::PathBuf;
use std::time::Duration;

/// Default instance-file budget (256MB).
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 256 * 1024 * 1024;

/// Default time between cull cycles.
pub const DEFAULT_CULL_INTERVAL: Duration = Duration::from_secs(300);

/// Default number of write-back worker threads.
pub const DEFAULT_WRITE_BACK_THREADS: usize = 3;

/// Settings for a [`DirectoryStore`](crate::store::DirectoryStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Existing, writable directory under which the cache directory is created
    pub storage_root: PathBuf,
    /// Instance-file budget; 0 disables culling
    pub max_size_bytes: u64,
    /// Time between cull cycles; zero disables culling
    pub cull_interval: Duration,
}

impl StoreConfig {
    /// Culling disabled until a budget and interval are set.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            max_size_bytes: 0,
            cull_interval: Duration::ZERO,
        }
    }

    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn with_cull_interval(mut self, interval: Duration) -> Self {
        self.cull_interval = interval;
        self
    }

    /// True when the background cull should run.
    pub fn cull_enabled(&self) -> bool {
        self.max_size_bytes > 0 && !self.cull_interval.is_zero()
    }
}

/// Settings for an [`ImageFinder`](crate::finder::ImageFinder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderConfig {
    pub store: StoreConfig,
    pub write_back_threads: usize,
}

impl FinderConfig {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            write_back_threads: DEFAULT_WRITE_BACK_THREADS,
        }
    }

    /// At least one thread is always used.
    pub fn with_write_back_threads(mut self, threads: usize) -> Self {
        self.write_back_threads = threads.max(1);
        self
    }
}
