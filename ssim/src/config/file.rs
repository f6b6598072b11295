//! `~/.ssim/config.ini`
//!
//! ```ini
//! [cache]
//! directory = ~/.ssim/cache
//! max_size = 256MB
//! cull_interval = 300
//!
//! [sources]
//! directory = /srv/images
//!
//! [writeback]
//! threads = 3
//! ```
//!
//! Every key is optional; a missing file yields the defaults.

use super::size::{format_size, parse_size};
use super::{
    FinderConfig, StoreConfig, DEFAULT_CULL_INTERVAL, DEFAULT_MAX_SIZE_BYTES,
    DEFAULT_WRITE_BACK_THREADS,
};
use crate::error::ConfigError;
use ini::{Ini, Properties};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub max_size: u64,
    pub cull_interval: Duration,
}

/// `[sources]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    /// Root directory of source images; the CLI requires it
    pub directory: Option<PathBuf>,
}

/// `[writeback]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBackSettings {
    pub threads: usize,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub sources: SourceSettings,
    pub writeback: WriteBackSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                directory: config_directory().join("cache"),
                max_size: DEFAULT_MAX_SIZE_BYTES,
                cull_interval: DEFAULT_CULL_INTERVAL,
            },
            sources: SourceSettings::default(),
            writeback: WriteBackSettings {
                threads: DEFAULT_WRITE_BACK_THREADS,
            },
        }
    }
}

impl ConfigFile {
    /// Load from `~/.ssim/config.ini`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, or return defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    /// Library configuration derived from the file.
    ///
    /// The cache directory is used as the store's storage root.
    pub fn finder_config(&self) -> FinderConfig {
        let store = StoreConfig::new(&self.cache.directory)
            .with_max_size_bytes(self.cache.max_size)
            .with_cull_interval(self.cache.cull_interval);
        FinderConfig::new(store).with_write_back_threads(self.writeback.threads)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(dir) = non_empty(section, "directory") {
                config.cache.directory = expand_tilde(dir);
            }
            if let Some(v) = section.get("max_size") {
                config.cache.max_size = parse_size(v).map_err(|e| {
                    invalid("cache", "max_size", v, &e.to_string())
                })?;
            }
            if let Some(v) = section.get("cull_interval") {
                let secs: i64 = v.trim().parse().map_err(|_| {
                    invalid("cache", "cull_interval", v, "must be an integer number of seconds")
                })?;
                // Non-positive disables culling
                config.cache.cull_interval = Duration::from_secs(secs.max(0) as u64);
            }
        }

        if let Some(section) = ini.section(Some("sources")) {
            config.sources.directory = non_empty(section, "directory").map(expand_tilde);
        }

        if let Some(section) = ini.section(Some("writeback")) {
            if let Some(v) = section.get("threads") {
                config.writeback.threads = v
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| invalid("writeback", "threads", v, "must be at least 1"))?;
            }
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("cache"))
            .set("directory", self.cache.directory.to_string_lossy())
            .set("max_size", format_size(self.cache.max_size))
            .set("cull_interval", self.cache.cull_interval.as_secs().to_string());
        if let Some(dir) = &self.sources.directory {
            ini.with_section(Some("sources"))
                .set("directory", dir.to_string_lossy());
        }
        ini.with_section(Some("writeback"))
            .set("threads", self.writeback.threads.to_string());
        ini
    }
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// `~/.ssim`
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssim")
}

/// `~/.ssim/config.ini`
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}
