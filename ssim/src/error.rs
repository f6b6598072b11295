//! Error types for the rendition cache.
//!
//! Each collaborator has its own error enum; [`SsimError`] is what callers of
//! [`ImageFinder`](crate::finder::ImageFinder) see.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error on a file or directory inside the store
    #[error("Store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata record could not be read or written
    #[error("Invalid metadata record at {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The store has been closed
    #[error("Store is closed")]
    Closed,

    /// A cached handle was read after its read lock was released
    #[error("Cached rendition handle was already released")]
    Released,

    /// An incomplete key was passed where a complete one is required
    #[error("Rendition key is incomplete: {0}")]
    InvalidKey(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the image codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Source bytes could not be decoded
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Rendition could not be encoded
    #[error("Failed to encode image as {mime_type}: {reason}")]
    Encode { mime_type: String, reason: String },

    /// No encoder exists for the requested mime type
    #[error("Unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    /// Reading the source stream failed
    #[error("Failed to read image source: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures looking up raw source data for a uid.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// No source exists for the uid
    #[error("No source image for uid '{0}'")]
    NotFound(String),

    /// The source exists but could not be read
    #[error("Failed to read source for uid '{uid}': {source}")]
    Io {
        uid: String,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Storage root is missing, not a directory, or not writable
    #[error("Storage root {} must be an existing, writable directory", path.display())]
    StorageRoot { path: PathBuf },

    /// Configuration file could not be parsed
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// Configuration file could not be written
    #[error("Failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration value is out of range or malformed
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Top-level error returned by the request orchestrator.
#[derive(Debug, Error)]
pub enum SsimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// The write-back runner no longer accepts tasks
    #[error("Write-back runner is closed")]
    WriteBackRejected,

    /// Worker threads could not be started
    #[error("Failed to start write-back threads: {0}")]
    Spawn(#[source] std::io::Error),
}
