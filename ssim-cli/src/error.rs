//! CLI errors with user-facing messages and exit codes.

use ssim::config::SizeParseError;
use ssim::error::{ConfigError, ResolverError, StoreError};
use ssim::SsimError;
use std::fmt;
use std::path::PathBuf;
use std::process;

#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration file or setting problem
    Config(String),
    /// Invalid `--max-size`
    InvalidSize(SizeParseError),
    /// The finder could not be opened or the request failed
    Find(SsimError),
    /// Cache maintenance failed
    Cache(SsimError),
    /// Rendition bytes could not be read
    Read(std::io::Error),
    /// Output file could not be written
    FileWrite {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl CliError {
    /// Print the error (and a hint where one helps) and exit with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Find(SsimError::Resolver(ResolverError::NotFound(_))) => {
                eprintln!();
                eprintln!("Uids are paths relative to [sources] directory in the config file.");
            }
            CliError::Find(SsimError::Config(ConfigError::StorageRoot { .. }))
            | CliError::Cache(SsimError::Config(ConfigError::StorageRoot { .. })) => {
                eprintln!();
                eprintln!("Check [cache] directory in {}", ssim::config::config_file_path().display());
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::InvalidSize(e) => write!(f, "{}", e),
            CliError::Find(e) => write!(f, "Failed to find rendition: {}", e),
            CliError::Cache(e) => write!(f, "Cache operation failed: {}", e),
            CliError::Read(e) => write!(f, "Failed to read rendition: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) | CliError::Read(e) => Some(e),
            CliError::InvalidSize(e) => Some(e),
            CliError::Find(e) | CliError::Cache(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Config(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Cache(e.into())
    }
}

impl From<SizeParseError> for CliError {
    fn from(e: SizeParseError) -> Self {
        CliError::InvalidSize(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_write_message_names_path() {
        let err = CliError::FileWrite {
            path: PathBuf::from("/out/thumb.png"),
            error: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to write file '/out/thumb.png': denied"
        );
    }

    #[test]
    fn test_find_error_wraps_library_message() {
        let err = CliError::Find(ResolverError::NotFound("cat.png".to_string()).into());
        assert_eq!(
            err.to_string(),
            "Failed to find rendition: No source image for uid 'cat.png'"
        );
    }
}
