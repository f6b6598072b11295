//! `ssim find`

use clap::Args;
use ssim::codec::ImageCrateCodec;
use ssim::config::{format_size, ConfigFile};
use ssim::key::UNKNOWN_DIMENSION;
use ssim::source::FileSourceResolver;
use ssim::ImageFinder;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Source image uid (path under the configured sources directory)
    pub uid: String,

    /// Target mime type (default: the source's)
    #[arg(long)]
    pub mime_type: Option<String>,

    /// Target width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Target height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Fit inside width x height instead of stretching
    #[arg(long)]
    pub preserve_aspect_ratio: bool,

    /// File to write the rendition to
    #[arg(long, short)]
    pub output: PathBuf,
}

pub fn run(args: FindArgs, config: &ConfigFile) -> Result<(), CliError> {
    let sources = config.sources.directory.clone().ok_or_else(|| {
        CliError::Config("[sources] directory is not set in the config file".to_string())
    })?;

    let cache_dir = &config.cache.directory;
    fs::create_dir_all(cache_dir).map_err(|e| {
        CliError::Config(format!(
            "cannot create cache directory {}: {}",
            cache_dir.display(),
            e
        ))
    })?;

    let finder = ImageFinder::open(
        FileSourceResolver::new(sources),
        ImageCrateCodec::new(),
        &config.finder_config(),
    )
    .map_err(CliError::Find)?;

    let data = finder
        .find(
            &args.uid,
            args.mime_type.as_deref(),
            to_dimension(args.width),
            to_dimension(args.height),
            args.preserve_aspect_ratio,
        )
        .map_err(CliError::Find)?;

    let bytes = data.read_to_vec().map_err(CliError::Read)?;
    let mime_type = data.mime_type().unwrap_or("unknown").to_string();
    let dimensions = match (data.width(), data.height()) {
        (Some(w), Some(h)) => format!("{}x{}", w, h),
        _ => "original size".to_string(),
    };
    drop(data);

    fs::write(&args.output, &bytes).map_err(|error| CliError::FileWrite {
        path: args.output.clone(),
        error,
    })?;

    // Waits for the write-back so the next run hits the cache
    finder.close().map_err(CliError::Find)?;

    info!(uid = %args.uid, output = %args.output.display(), "Rendition written");
    println!("Wrote {}", args.output.display());
    println!("  Type: {}", mime_type);
    println!("  Size: {}", dimensions);
    println!("  Bytes: {}", format_size(bytes.len() as u64));
    Ok(())
}

fn to_dimension(value: Option<u32>) -> i32 {
    value.map_or(UNKNOWN_DIMENSION, |v| i32::try_from(v).unwrap_or(i32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dimension() {
        assert_eq!(to_dimension(None), -1);
        assert_eq!(to_dimension(Some(0)), 0);
        assert_eq!(to_dimension(Some(640)), 640);
        assert_eq!(to_dimension(Some(u32::MAX)), i32::MAX);
    }

    #[test]
    fn test_missing_sources_directory_is_config_error() {
        let config = ConfigFile::default();
        let args = FindArgs {
            uid: "a.png".to_string(),
            mime_type: None,
            width: None,
            height: None,
            preserve_aspect_ratio: false,
            output: PathBuf::from("out.png"),
        };
        assert!(matches!(run(args, &config), Err(CliError::Config(_))));
    }
}
