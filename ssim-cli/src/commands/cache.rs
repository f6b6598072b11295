//! `ssim cache`

use clap::Subcommand;
use ssim::config::{format_size, parse_size, ConfigFile, StoreConfig};
use ssim::store::{CullReport, DirectoryStore, RenditionStore};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show instance file count and total size
    Stats,
    /// Run one cull cycle now
    Cull {
        /// Budget to cull down to (default: [cache] max_size)
        #[arg(long)]
        max_size: Option<String>,
    },
}

pub fn run(action: CacheAction, config: &ConfigFile) -> Result<(), CliError> {
    let cache_dir = &config.cache.directory;
    if !cache_dir.is_dir() {
        println!("Rendition cache: {} (not created yet)", cache_dir.display());
        return Ok(());
    }

    // No interval: the background cull stays off for one-shot commands
    let store = DirectoryStore::open(&StoreConfig::new(cache_dir)).map_err(CliError::Cache)?;
    println!("Rendition cache: {}", store.storage_dir().display());

    let result = match action {
        CacheAction::Stats => stats(&store, config),
        CacheAction::Cull { max_size } => {
            let budget = match max_size {
                Some(size) => parse_size(&size)?,
                None => config.cache.max_size,
            };
            cull(&store, budget)
        }
    };

    store.close()?;
    result
}

fn stats(store: &DirectoryStore, config: &ConfigFile) -> Result<(), CliError> {
    let (files, bytes) = store.disk_usage()?;
    println!("  Renditions: {}", files);
    println!(
        "  Size:       {} of {}",
        format_size(bytes),
        format_size(config.cache.max_size)
    );
    Ok(())
}

fn cull(store: &DirectoryStore, budget: u64) -> Result<(), CliError> {
    match store.cull_to(budget)? {
        Some(report) => print_report(&report),
        None => println!("  Within budget ({}), nothing to cull", format_size(budget)),
    }
    Ok(())
}

fn print_report(report: &CullReport) {
    println!(
        "  Deleted {} renditions, freed {}",
        report.files_deleted,
        format_size(report.bytes_freed)
    );
    println!(
        "  Size: {} -> {} in {:.1?}",
        format_size(report.size_before),
        format_size(report.size_after),
        report.duration
    );
    if report.delete_failures > 0 {
        println!("  {} files could not be deleted", report.delete_failures);
    }
}
