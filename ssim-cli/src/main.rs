//! ssim CLI - find renditions and maintain the rendition cache.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::cache::CacheAction;
use commands::find::FindArgs;
use error::CliError;
use ssim::config::ConfigFile;
use ssim::logging::{default_log_dir, init_logging, DEFAULT_LOG_FILE};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ssim", version, about = "Scaled image rendition cache")]
struct Cli {
    /// Configuration file (default: ~/.ssim/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Produce a rendition of a source image and write it to a file
    Find(FindArgs),
    /// Inspect or cull the rendition cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

fn main() {
    let cli = Cli::parse();

    let _logging = match init_logging(&default_log_dir(), DEFAULT_LOG_FILE) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e).exit(),
    };

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    match cli.command {
        Commands::Find(args) => commands::find::run(args, &config),
        Commands::Cache { action } => commands::cache::run(action, &config),
    }
}
