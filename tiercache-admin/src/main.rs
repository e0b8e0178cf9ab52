use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tiercache_core::{init_logging, CacheConfig, LoggingConfig};
use tracing::{debug, error};

mod commands;
mod target;

use commands::*;
use target::StoreTarget;

#[derive(Parser)]
#[command(name = "tiercache-admin")]
#[command(about = "TierCache Administration CLI Tool")]
#[command(version = "0.2.0")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the cache files (defaults to the configured base_dir)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Cache instance name
    #[arg(short, long)]
    name: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List live keys
    Keys,
    /// Show the stored record for a key
    Inspect {
        key: String,
    },
    /// Remove a key
    Remove {
        key: String,
    },
    /// Remove every entry
    Clear {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Delete rows past their expiration time
    PurgeExpired,
    /// Checkpoint the journal and reclaim free pages
    Compact,
    /// Show storage statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cache instances in the directory
    List,
    /// Write a configuration file with default values
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };

    let logging = if cli.verbose {
        LoggingConfig {
            level: "DEBUG".to_string(),
            ..config.logging.clone()
        }
    } else {
        config.logging.clone()
    };
    init_logging(&logging)?;

    debug!("TierCache Admin CLI v0.2.0 starting");

    let dir = cli.dir.unwrap_or_else(|| config.base_dir.clone());

    let name = cli.name;
    let open = || -> Result<StoreTarget> {
        let name = name
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--name is required for this command"))?;
        StoreTarget::open(&dir, name, &config)
    };

    let result = match cli.command {
        Commands::InitConfig { path, force } => execute_init_config(&path, force),
        Commands::List => execute_list(&dir),
        Commands::Keys => execute_keys(&open()?),
        Commands::Inspect { key } => execute_inspect(&open()?, &key),
        Commands::Remove { key } => execute_remove(&open()?, &key),
        Commands::Clear { yes } => execute_clear(&open()?, yes),
        Commands::PurgeExpired => execute_purge_expired(&open()?),
        Commands::Compact => execute_compact(&open()?),
        Commands::Stats { json } => execute_stats(&open()?, json),
    };

    match result {
        Ok(_) => {
            debug!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            Err(e)
        }
    }
}
