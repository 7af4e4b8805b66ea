//! ERS CLI
//!
//! Command-line tools for entity-relationship storages.
//!
//! # Commands
//!
//! - `inspect` - List types with entity counts and attribute names
//! - `freeze` - Convert a storage to an immutable snapshot and write its dump
//! - `verify-dump` - Load a dump, check its digest and summarize it

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ERS command-line storage tools.
#[derive(Parser)]
#[command(name = "ers")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments selecting and opening a storage.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Backend id (ram, sql, kv)
    #[arg(short, long, default_value = "sql")]
    pub backend: String,

    /// Path to the storage directory
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// JSON file with backend settings
    #[arg(short, long)]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List types with entity counts and attribute names
    Inspect {
        #[command(flatten)]
        storage: StorageArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Convert a storage to an immutable snapshot and write its dump
    Freeze {
        #[command(flatten)]
        storage: StorageArgs,

        /// Storage id of the snapshot
        #[arg(long)]
        id: String,

        /// Dump file to write
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Load a dump, check its digest and print a summary
    VerifyDump {
        /// Dump file to check
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { storage, format } => {
            commands::inspect::run(&storage, &format)?;
        }
        Commands::Freeze { storage, id, out } => {
            commands::freeze::run(&storage, &id, &out)?;
        }
        Commands::VerifyDump { file, format } => {
            commands::verify_dump::run(&file, &format)?;
        }
        Commands::Version => {
            println!("ERS CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
