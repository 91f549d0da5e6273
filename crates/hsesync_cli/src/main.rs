//! hsesync CLI
//!
//! Maintenance tools for the local store of the HSE records app.
//!
//! # Commands
//!
//! - `inspect` - Display log size and per-partition record counts
//! - `pending` - List operations the remote has not confirmed yet
//! - `cache` - Dump the cached records of one collection
//! - `verify` - Scan the log for corruption
//! - `compact` - Rewrite the log as a snapshot

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// hsesync command-line store tools.
#[derive(Parser)]
#[command(name = "hsesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display log size and per-partition record counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List unsynced operations with their age and attempt counts
    Pending {
        /// Maximum number of operations to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump the cached records of a collection
    Cache {
        /// Collection name, e.g. incidents
        collection: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Scan the log for corruption
    Verify,

    /// Rewrite the log as a snapshot of the live records
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Pending { limit, format } => {
            let path = cli.path.ok_or("Store path required for pending")?;
            commands::pending::run(&path, limit, &format)?;
        }
        Commands::Cache { collection, format } => {
            let path = cli.path.ok_or("Store path required for cache")?;
            commands::cache::run(&path, &collection, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("hsesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("hsesync engine v{}", hsesync_engine::VERSION);
        }
    }

    Ok(())
}
