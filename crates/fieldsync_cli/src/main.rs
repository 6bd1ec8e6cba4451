//! FieldSync CLI
//!
//! Command-line tools for inspecting and maintaining FieldSync store
//! directories.
//!
//! # Commands
//!
//! - `status` - Show queue counts and cache occupancy
//! - `inspect` - List queued actions in dispatch order
//! - `verify` - Replay both journals, reporting torn tails and corruption
//! - `compact` - Rewrite both journals down to live state
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FieldSync store maintenance tools.
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show queue counts and cache occupancy
    Status {
        /// Path to the store directory
        dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List queued actions in dispatch order
    Inspect {
        /// Path to the store directory
        dir: PathBuf,

        /// Maximum number of actions to list
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Replay both journals, reporting torn tails and corruption
    Verify {
        /// Path to the store directory
        dir: PathBuf,
    },

    /// Rewrite both journals down to live state
    Compact {
        /// Path to the store directory
        dir: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Status { dir, json } => {
            commands::status::run(&dir, json)?;
        }
        Commands::Inspect { dir, limit } => {
            commands::inspect::run(&dir, limit)?;
        }
        Commands::Verify { dir } => {
            commands::verify::run(&dir)?;
        }
        Commands::Compact { dir } => {
            commands::compact::run(&dir)?;
        }
        Commands::Version => {
            println!("FieldSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Journal format v{}",
                fieldsync_store::JOURNAL_FORMAT_VERSION
            );
        }
    }

    Ok(())
}
