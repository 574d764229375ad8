//! Tidemark CLI
//!
//! Command-line tools for Tidemark sync state.
//!
//! # Commands
//!
//! - `inspect` - Display config, watermark and pending mutations
//! - `enqueue` - Queue a mutation for the next sync
//! - `config` - Show or change the sync configuration

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tidemark sync state tools.
#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the sync state directory
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
    /// Display config, watermark and pending mutations
    Inspect {
        /// Show local record counts per kind
        #[arg(short, long)]
        records: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Queue a mutation for the next sync
    Enqueue {
        /// Entity kind (decks, cards, exams, study_sessions)
        #[arg(short, long)]
        kind: String,

        /// Action (create, update, delete)
        #[arg(short, long)]
        action: String,

        /// JSON payload
        #[arg(long)]
        payload: String,
    },

    /// Show or change the sync configuration
    Config {
        /// Enable or disable automatic sync
        #[arg(long)]
        auto_sync: Option<bool>,

        /// Interval between automatic syncs in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Enable or disable sync entirely
        #[arg(long)]
        enabled: Option<bool>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

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
        Commands::Inspect { records, format } => {
            let path = cli.path.ok_or("State path required for inspect")?;
            commands::inspect::run(&path, records, &format)?;
        }
        Commands::Enqueue {
            kind,
            action,
            payload,
        } => {
            let path = cli.path.ok_or("State path required for enqueue")?;
            commands::enqueue::run(&path, &kind, &action, &payload)?;
        }
        Commands::Config {
            auto_sync,
            interval_ms,
            enabled,
            format,
        } => {
            let path = cli.path.ok_or("State path required for config")?;
            let patch = commands::config::patch_from_flags(auto_sync, interval_ms, enabled);
            commands::config::run(&path, patch, &format)?;
        }
        Commands::Version => {
            println!("Tidemark CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
