//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hashsweep: hash-based malware sweep of a directory tree
#[derive(Parser, Debug)]
#[command(name = "hashsweep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Data directory holding the database, config and output logs
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory tree (or a single file)
    Scan {
        /// Root to scan
        #[arg(short, long)]
        path: PathBuf,

        /// Count eligible files first for an exact progress total
        #[arg(long)]
        count_first: bool,

        /// Number of concurrent hashing workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Do not refresh the signature database before scanning
        #[arg(long)]
        offline: bool,
    },

    /// Update signature database
    Update {
        /// Download even if the database was already refreshed today
        #[arg(short, long)]
        force: bool,

        /// Install from a local feed archive instead of downloading
        #[arg(long, value_name = "ZIP")]
        import: Option<PathBuf>,
    },

    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show application and database information
    Info,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the configuration file location
    Path,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
