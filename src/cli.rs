//! CLI definitions for Tidewatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tidewatch CLI.
#[derive(Parser)]
#[command(name = "tidewatch")]
#[command(about = "Self-updating container orchestrator")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    /// Data directory (overrides `data_dir` from the config file)
    #[arg(short, long, global = true, env = "TIDEWATCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the orchestrator in foreground (default)
    Run {
        /// Server host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Server port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Job store commands
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List persisted jobs
    List {
        /// Only jobs from this store
        #[arg(long)]
        store: Option<String>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}
