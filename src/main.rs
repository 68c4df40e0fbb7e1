//! Tidewatch - self-updating container orchestrator
//!
//! Main entry point for the Tidewatch CLI and server.

mod cli;
mod cmd_jobs;
mod server;

use std::path::Path;

use clap::Parser;
use tracing::warn;

use tidewatch_config::{Config, ConfigLoader, ConfigValidator};

use crate::cli::{Cli, Commands};
use crate::cmd_jobs::handle_jobs_command;
use crate::server::{init_tracing, run_server};

/// Load the config file (defaults when absent) and apply CLI overrides.
fn load_config(path: &Path, data_dir: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = ConfigLoader::load_or_default(path)?;
    if let Some(dir) = data_dir {
        config.data_dir = dir.to_string_lossy().to_string();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config, cli.data_dir.as_deref())?;

    // Default: run the orchestrator with configured host and port
    let command = cli.command.unwrap_or(Commands::Run {
        host: None,
        port: None,
    });

    match command {
        Commands::Run { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            init_tracing(&config.logging, &config.log_path())?;
            let warnings = ConfigValidator::validate(&config).into_result()?;
            for warning in warnings {
                warn!(path = %warning.path, "{}", warning.message);
            }
            run_server(config).await
        }
        Commands::CheckConfig => {
            let result = ConfigValidator::validate(&config);
            for warning in &result.warnings {
                println!("warning: {}: {}", warning.path, warning.message);
            }
            for error in &result.errors {
                println!("error: {}: {}", error.path, error.message);
            }
            result.into_result()?;
            println!("Configuration OK ({})", cli.config.display());
            Ok(())
        }
        Commands::Jobs { action } => handle_jobs_command(action, &config).await,
    }
}
