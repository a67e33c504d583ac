//! # teslastream CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Config loading and validation
//! - The acquisition pipeline and its lifecycle
//! - Graceful shutdown

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "teslastream starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// `silent` in the run config lowers the default level the same way `-q`
/// does, unless `-v` was given explicitly.
fn init_logging(cli: &Cli) -> Result<()> {
    let silent = match &cli.command {
        Commands::Run(args) => config_requests_silence(&args.config),
        Commands::Validate(_) => false,
    };

    let default_log_level = if cli.quiet || (silent && cli.verbose == 0) {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        // The exporter is installed by the pipeline once the config is known
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
    })
}

/// Peek at `acquisition.silent`; load errors are reported later by the command
fn config_requests_silence(path: &std::path::Path) -> bool {
    config_loader::ConfigLoader::load_from_path(path)
        .map(|config| config.acquisition.silent)
        .unwrap_or(false)
}
