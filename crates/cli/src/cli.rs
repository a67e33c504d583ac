//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// teslastream - vehicle telemetry acquisition
#[derive(Parser, Debug)]
#[command(
    name = "teslastream",
    author,
    version,
    about = "Vehicle telemetry acquisition loop",
    long_about = "Polls the vehicle owner API within a request budget, follows the vehicle's\n\
                  sleep/wake cycle, samples sub-states and keeps one streaming session open.\n\n\
                  Everything collected is routed to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TESLASTREAM_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TESLASTREAM_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the acquisition loop until interrupted
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "TESLASTREAM_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the vehicle offset into the account's vehicle list
    #[arg(long, env = "TESLASTREAM_VEHICLE")]
    pub vehicle: Option<usize>,

    /// Respect vehicle sleep instead of probing it awake
    #[arg(long, env = "TESLASTREAM_ZZZ")]
    pub zzz: bool,

    /// Override the REST request budget per minute
    #[arg(long, env = "TESLASTREAM_MAX_RPM")]
    pub max_rpm: Option<u32>,

    /// REST bearer token (takes precedence over the config file)
    #[arg(long, env = "TESLASTREAM_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Run against the built-in mock vehicle instead of the real upstream
    #[arg(long)]
    pub mock: bool,

    /// Validate configuration and exit without starting acquisition
    #[arg(long)]
    pub dry_run: bool,

    /// Record channel capacity between acquisition and dispatcher
    #[arg(long, default_value = "100", env = "TESLASTREAM_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TESLASTREAM_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
