//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AcquisitionConfig, AcquisitionMode, SinkType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    email: String,
    mode: String,
    vehicle_offset: usize,
    max_requests_per_minute: u32,
    sub_states: Vec<String>,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            let settings = &config.acquisition;

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    email: config.account.email.clone(),
                    mode: format!("{:?}", settings.mode),
                    vehicle_offset: settings.vehicle_offset,
                    max_requests_per_minute: settings.max_requests_per_minute,
                    sub_states: settings
                        .aux_kinds
                        .iter()
                        .map(|k| k.endpoint().to_string())
                        .collect(),
                    sink_count: config.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AcquisitionConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let settings = &config.acquisition;

    if config.account.access_token.is_none() {
        warnings.push(
            "account.access_token not set - TESLASTREAM_ACCESS_TOKEN must be provided at run time"
                .to_string(),
        );
    }

    // Steady-state demand: one sleep check plus every sub-state per poll interval
    let per_minute = |secs: u64| 60.0 / secs.max(1) as f64;
    let demand = per_minute(settings.sleep_check_secs)
        + settings.aux_kinds.len() as f64 * per_minute(settings.poll_interval_secs);
    if demand > settings.max_requests_per_minute as f64 {
        warnings.push(format!(
            "expected {demand:.1} requests/min exceeds max_requests_per_minute = {} - samples will be suppressed",
            settings.max_requests_per_minute
        ));
    }

    let has_sink = |sink_type: SinkType| config.sinks.iter().any(|s| s.sink_type == sink_type);

    if settings.mode == AcquisitionMode::Stream && !has_sink(SinkType::File) {
        warnings.push("stream mode without a file sink - raw stream lines will not be persisted".to_string());
    }
    if !has_sink(SinkType::Document) && !has_sink(SinkType::Log) {
        warnings.push("no sink accepts documents - sub-state snapshots will be dropped".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Account: {}", summary.email);
            println!("  Mode: {}", summary.mode);
            println!("  Vehicle offset: {}", summary.vehicle_offset);
            println!("  Max requests/min: {}", summary.max_requests_per_minute);
            println!("  Sub-states: {}", summary.sub_states.join(", "));
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
