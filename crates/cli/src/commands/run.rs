//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{AcquisitionConfig, AcquisitionMode};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig, UpstreamMode};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut config, args);

    // Overrides can push values out of range
    config_loader::ConfigLoader::validate(&config)
        .context("Configuration invalid after command-line overrides")?;

    info!(
        email = %config.account.email,
        mode = ?config.acquisition.mode,
        vehicle_offset = config.acquisition.vehicle_offset,
        max_rpm = config.acquisition.max_requests_per_minute,
        sleep_checking = config.acquisition.sleep_checking,
        sinks = config.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        config,
        upstream: if args.mock {
            UpstreamMode::Mock
        } else {
            UpstreamMode::Live
        },
        buffer_size: args.buffer_size,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    info!("Starting acquisition...");

    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Acquisition pipeline failed to start")?;

    stats.print_summary();

    if stats.sink_failures() > 0 {
        warn!(failures = stats.sink_failures(), "Some sink writes failed during the run");
    }

    if let Some(fatal) = stats.fatal {
        return Err(CliError::from(fatal).into());
    }

    info!("teslastream finished");
    Ok(())
}

fn apply_overrides(config: &mut AcquisitionConfig, args: &RunArgs) {
    if let Some(offset) = args.vehicle {
        info!(offset, "Overriding vehicle offset from CLI");
        config.acquisition.vehicle_offset = offset;
    }
    if args.zzz {
        info!("Sleep checking enabled from CLI");
        config.acquisition.sleep_checking = true;
    }
    if let Some(max_rpm) = args.max_rpm {
        info!(max_rpm, "Overriding request budget from CLI");
        config.acquisition.max_requests_per_minute = max_rpm;
    }
    if let Some(ref token) = args.access_token {
        config.account.access_token = Some(token.clone());
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires rather than aborting the run.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Received shutdown signal, stopping acquisition...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &AcquisitionConfig) {
    let settings = &config.acquisition;

    println!("\n=== Configuration Summary ===\n");
    println!("Account:");
    println!("  Email: {}", config.account.email);
    println!(
        "  Access token: {}",
        if config.account.access_token.is_some() {
            "set"
        } else {
            "missing"
        }
    );

    println!("\nEndpoints:");
    println!("  REST: {}", config.endpoints.rest_base_url);
    println!("  Stream: {}", config.endpoints.stream_url);
    println!("  Publish topic: {}", config.endpoints.publish_topic);

    println!("\nAcquisition:");
    println!("  Mode: {:?}", settings.mode);
    println!("  Vehicle offset: {}", settings.vehicle_offset);
    println!("  Max requests/min: {}", settings.max_requests_per_minute);
    println!("  Poll interval: {}s", settings.poll_interval_secs);
    println!("  Sleep checking: {}", settings.sleep_checking);
    let kinds: Vec<&str> = settings.aux_kinds.iter().map(|k| k.endpoint()).collect();
    println!("  Sub-states: {}", kinds.join(", "));
    if settings.mode == AcquisitionMode::Stream {
        println!("  Stream columns: {}", settings.columns.join(","));
    }

    if !config.sinks.is_empty() {
        println!("\nSinks ({}):", config.sinks.len());
        for sink in &config.sinks {
            println!(
                "  - {} ({:?}, queue {})",
                sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
