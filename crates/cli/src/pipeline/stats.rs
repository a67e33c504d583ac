//! Run summary printed at shutdown.

use std::time::Duration;

use acquisition::{AcquisitionError, CountersSnapshot};
use dispatcher::MetricsSnapshot;

/// Statistics from one acquisition run
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Wall time from start to shutdown
    pub duration: Duration,

    /// Acquisition counters at shutdown
    pub counters: CountersSnapshot,

    /// Final per-sink metrics, in config order
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Unrecoverable error that stopped acquisition, if any
    pub fatal: Option<AcquisitionError>,
}

impl PipelineStats {
    /// Records handed to the dispatcher per minute
    pub fn records_per_minute(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.counters.records_emitted as f64 / minutes
        } else {
            0.0
        }
    }

    /// Sink writes that failed, summed over all sinks
    pub fn sink_failures(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.failure_count).sum()
    }

    pub fn print_summary(&self) {
        println!();
        println!("{}", self.counters);
        println!(
            "Duration: {:.1}s ({:.2} records/min)",
            self.duration.as_secs_f64(),
            self.records_per_minute()
        );

        if !self.sinks.is_empty() {
            println!("\n=== Sinks ===");
            for (name, metrics) in &self.sinks {
                let last = metrics
                    .last_write
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{name}: {} written, {} failed, {} dropped (last write: {last})",
                    metrics.write_count, metrics.failure_count, metrics.dropped_count
                );
            }
        }

        if let Some(ref fatal) = self.fatal {
            println!("\nStopped on error: {fatal}");
        }

        println!();
    }
}
