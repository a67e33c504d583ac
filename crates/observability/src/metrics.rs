//! Acquisition metric recorders
//!
//! Thin wrappers over the `metrics` facade so that metric names and labels
//! live in one place. Everything is prefixed `teslastream_`.

use metrics::{counter, gauge, histogram};

/// Outbound REST call issued
pub fn record_rest_request(call: &str) {
    counter!("teslastream_rest_requests_total", "call" => call.to_string()).increment(1);
}

/// REST call latency and outcome
pub fn record_rest_response(call: &str, latency_ms: f64, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "teslastream_rest_responses_total",
        "call" => call.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("teslastream_rest_latency_ms", "call" => call.to_string()).record(latency_ms);
}

/// Call denied by the rate limiter
pub fn record_throttled(component: &str) {
    counter!(
        "teslastream_throttled_total",
        "component" => component.to_string()
    )
    .increment(1);
}

/// Requests spent in the current rate window
pub fn record_rate_window_usage(used: u32, limit: u32) {
    gauge!("teslastream_rate_window_used").set(used as f64);
    gauge!("teslastream_rate_window_limit").set(limit as f64);
}

/// Wake-cycle exit (`ready`, `nap`, `wake`, `retry`, `throttled`, `fatal`)
pub fn record_wake_outcome(outcome: &str) {
    counter!(
        "teslastream_wake_cycles_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Sub-state snapshot forwarded to sinks
pub fn record_snapshot_emitted(kind: &str) {
    counter!("teslastream_snapshots_emitted_total", "kind" => kind.to_string()).increment(1);
}

/// Sub-state snapshot suppressed as a duplicate
pub fn record_snapshot_deduplicated(kind: &str) {
    counter!(
        "teslastream_snapshots_deduplicated_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Sub-state payload rejected by schema validation
pub fn record_snapshot_rejected(kind: &str) {
    counter!("teslastream_snapshots_rejected_total", "kind" => kind.to_string()).increment(1);
}

/// Stream update decoded
pub fn record_stream_frame(has_shift_state: bool) {
    counter!("teslastream_stream_frames_total").increment(1);
    if has_shift_state {
        counter!("teslastream_stream_frames_stored_total").increment(1);
    }
}

/// Stream channel re-opened after a close or error
pub fn record_stream_reconnect() {
    counter!("teslastream_stream_reconnects_total").increment(1);
}

/// Record handed to a sink worker
pub fn record_record_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "teslastream_records_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Sink queue depth
pub fn record_sink_queue_depth(sink_name: &str, depth: usize) {
    gauge!(
        "teslastream_sink_queue_depth",
        "sink" => sink_name.to_string()
    )
    .set(depth as f64);
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [120.0, 80.0, 100.0, 140.0, 60.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 100.0).abs() < 1e-10);
        assert!((stats.min() - 60.0).abs() < 1e-10);
        assert!((stats.max() - 140.0).abs() < 1e-10);
        assert!((stats.variance() - 1000.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display_empty() {
        let summary = StatsSummary::from(&RunningStats::default());
        assert_eq!(summary.to_string(), "N/A");
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        // The facade is a no-op until a recorder is installed
        record_rest_request("list_vehicles");
        record_rest_response("list_vehicles", 12.5, true);
        record_throttled("aux_sampler");
        record_rate_window_usage(3, 6);
        record_snapshot_emitted("charge_state");
        record_stream_frame(true);
    }
}
