//! In-process acquisition counters
//!
//! Shared with the binary so a summary can be printed at shutdown even
//! though the loop itself never returns normally.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use observability::{RunningStats, StatsSummary};

#[derive(Debug, Default)]
pub struct AcquisitionCounters {
    pub rest_requests: AtomicU64,
    pub rest_failures: AtomicU64,
    pub throttled: AtomicU64,
    pub wake_cycles_skipped: AtomicU64,
    pub ready_transitions: AtomicU64,
    pub naps: AtomicU64,
    pub long_naps: AtomicU64,
    pub wake_probes: AtomicU64,
    pub samples_suppressed: AtomicU64,
    pub snapshots_emitted: AtomicU64,
    pub snapshots_deduplicated: AtomicU64,
    pub snapshots_rejected: AtomicU64,
    pub stream_connects: AtomicU64,
    pub stream_reconnects: AtomicU64,
    pub stream_errors: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_stored: AtomicU64,
    pub records_emitted: AtomicU64,
    pub records_dropped: AtomicU64,
    rest_latency_ms: Mutex<RunningStats>,
}

impl AcquisitionCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_rest_latency(&self, latency_ms: f64) {
        if let Ok(mut stats) = self.rest_latency_ms.lock() {
            stats.push(latency_ms);
        }
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            rest_requests: load(&self.rest_requests),
            rest_failures: load(&self.rest_failures),
            throttled: load(&self.throttled),
            wake_cycles_skipped: load(&self.wake_cycles_skipped),
            ready_transitions: load(&self.ready_transitions),
            naps: load(&self.naps),
            long_naps: load(&self.long_naps),
            wake_probes: load(&self.wake_probes),
            samples_suppressed: load(&self.samples_suppressed),
            snapshots_emitted: load(&self.snapshots_emitted),
            snapshots_deduplicated: load(&self.snapshots_deduplicated),
            snapshots_rejected: load(&self.snapshots_rejected),
            stream_connects: load(&self.stream_connects),
            stream_reconnects: load(&self.stream_reconnects),
            stream_errors: load(&self.stream_errors),
            frames_decoded: load(&self.frames_decoded),
            frames_stored: load(&self.frames_stored),
            records_emitted: load(&self.records_emitted),
            records_dropped: load(&self.records_dropped),
            rest_latency_ms: self
                .rest_latency_ms
                .lock()
                .map(|stats| StatsSummary::from(&*stats))
                .unwrap_or_default(),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default)]
pub struct CountersSnapshot {
    pub rest_requests: u64,
    pub rest_failures: u64,
    pub throttled: u64,
    pub wake_cycles_skipped: u64,
    pub ready_transitions: u64,
    pub naps: u64,
    pub long_naps: u64,
    pub wake_probes: u64,
    pub samples_suppressed: u64,
    pub snapshots_emitted: u64,
    pub snapshots_deduplicated: u64,
    pub snapshots_rejected: u64,
    pub stream_connects: u64,
    pub stream_reconnects: u64,
    pub stream_errors: u64,
    pub frames_decoded: u64,
    pub frames_stored: u64,
    pub records_emitted: u64,
    pub records_dropped: u64,
    pub rest_latency_ms: StatsSummary,
}

impl fmt::Display for CountersSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Acquisition Summary ===")?;
        writeln!(
            f,
            "REST requests: {} ({} failed, {} throttled)",
            self.rest_requests, self.rest_failures, self.throttled
        )?;
        writeln!(f, "REST latency (ms): {}", self.rest_latency_ms)?;
        writeln!(
            f,
            "Wake cycle: {} ready, {} naps ({} long), {} wake probes, {} overlapping entries skipped",
            self.ready_transitions, self.naps, self.long_naps, self.wake_probes, self.wake_cycles_skipped
        )?;
        writeln!(
            f,
            "Aux snapshots: {} emitted, {} deduplicated, {} rejected, {} samples suppressed",
            self.snapshots_emitted,
            self.snapshots_deduplicated,
            self.snapshots_rejected,
            self.samples_suppressed
        )?;
        writeln!(
            f,
            "Stream: {} connects, {} reconnects, {} errors, {} frames ({} stored)",
            self.stream_connects,
            self.stream_reconnects,
            self.stream_errors,
            self.frames_decoded,
            self.frames_stored
        )?;
        write!(
            f,
            "Records: {} emitted, {} dropped",
            self.records_emitted, self.records_dropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = AcquisitionCounters::default();
        AcquisitionCounters::incr(&counters.rest_requests);
        AcquisitionCounters::add(&counters.frames_decoded, 3);
        counters.record_rest_latency(120.0);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.rest_requests, 1);
        assert_eq!(snapshot.frames_decoded, 3);
        assert_eq!(snapshot.rest_latency_ms.count, 1);

        let text = snapshot.to_string();
        assert!(text.contains("REST requests: 1"));
        assert!(text.contains("3 frames"));
    }
}
