//! Shared acquisition state
//!
//! Owned by the orchestrator task and lent by `&mut` to one component per
//! event, so every check-then-update happens within a single turn.

use std::collections::HashMap;
use std::time::Duration;

use contracts::{AuxKind, VehicleHandle};
use serde_json::Value;
use tracing::debug;

use crate::rate_limiter::RateLimiter;

/// Sleep gating flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Waiting out a nap check; wake-cycle entries are refused
    pub napping: bool,
    /// Last nap check fired and the vehicle has not reported Ready since
    pub sleeping: bool,
}

impl SessionFlags {
    /// REST polling must be skipped
    pub fn suppressed(&self) -> bool {
        self.napping || self.sleeping
    }
}

/// Single-flight counter for a re-entrant entry point
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    name: &'static str,
    depth: u32,
}

impl ReentrancyGuard {
    pub fn new(name: &'static str) -> Self {
        Self { name, depth: 0 }
    }

    /// Enter; false (and the count already undone) if another entry is live
    pub fn enter(&mut self) -> bool {
        self.depth += 1;
        if self.depth > 1 {
            debug!(guard = self.name, "Entry already in flight, skipping");
            self.depth -= 1;
            return false;
        }
        true
    }

    /// Leave; must run on every exit path, before any retry is scheduled
    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn is_held(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// Accumulated sleep time for the current sleep episode
#[derive(Debug, Clone, Copy, Default)]
pub struct NapAccounting {
    pub asleep_for: Duration,
    pub long_nap_reported: bool,
}

/// Process-wide acquisition state
#[derive(Debug)]
pub struct AcquisitionState {
    pub rate: RateLimiter,
    pub flags: SessionFlags,
    pub wake_guard: ReentrancyGuard,
    pub stream_guard: ReentrancyGuard,
    /// Last forwarded payload per sub-state kind
    pub last_snapshots: HashMap<AuxKind, Value>,
    /// Vehicle from the latest successful wake cycle
    pub handle: Option<VehicleHandle>,
    pub first_ready_done: bool,
    pub nap: NapAccounting,
}

impl AcquisitionState {
    pub fn new(max_requests_per_minute: u32) -> Self {
        Self {
            rate: RateLimiter::new(max_requests_per_minute),
            flags: SessionFlags::default(),
            wake_guard: ReentrancyGuard::new("wake_cycle"),
            stream_guard: ReentrancyGuard::new("stream_session"),
            last_snapshots: HashMap::new(),
            handle: None,
            first_ready_done: false,
            nap: NapAccounting::default(),
        }
    }
}
