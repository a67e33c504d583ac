//! Auxiliary sub-state sampling
//!
//! Each tick picks the sub-states the budget allows; each fetched payload is
//! validated and deduplicated against the last forwarded payload of its kind.

use contracts::{AuxKind, AuxSnapshot, ContractError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::state::AcquisitionState;

/// Result of one fetched sub-state
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Changed payload, forward it
    Emitted(AuxSnapshot),
    /// Value-equal to the last forwarded payload
    Duplicate,
    /// Failed schema validation
    Rejected,
    /// Transport or API error
    Failed,
}

#[derive(Debug, Clone)]
pub struct AuxSampler {
    kinds: Vec<AuxKind>,
}

impl AuxSampler {
    pub fn new(kinds: Vec<AuxKind>) -> Self {
        Self { kinds }
    }

    pub fn kinds(&self) -> &[AuxKind] {
        &self.kinds
    }

    /// Kinds to fetch on this tick, each already charged to the budget
    ///
    /// Empty while the vehicle is napping or sleeping.
    pub fn tick(&self, st: &mut AcquisitionState, now_millis: i64) -> Vec<AuxKind> {
        if st.handle.is_none() {
            debug!("No ready vehicle yet, skipping auxiliary sample");
            return Vec::new();
        }

        if st.flags.suppressed() {
            info!(
                napping = st.flags.napping,
                sleeping = st.flags.sleeping,
                "Vehicle is napping or sleeping, skipping auxiliary sample"
            );
            return Vec::new();
        }

        self.kinds
            .iter()
            .copied()
            .filter(|kind| admit(st, *kind, now_millis))
            .collect()
    }

    /// Validate and deduplicate one fetched payload
    pub fn on_fetched(
        &self,
        st: &mut AcquisitionState,
        kind: AuxKind,
        result: Result<Value, ContractError>,
        now_millis: i64,
    ) -> FetchOutcome {
        accept(st, kind, result, now_millis)
    }
}

/// Charge one request for `kind`
pub fn admit(st: &mut AcquisitionState, kind: AuxKind, now_millis: i64) -> bool {
    if st.rate.try_acquire(1, now_millis) {
        true
    } else {
        info!(
            kind = %kind,
            used = st.rate.request_count(),
            limit = st.rate.limit_per_minute(),
            "Throttling auxiliary REST request due to too much REST activity"
        );
        false
    }
}

/// Shared by periodic samples and the one-time vehicle/gui publication
pub fn accept(
    st: &mut AcquisitionState,
    kind: AuxKind,
    result: Result<Value, ContractError>,
    now_millis: i64,
) -> FetchOutcome {
    let payload = match result {
        Ok(payload) => payload,
        Err(e) => {
            warn!(kind = %kind, error = %e, "Sub-state fetch failed");
            return FetchOutcome::Failed;
        }
    };

    if let Err(e) = kind.validate(&payload) {
        warn!(kind = %kind, error = %e, "Sub-state payload rejected");
        return FetchOutcome::Rejected;
    }

    if st.last_snapshots.get(&kind) == Some(&payload) {
        debug!(kind = %kind, "Sub-state unchanged, not forwarding");
        return FetchOutcome::Duplicate;
    }

    st.last_snapshots.insert(kind, payload.clone());
    FetchOutcome::Emitted(AuxSnapshot {
        kind,
        timestamp: now_millis,
        payload,
    })
}
