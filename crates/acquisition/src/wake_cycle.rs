//! Wake cycle
//!
//! Logs in, picks the configured vehicle out of the list and decides between
//! napping, waking it with a probe, or handing a ready vehicle to the
//! samplers. The controller never performs I/O itself: the orchestrator
//! issues the calls and feeds the results back in.
//!
//! Every exit path releases `wake_guard` before the caller schedules the
//! follow-up entry. The only path that keeps it held is `Wake`, which is
//! released when the probe completes.

use std::time::Duration;

use contracts::{
    AcquisitionSettings, ChargeState, ContractError, VehicleHandle, VehicleId, VehicleRecord,
    VehicleState,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::AcquisitionError;
use crate::state::AcquisitionState;

/// Retry after an unusable vehicle list response
pub const PARSE_FAILURE_RETRY: Duration = Duration::from_secs(10);

/// Retry after a probe showed the vehicle is awake
pub const WAKE_CONFIRMED_RETRY: Duration = Duration::from_secs(1);

/// Retry after a failed probe
pub const WAKE_FAILED_RETRY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakePhase {
    #[default]
    LoggingIn,
    ListingVehicles,
    Ready,
    Asleep,
    WakingUp,
    TransientError,
}

/// Result of trying to enter the cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    /// Issue the login + vehicle list call
    Proceed,
    /// Another entry is in flight
    Busy,
    /// A nap check is pending and will re-enter
    Napping,
    /// Budget exhausted; enter again once the window rolls over
    Throttled { retry_after: Duration },
}

/// What to do after the vehicle list came back
#[derive(Debug)]
pub enum ListOutcome {
    /// Enter again after `delay`
    Retry { delay: Duration },
    /// Vehicle is asleep; `napping` is set, fire the nap check after `delay`
    Nap { delay: Duration, state: VehicleState },
    /// No stream token yet; issue the wake probe (budget already charged)
    Wake { vehicle_id: VehicleId },
    /// Probe denied by the budget
    Throttled { retry_after: Duration },
    /// Vehicle is ready
    Ready {
        handle: VehicleHandle,
        /// Raw list entry, forwarded once as the `vehicles` document
        entry: Value,
        /// First Ready of the process
        first: bool,
    },
    /// Unrecoverable configuration/contract violation
    Fatal(AcquisitionError),
}

#[derive(Debug)]
pub struct WakeCycleController {
    vehicle_offset: usize,
    sleep_checking: bool,
    nap_check: Duration,
    nap_duration: Duration,
    phase: WakePhase,
}

impl WakeCycleController {
    pub fn new(settings: &AcquisitionSettings) -> Self {
        Self {
            vehicle_offset: settings.vehicle_offset,
            sleep_checking: settings.sleep_checking,
            nap_check: settings.nap_check(),
            nap_duration: settings.nap_duration(),
            phase: WakePhase::LoggingIn,
        }
    }

    pub fn phase(&self) -> WakePhase {
        self.phase
    }

    pub fn begin(&mut self, st: &mut AcquisitionState, now_millis: i64) -> EntryDecision {
        if !st.wake_guard.enter() {
            return EntryDecision::Busy;
        }

        if st.flags.napping {
            info!("Vehicle is napping, skipping wake cycle");
            st.wake_guard.exit();
            return EntryDecision::Napping;
        }

        self.phase = WakePhase::LoggingIn;
        if !st.rate.try_acquire(1, now_millis) {
            let retry_after = st.rate.retry_after(now_millis);
            warn!(
                used = st.rate.request_count(),
                limit = st.rate.limit_per_minute(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Throttling wake cycle due to too many REST requests"
            );
            st.wake_guard.exit();
            return EntryDecision::Throttled { retry_after };
        }

        self.phase = WakePhase::ListingVehicles;
        debug!(offset = self.vehicle_offset, "Logging in and listing vehicles");
        EntryDecision::Proceed
    }

    pub fn on_vehicles_listed(
        &mut self,
        st: &mut AcquisitionState,
        result: Result<String, ContractError>,
        now_millis: i64,
    ) -> ListOutcome {
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Vehicle list request failed, trying again");
                return self.transient(st);
            }
        };

        let parsed: Value = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Unable to parse vehicle list response as JSON, login failed. Trying again");
                return self.transient(st);
            }
        };

        let Some(vehicles) = parsed.get("response").and_then(Value::as_array) else {
            let shown = parsed.get("response").unwrap_or(&parsed);
            return self.fatal(
                st,
                AcquisitionError::VehicleListNotArray {
                    body: truncate(&shown.to_string()),
                },
            );
        };

        let Some(entry) = vehicles.get(self.vehicle_offset) else {
            return self.fatal(
                st,
                AcquisitionError::VehicleOffsetOutOfRange {
                    offset: self.vehicle_offset,
                    count: vehicles.len(),
                },
            );
        };

        let record = match VehicleRecord::deserialize(entry) {
            Ok(record) => record,
            Err(e) => {
                return self.fatal(
                    st,
                    AcquisitionError::UndefinedVehicle {
                        offset: self.vehicle_offset,
                        message: format!("{e}: {}", truncate(&entry.to_string())),
                    },
                )
            }
        };

        if record.state.is_none() {
            debug!(entry = %entry, "Vehicle entry carries no state");
        }
        let state = record.vehicle_state();

        if self.sleep_checking && !state.is_online() {
            info!(
                vehicle_id = %record.id,
                state = record.state.as_deref().unwrap_or("unknown"),
                check_in_secs = self.nap_check.as_secs(),
                "Vehicle is not online, napping"
            );
            st.flags.napping = true;
            self.phase = WakePhase::Asleep;
            st.wake_guard.exit();
            return ListOutcome::Nap {
                delay: self.nap_check,
                state,
            };
        }

        let Some(token) = record.stream_token() else {
            self.phase = WakePhase::WakingUp;
            if !st.rate.try_acquire(1, now_millis) {
                let retry_after = st.rate.retry_after(now_millis);
                warn!(
                    vehicle_id = %record.id,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Throttling wake probe due to too many REST requests"
                );
                st.wake_guard.exit();
                return ListOutcome::Throttled { retry_after };
            }
            info!(
                vehicle_id = %record.id,
                state = record.state.as_deref().unwrap_or("unknown"),
                "No stream token, probing charge state to wake the vehicle"
            );
            return ListOutcome::Wake {
                vehicle_id: record.id,
            };
        };

        let handle = VehicleHandle {
            id: record.id.clone(),
            stream_token: token.to_string(),
            last_known_state: state,
        };

        st.flags.sleeping = false;
        if !st.nap.asleep_for.is_zero() {
            info!(
                asleep_secs = st.nap.asleep_for.as_secs(),
                "Vehicle is back online"
            );
        }
        st.nap = Default::default();

        let first = !st.first_ready_done;
        st.first_ready_done = true;
        st.handle = Some(handle.clone());
        self.phase = WakePhase::Ready;
        st.wake_guard.exit();

        info!(
            vehicle_id = %handle.id,
            display_name = record.display_name.as_deref().unwrap_or(""),
            state = ?state,
            first,
            "Vehicle ready"
        );

        ListOutcome::Ready {
            handle,
            entry: entry.clone(),
            first,
        }
    }

    /// Wake probe finished; returns the delay before the next entry
    pub fn on_probe_completed(
        &mut self,
        st: &mut AcquisitionState,
        result: Result<Value, ContractError>,
    ) -> Duration {
        st.wake_guard.exit();

        match result.and_then(|payload| ChargeState::confirm_awake(&payload)) {
            Ok(charging_state) => {
                info!(
                    charging_state = %charging_state,
                    "Charge state probe succeeded, re-initialising"
                );
                WAKE_CONFIRMED_RETRY
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_secs = WAKE_FAILED_RETRY.as_secs(),
                    "Waking up with charge state probe failed"
                );
                self.phase = WakePhase::TransientError;
                WAKE_FAILED_RETRY
            }
        }
    }

    /// Nap check fired: switch from napping to sleeping
    ///
    /// Returns true the first time the current sleep episode exceeds the
    /// configured nap duration.
    pub fn on_nap_elapsed(&mut self, st: &mut AcquisitionState) -> bool {
        st.flags.napping = false;
        st.flags.sleeping = true;
        st.nap.asleep_for += self.nap_check;

        if !st.nap.long_nap_reported && st.nap.asleep_for >= self.nap_duration {
            st.nap.long_nap_reported = true;
            info!(
                asleep_mins = st.nap.asleep_for.as_secs() / 60,
                nap_duration_mins = self.nap_duration.as_secs() / 60,
                "Vehicle has been asleep longer than the nap duration"
            );
            return true;
        }
        false
    }

    fn transient(&mut self, st: &mut AcquisitionState) -> ListOutcome {
        self.phase = WakePhase::TransientError;
        st.wake_guard.exit();
        ListOutcome::Retry {
            delay: PARSE_FAILURE_RETRY,
        }
    }

    fn fatal(&mut self, st: &mut AcquisitionState, error: AcquisitionError) -> ListOutcome {
        self.phase = WakePhase::TransientError;
        st.wake_guard.exit();
        ListOutcome::Fatal(error)
    }
}

fn truncate(text: &str) -> String {
    const MAX_CHARS: usize = 256;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(MAX_CHARS).collect();
        short.push_str("...");
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const T0: i64 = 1_700_000_000_000;

    fn settings(sleep_checking: bool) -> AcquisitionSettings {
        AcquisitionSettings {
            sleep_checking,
            nap_check_secs: 60,
            nap_duration_secs: 120,
            ..Default::default()
        }
    }

    fn list_body(entry: Value) -> String {
        json!({ "response": [entry], "count": 1 }).to_string()
    }

    fn entered(controller: &mut WakeCycleController, st: &mut AcquisitionState) {
        assert_eq!(controller.begin(st, T0), EntryDecision::Proceed);
    }

    #[test]
    fn test_ready_with_token() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(6);
        st.flags.sleeping = true;
        entered(&mut controller, &mut st);

        let body = r#"{"response":[{"id":12345678901234567890,"state":"online","tokens":["tok1","tok2"]}]}"#;
        let outcome = controller.on_vehicles_listed(&mut st, Ok(body.to_string()), T0);

        let ListOutcome::Ready { handle, entry, first } = outcome else {
            panic!("expected ready");
        };
        assert_eq!(handle.id.as_str(), "12345678901234567890");
        assert_eq!(handle.stream_token, "tok1");
        assert_eq!(handle.last_known_state, VehicleState::Online);
        assert_eq!(entry["id"].as_u64(), Some(12345678901234567890));
        assert!(first);
        assert!(!st.flags.sleeping);
        assert!(!st.wake_guard.is_held());
        assert_eq!(controller.phase(), WakePhase::Ready);

        entered(&mut controller, &mut st);
        let again = controller.on_vehicles_listed(&mut st, Ok(body.to_string()), T0);
        assert!(matches!(again, ListOutcome::Ready { first: false, .. }));
    }

    #[test]
    fn test_reentry_is_noop() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(6);
        entered(&mut controller, &mut st);

        assert_eq!(controller.begin(&mut st, T0), EntryDecision::Busy);
        assert_eq!(st.wake_guard.depth(), 1);
        assert_eq!(st.rate.request_count(), 1);
    }

    #[test]
    fn test_throttled_entry_releases_guard() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(1);
        assert!(st.rate.try_acquire(1, T0));

        let decision = controller.begin(&mut st, T0 + 20_000);
        assert_eq!(
            decision,
            EntryDecision::Throttled {
                retry_after: Duration::from_secs(40)
            }
        );
        assert!(!st.wake_guard.is_held());
    }

    #[test]
    fn test_unparseable_body_retries_in_10s() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(6);
        entered(&mut controller, &mut st);

        let outcome = controller.on_vehicles_listed(&mut st, Ok("<html>502</html>".into()), T0);
        assert!(matches!(outcome, ListOutcome::Retry { delay } if delay == PARSE_FAILURE_RETRY));
        assert!(!st.wake_guard.is_held());
        assert_eq!(controller.phase(), WakePhase::TransientError);

        entered(&mut controller, &mut st);
        let outcome = controller.on_vehicles_listed(
            &mut st,
            Err(ContractError::http("list_vehicles", "connection reset")),
            T0,
        );
        assert!(matches!(outcome, ListOutcome::Retry { .. }));
    }

    #[test]
    fn test_non_array_response_is_fatal() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(6);
        entered(&mut controller, &mut st);

        let outcome =
            controller.on_vehicles_listed(&mut st, Ok(r#"{"response":"unauthorized"}"#.into()), T0);
        let ListOutcome::Fatal(err) = outcome else {
            panic!("expected fatal");
        };
        assert!(matches!(err, AcquisitionError::VehicleListNotArray { .. }));
        assert!(err.is_fatal());
        assert!(!st.wake_guard.is_held());
    }

    #[test]
    fn test_offset_out_of_range_is_fatal() {
        let mut controller = WakeCycleController::new(&AcquisitionSettings {
            vehicle_offset: 1,
            ..settings(false)
        });
        let mut st = AcquisitionState::new(6);
        entered(&mut controller, &mut st);

        let outcome = controller.on_vehicles_listed(
            &mut st,
            Ok(list_body(json!({"id": 1, "state": "online"}))),
            T0,
        );
        assert!(matches!(
            outcome,
            ListOutcome::Fatal(AcquisitionError::VehicleOffsetOutOfRange { offset: 1, count: 1 })
        ));
    }

    #[test]
    fn test_undefined_entry_is_fatal() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(6);
        entered(&mut controller, &mut st);

        let outcome = controller.on_vehicles_listed(&mut st, Ok(list_body(Value::Null)), T0);
        assert!(matches!(
            outcome,
            ListOutcome::Fatal(AcquisitionError::UndefinedVehicle { .. })
        ));
    }

    #[test]
    fn test_asleep_with_sleep_checking_naps() {
        let mut controller = WakeCycleController::new(&settings(true));
        let mut st = AcquisitionState::new(6);
        entered(&mut controller, &mut st);

        let outcome = controller.on_vehicles_listed(
            &mut st,
            Ok(list_body(json!({"id": 7, "state": "asleep", "tokens": ["t"]}))),
            T0,
        );
        assert!(matches!(
            outcome,
            ListOutcome::Nap { delay, state: VehicleState::Asleep } if delay == Duration::from_secs(60)
        ));
        assert!(st.flags.napping);
        assert!(!st.wake_guard.is_held());

        // entries are refused while napping
        assert_eq!(controller.begin(&mut st, T0), EntryDecision::Napping);
        assert!(!st.wake_guard.is_held());

        assert!(!controller.on_nap_elapsed(&mut st));
        assert!(!st.flags.napping);
        assert!(st.flags.sleeping);
    }

    #[test]
    fn test_asleep_without_sleep_checking_probes() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(6);
        entered(&mut controller, &mut st);

        let outcome = controller.on_vehicles_listed(
            &mut st,
            Ok(list_body(json!({"id": 7, "state": "asleep", "tokens": [null]}))),
            T0,
        );
        let ListOutcome::Wake { vehicle_id } = outcome else {
            panic!("expected wake");
        };
        assert_eq!(vehicle_id, VehicleId::new("7"));
        assert!(st.wake_guard.is_held());
        assert_eq!(st.rate.request_count(), 2);
        assert_eq!(controller.phase(), WakePhase::WakingUp);
    }

    #[test]
    fn test_probe_outcomes() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(6);

        assert!(st.wake_guard.enter());
        let delay =
            controller.on_probe_completed(&mut st, Ok(json!({"charging_state": "Disconnected"})));
        assert_eq!(delay, WAKE_CONFIRMED_RETRY);
        assert!(!st.wake_guard.is_held());

        assert!(st.wake_guard.enter());
        let delay = controller.on_probe_completed(&mut st, Ok(json!({"error": "vehicle unavailable"})));
        assert_eq!(delay, WAKE_FAILED_RETRY);

        assert!(st.wake_guard.enter());
        let delay = controller.on_probe_completed(
            &mut st,
            Ok(json!({"charging_state": null, "charge_limit_soc": 90})),
        );
        assert_eq!(delay, WAKE_FAILED_RETRY);
        assert!(!st.wake_guard.is_held());

        assert!(st.wake_guard.enter());
        let delay = controller
            .on_probe_completed(&mut st, Err(ContractError::http("charge_state", "timeout")));
        assert_eq!(delay, WAKE_FAILED_RETRY);
        assert!(!st.wake_guard.is_held());
    }

    #[test]
    fn test_throttled_probe_releases_guard() {
        let mut controller = WakeCycleController::new(&settings(false));
        let mut st = AcquisitionState::new(1);
        entered(&mut controller, &mut st);

        let outcome = controller.on_vehicles_listed(
            &mut st,
            Ok(list_body(json!({"id": 7, "state": "online"}))),
            T0,
        );
        assert!(matches!(outcome, ListOutcome::Throttled { .. }));
        assert!(!st.wake_guard.is_held());
    }

    #[test]
    fn test_long_nap_reported_once() {
        let mut controller = WakeCycleController::new(&settings(true));
        let mut st = AcquisitionState::new(6);

        assert!(!controller.on_nap_elapsed(&mut st));
        assert!(controller.on_nap_elapsed(&mut st));
        assert!(!controller.on_nap_elapsed(&mut st));
        assert_eq!(st.nap.asleep_for, Duration::from_secs(180));

        entered(&mut controller, &mut st);
        controller.on_vehicles_listed(
            &mut st,
            Ok(list_body(json!({"id": 7, "state": "online", "tokens": ["t"]}))),
            T0,
        );
        assert!(st.nap.asleep_for.is_zero());
        assert!(!st.nap.long_nap_reported);
    }
}
