//! VehicleApi trait - REST capability
//!
//! The acquisition loop only needs two named calls. Implementations own
//! authentication, base URLs and transport timeouts.

use std::future::Future;

use serde_json::Value;

use crate::{AuxKind, ContractError, VehicleId};

/// Upstream REST API
pub trait VehicleApi: Send + Sync + 'static {
    /// Authenticate and list the account's vehicles
    ///
    /// Returns the raw response body; the caller parses it so that malformed
    /// bodies can be told apart from transport failures.
    fn list_vehicles(&self) -> impl Future<Output = Result<String, ContractError>> + Send;

    /// Fetch one sub-state object for a vehicle
    fn fetch_sub_state(
        &self,
        vehicle_id: &VehicleId,
        kind: AuxKind,
    ) -> impl Future<Output = Result<Value, ContractError>> + Send;
}
