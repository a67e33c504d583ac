//! # Vehicle API
//!
//! Upstream adapters for the acquisition loop.
//!
//! Responsibilities:
//! - REST client for the vehicle list and sub-state calls (`VehicleApi`)
//! - Websocket transport for the streaming endpoint (`StreamTransport`)
//! - Scriptable mock API and transport for tests and `--mock` runs
//!
//! ## Feature Flags
//!
//! - `live`: Enable the real REST client and websocket transport

pub mod error;
pub mod mock;

#[cfg(feature = "live")]
pub mod owner_api;
#[cfg(feature = "live")]
pub mod websocket;

pub use error::VehicleApiError;
pub use mock::{
    sample_sub_state, vehicle_entry, vehicle_list_body, ApiCall, MockTransport, MockVehicleApi,
};

#[cfg(feature = "live")]
pub use owner_api::OwnerApiClient;
#[cfg(feature = "live")]
pub use websocket::WebSocketTransport;
