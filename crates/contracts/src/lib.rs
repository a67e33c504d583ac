//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall-clock milliseconds since the Unix epoch (`i64`) for every record timestamp
//! - Stream frames carry the vehicle's own timestamp (first CSV field)

mod api;
mod channel;
mod config;
mod error;
mod sink;
mod sub_state;
mod telemetry;
mod vehicle;

pub use api::VehicleApi;
pub use channel::*;
pub use config::*;
pub use error::*;
pub use sink::*;
pub use sub_state::*;
pub use telemetry::*;
pub use vehicle::*;
