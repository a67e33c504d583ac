//! TelemetryFrame - stream session output
//!
//! One decoded line of the streaming API.

use serde::{Deserialize, Serialize};

/// Geographic position (degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Normalized streaming record
///
/// Numeric fields that were empty on the wire are `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Vehicle timestamp (ms since epoch)
    #[serde(rename = "ts")]
    pub timestamp: u64,

    pub speed: f64,
    pub odometer: f64,

    /// State of charge (%)
    pub soc: f64,

    pub elevation: f64,
    pub heading: f64,
    pub est_heading: f64,
    pub power: f64,

    /// Gear selector ("P", "D", "R", "N"); `None` when the field was empty
    pub shift_state: Option<String>,

    pub range: f64,
    pub est_range: f64,
    pub position: Position,
}

impl TelemetryFrame {
    /// True when the vehicle reported a gear, i.e. the frame is worth storing
    pub fn has_shift_state(&self) -> bool {
        self.shift_state.as_deref().is_some_and(|s| !s.is_empty())
    }
}
