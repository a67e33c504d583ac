//! Vehicle identity and wake-cycle output
//!
//! `VehicleRecord` is one entry of the upstream vehicle list, `VehicleHandle`
//! is what a successful wake cycle hands to the samplers.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Upstream vehicle identifier
///
/// Kept as a decimal string: the ids exceed the exact integer range of an
/// IEEE double, so they must never round-trip through `f64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for VehicleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Unsigned(u64),
            Signed(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Unsigned(n) => Self(n.to_string()),
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}

/// Last known vehicle power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    #[default]
    Unknown,
    Asleep,
    Waking,
    Online,
}

impl VehicleState {
    /// Map the upstream `state` string
    pub fn from_upstream(state: Option<&str>) -> Self {
        match state {
            Some("online") => Self::Online,
            Some("asleep") | Some("offline") => Self::Asleep,
            Some("waking") => Self::Waking,
            _ => Self::Unknown,
        }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// One entry of the vehicle list response
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleRecord {
    pub id: VehicleId,

    #[serde(default)]
    pub vehicle_id: Option<VehicleId>,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Raw upstream state ("online", "asleep", ...)
    #[serde(default)]
    pub state: Option<String>,

    /// Streaming tokens; the first one is used
    #[serde(default)]
    pub tokens: Option<Vec<Option<String>>>,
}

impl VehicleRecord {
    pub fn vehicle_state(&self) -> VehicleState {
        VehicleState::from_upstream(self.state.as_deref())
    }

    /// First streaming token, if one is present and non-empty
    pub fn stream_token(&self) -> Option<&str> {
        self.tokens
            .as_ref()
            .and_then(|tokens| tokens.first())
            .and_then(|token| token.as_deref())
            .filter(|token| !token.is_empty())
    }
}

/// Ready vehicle produced by a successful wake cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleHandle {
    pub id: VehicleId,
    pub stream_token: String,
    pub last_known_state: VehicleState,
}
