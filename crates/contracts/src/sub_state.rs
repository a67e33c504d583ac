//! Auxiliary vehicle sub-states
//!
//! Typed views over the REST sub-state payloads. The typed structs only carry
//! the fields the acquisition loop relies on; the full payload is forwarded
//! to sinks untouched as a `serde_json::Value`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ContractError;

/// Sub-state kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxKind {
    Charge,
    Climate,
    Drive,
    Vehicle,
    Gui,
}

impl AuxKind {
    pub const ALL: [AuxKind; 5] = [
        AuxKind::Charge,
        AuxKind::Climate,
        AuxKind::Drive,
        AuxKind::Vehicle,
        AuxKind::Gui,
    ];

    /// REST `data_request` endpoint name
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Charge => "charge_state",
            Self::Climate => "climate_state",
            Self::Drive => "drive_state",
            Self::Vehicle => "vehicle_state",
            Self::Gui => "gui_settings",
        }
    }

    /// Key under which the payload is stored in a document
    pub fn document_key(self) -> &'static str {
        match self {
            Self::Charge => "chargeState",
            Self::Climate => "climateState",
            Self::Drive => "driveState",
            Self::Vehicle => "vehicleState",
            Self::Gui => "guiSettings",
        }
    }

    /// Field whose presence marks a payload as storable; its value may be null
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Charge => "charge_limit_soc",
            Self::Climate => "inside_temp",
            Self::Drive => "native_type",
            Self::Vehicle => "car_version",
            Self::Gui => "gui_distance_units",
        }
    }

    /// Strict schema check; fails closed on missing key fields or non-object payloads
    pub fn validate(self, payload: &Value) -> Result<(), ContractError> {
        match self {
            Self::Charge => decode::<ChargeState>(self, payload).map(drop),
            Self::Climate => decode::<ClimateState>(self, payload).map(drop),
            Self::Drive => decode::<DriveState>(self, payload).map(drop),
            Self::Vehicle => decode::<VehicleStateInfo>(self, payload).map(drop),
            Self::Gui => decode::<GuiSettings>(self, payload).map(drop),
        }
    }
}

impl std::fmt::Display for AuxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.endpoint())
    }
}

fn decode<T: DeserializeOwned>(kind: AuxKind, payload: &Value) -> Result<T, ContractError> {
    let Some(fields) = payload.as_object() else {
        return Err(ContractError::decode(kind.endpoint(), "payload is not an object"));
    };
    if !fields.contains_key(kind.key_field()) {
        return Err(ContractError::decode(
            kind.endpoint(),
            format!("missing field `{}`", kind.key_field()),
        ));
    }
    deserialize(kind, payload)
}

fn deserialize<T: DeserializeOwned>(kind: AuxKind, payload: &Value) -> Result<T, ContractError> {
    T::deserialize(payload).map_err(|e| ContractError::decode(kind.endpoint(), e.to_string()))
}

/// `charge_state` payload
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeState {
    #[serde(default)]
    pub charge_limit_soc: Option<f64>,
    #[serde(default)]
    pub charging_state: Option<String>,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub battery_range: Option<f64>,
}

impl ChargeState {
    /// Charging state reported right after a wake-up
    ///
    /// Unlike the periodic sample, a null or missing `charging_state` means
    /// the vehicle is not answering yet.
    pub fn confirm_awake(payload: &Value) -> Result<String, ContractError> {
        if !payload.is_object() {
            return Err(ContractError::decode(
                AuxKind::Charge.endpoint(),
                "payload is not an object",
            ));
        }
        let charge: Self = deserialize(AuxKind::Charge, payload)?;
        charge.charging_state.ok_or_else(|| {
            ContractError::decode(AuxKind::Charge.endpoint(), "charging_state is null or missing")
        })
    }
}

/// `climate_state` payload
#[derive(Debug, Clone, Deserialize)]
pub struct ClimateState {
    #[serde(default)]
    pub inside_temp: Option<f64>,
    #[serde(default)]
    pub outside_temp: Option<f64>,
    #[serde(default)]
    pub is_climate_on: Option<bool>,
}

/// `drive_state` payload
#[derive(Debug, Clone, Deserialize)]
pub struct DriveState {
    #[serde(default)]
    pub native_type: Option<String>,
    #[serde(default)]
    pub shift_state: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// `vehicle_state` payload
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleStateInfo {
    #[serde(default)]
    pub car_version: Option<String>,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub odometer: Option<f64>,
}

/// `gui_settings` payload
#[derive(Debug, Clone, Deserialize)]
pub struct GuiSettings {
    #[serde(default)]
    pub gui_distance_units: Option<String>,
    #[serde(default)]
    pub gui_temperature_units: Option<String>,
}

/// Sub-state observation ready to be forwarded
#[derive(Debug, Clone, PartialEq)]
pub struct AuxSnapshot {
    pub kind: AuxKind,
    /// Acquisition time (ms since epoch)
    pub timestamp: i64,
    pub payload: Value,
}

impl AuxSnapshot {
    /// `{ts, <documentKey>: payload}`
    pub fn to_document(&self) -> Value {
        let mut doc = json!({ "ts": self.timestamp });
        doc[self.kind.document_key()] = self.payload.clone();
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_key_field() {
        assert!(AuxKind::Charge
            .validate(&json!({"charge_limit_soc": 90, "battery_level": 80}))
            .is_ok());
        assert!(AuxKind::Charge
            .validate(&json!({"charging_state": "Stopped", "battery_level": 80}))
            .is_err());
        assert!(AuxKind::Climate.validate(&json!({"inside_temp": 21.5})).is_ok());
        assert!(AuxKind::Gui.validate(&json!({})).is_err());
    }

    #[test]
    fn test_validate_accepts_null_key_field() {
        AuxKind::Climate
            .validate(&json!({"inside_temp": null, "outside_temp": 11.0}))
            .unwrap();
        AuxKind::Vehicle
            .validate(&json!({"car_version": null, "locked": true}))
            .unwrap();
        AuxKind::Charge.validate(&json!({"charge_limit_soc": null})).unwrap();

        let err = AuxKind::Climate.validate(&json!({"outside_temp": 11.0})).unwrap_err();
        assert!(matches!(err, ContractError::Decode { message, .. } if message.contains("inside_temp")));
        assert!(AuxKind::Drive.validate(&json!({"native_type": 4})).is_err());
    }

    #[test]
    fn test_confirm_awake_requires_charging_state() {
        assert_eq!(
            ChargeState::confirm_awake(&json!({"charging_state": "Disconnected"})).unwrap(),
            "Disconnected"
        );
        assert!(ChargeState::confirm_awake(&json!({"charging_state": null})).is_err());
        assert!(ChargeState::confirm_awake(&json!({"charge_limit_soc": 90})).is_err());
        assert!(ChargeState::confirm_awake(&json!(null)).is_err());
    }

    #[test]
    fn test_validate_rejects_non_objects() {
        let err = AuxKind::Drive.validate(&json!("asleep")).unwrap_err();
        assert!(matches!(err, ContractError::Decode { .. }));
        assert!(AuxKind::Vehicle.validate(&Value::Null).is_err());
    }

    #[test]
    fn test_snapshot_document_shape() {
        let snapshot = AuxSnapshot {
            kind: AuxKind::Climate,
            timestamp: 1_700_000_000_000,
            payload: json!({"inside_temp": 20.0}),
        };
        let doc = snapshot.to_document();
        assert_eq!(doc["ts"], json!(1_700_000_000_000i64));
        assert_eq!(doc["climateState"]["inside_temp"], json!(20.0));
    }
}
