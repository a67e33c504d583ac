//! Acquisition errors
//!
//! Only unrecoverable configuration/contract violations surface as errors;
//! every other failure becomes a log line plus a scheduled retry.

use contracts::ContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Vehicle list response has no `response` array
    #[error("expected an array of vehicles in the vehicle list response, got: {body}")]
    VehicleListNotArray { body: String },

    /// Configured vehicle offset points past the returned list
    #[error("no vehicle data returned for vehicle offset {offset} ({count} vehicles on the account)")]
    VehicleOffsetOutOfRange { offset: usize, count: usize },

    /// Selected entry exists but is not a vehicle record
    #[error("undefined response for vehicle offset {offset}: {message}")]
    UndefinedVehicle { offset: usize, message: String },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl AcquisitionError {
    /// Whether the process must stop
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Contract(_))
    }
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
