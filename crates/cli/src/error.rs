//! Error types for CLI operations.

use acquisition::AcquisitionError;
use dispatcher::DispatcherError;
use thiserror::Error;
use vehicle_api::VehicleApiError;

/// Errors that stop the pipeline before or during acquisition
#[derive(Error, Debug)]
pub enum CliError {
    /// Live mode requested from a build without the REST/websocket clients
    #[cfg_attr(feature = "live", allow(dead_code))]
    #[error("live upstream support not compiled in; rebuild with the `live` feature or pass --mock")]
    LiveUnavailable,

    /// Upstream client could not be built
    #[error("Failed to build upstream client: {0}")]
    Upstream(#[from] VehicleApiError),

    /// Sinks could not be started
    #[error("Failed to start dispatcher: {0}")]
    Dispatcher(#[from] DispatcherError),

    /// The acquisition loop stopped on an unrecoverable condition
    #[error("Acquisition stopped: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_names_account() {
        let err: CliError = VehicleApiError::MissingToken {
            email: "owner@example.com".into(),
        }
        .into();
        assert!(err.to_string().contains("owner@example.com"));
    }

    #[test]
    fn test_acquisition_error_wraps() {
        let err: CliError = AcquisitionError::VehicleOffsetOutOfRange {
            offset: 2,
            count: 1,
        }
        .into();
        assert!(err.to_string().starts_with("Acquisition stopped"));
    }
}
