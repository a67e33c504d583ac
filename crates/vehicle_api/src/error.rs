//! Vehicle API error types

use contracts::ContractError;
use thiserror::Error;

/// Adapter construction error
///
/// Call-level failures are reported as `ContractError` so the acquisition
/// loop can classify them without knowing the adapter.
#[derive(Debug, Error)]
pub enum VehicleApiError {
    /// No bearer token available for the REST client
    #[error("no access token configured for '{email}'")]
    MissingToken { email: String },

    /// Base URL unusable
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// HTTP client could not be built
    #[error("failed to build http client: {message}")]
    ClientBuild { message: String },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

pub type Result<T> = std::result::Result<T, VehicleApiError>;
