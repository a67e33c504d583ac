//! REST client for the owner API
//!
//! Two calls: the vehicle list (returned raw so the caller can classify
//! malformed bodies) and the per-vehicle `data_request` sub-states.

use std::time::Duration;

use contracts::{AcquisitionConfig, AuxKind, ContractError, VehicleApi, VehicleId};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Result, VehicleApiError};

/// Per-request timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("teslastream/", env!("CARGO_PKG_VERSION"));

/// Owner API client
///
/// Reuses one `reqwest::Client` (connection pooling, timeouts) for all calls.
pub struct OwnerApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl OwnerApiClient {
    /// Create a client for `base_url` authenticated with `access_token`
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(VehicleApiError::InvalidUrl {
                url: base_url,
                message: "expected an http(s) url".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| VehicleApiError::ClientBuild {
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url,
            access_token: access_token.into(),
        })
    }

    /// Client for the configured account and REST endpoint
    pub fn from_config(config: &AcquisitionConfig) -> Result<Self> {
        let token = config
            .account
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| VehicleApiError::MissingToken {
                email: config.account.email.clone(),
            })?;
        Self::new(config.endpoints.rest_base_url.clone(), token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(&self, call: &str, url: &str) -> std::result::Result<(StatusCode, String), ContractError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ContractError::http(call, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ContractError::http(call, e.to_string()))?;

        debug!(call, status = status.as_u16(), bytes = body.len(), "REST response");
        Ok((status, body))
    }
}

/// Server-side or throttling statuses worth retrying
fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

impl VehicleApi for OwnerApiClient {
    #[instrument(name = "owner_api_list_vehicles", skip(self))]
    async fn list_vehicles(&self) -> std::result::Result<String, ContractError> {
        let url = format!("{}/api/1/vehicles", self.base_url);
        let (status, body) = self.get_text("vehicles", &url).await?;

        if is_transient(status) {
            return Err(ContractError::http("vehicles", format!("status {status}")));
        }
        // Other error statuses still carry a JSON body; the caller decides
        Ok(body)
    }

    #[instrument(name = "owner_api_fetch_sub_state", skip(self, vehicle_id, kind), fields(vehicle_id = %vehicle_id, kind = %kind))]
    async fn fetch_sub_state(
        &self,
        vehicle_id: &VehicleId,
        kind: AuxKind,
    ) -> std::result::Result<Value, ContractError> {
        let call = kind.endpoint();
        let url = format!(
            "{}/api/1/vehicles/{}/data_request/{}",
            self.base_url, vehicle_id, call
        );
        let (status, body) = self.get_text(call, &url).await?;

        if !status.is_success() {
            return Err(ContractError::http(call, format!("status {status}")));
        }

        response_member(call, &body)
    }
}

/// Extract the `response` member of an owner API body
fn response_member(call: &str, body: &str) -> std::result::Result<Value, ContractError> {
    let mut value: Value = serde_json::from_str(body)
        .map_err(|e| ContractError::unexpected_response(call, format!("invalid JSON: {e}")))?;

    match value.get_mut("response").map(Value::take) {
        Some(Value::Null) | None => Err(ContractError::unexpected_response(
            call,
            "missing 'response' member",
        )),
        Some(response) => Ok(response),
    }
}
