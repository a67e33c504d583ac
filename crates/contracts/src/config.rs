//! AcquisitionConfig - Config Loader output
//!
//! Describes the account, upstream endpoints, acquisition tuning and output routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::AuxKind;

/// Streaming columns requested by default, in wire order after the timestamp
pub const DEFAULT_STREAM_COLUMNS: [&str; 12] = [
    "speed",
    "odometer",
    "soc",
    "elevation",
    "est_heading",
    "est_lat",
    "est_lng",
    "heading",
    "power",
    "shift_state",
    "range",
    "est_range",
];

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    pub account: AccountConfig,

    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default)]
    pub acquisition: AcquisitionSettings,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Account credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account login; paired with the stream token on subscribe
    pub email: String,

    /// REST bearer token
    #[serde(default)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("email", &self.email)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Upstream endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Topic prefix for published frames
    #[serde(default = "default_publish_topic")]
    pub publish_topic: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            rest_base_url: default_rest_base_url(),
            stream_url: default_stream_url(),
            publish_topic: default_publish_topic(),
        }
    }
}

fn default_rest_base_url() -> String {
    "https://owner-api.teslamotors.com".to_string()
}

fn default_stream_url() -> String {
    "wss://streaming.vn.teslamotors.com/streaming/".to_string()
}

fn default_publish_topic() -> String {
    "teslams".to_string()
}

/// What the acquisition loop runs after the first Ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Aux sampling plus the persistent stream session
    #[default]
    Stream,
    /// Aux sampling only
    Aux,
}

/// Acquisition tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    #[serde(default)]
    pub mode: AcquisitionMode,

    /// Outbound REST budget per rolling minute
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,

    /// Aux sampling period
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay before re-checking a vehicle found asleep
    #[serde(default = "default_nap_check_secs")]
    pub nap_check_secs: u64,

    /// Period of the steady-state sleep check
    #[serde(default = "default_sleep_check_secs")]
    pub sleep_check_secs: u64,

    /// Sleep episode length after which a long nap is reported
    #[serde(default = "default_nap_duration_secs")]
    pub nap_duration_secs: u64,

    /// Index into the returned vehicle list
    #[serde(default)]
    pub vehicle_offset: usize,

    /// Respect vehicle sleep instead of probing it awake
    #[serde(default)]
    pub sleep_checking: bool,

    /// Lower console logging to warnings
    #[serde(default)]
    pub silent: bool,

    /// Requested streaming columns
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,

    /// Sub-states sampled every poll interval
    #[serde(default = "default_aux_kinds")]
    pub aux_kinds: Vec<AuxKind>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::default(),
            max_requests_per_minute: default_max_requests_per_minute(),
            poll_interval_secs: default_poll_interval_secs(),
            nap_check_secs: default_nap_check_secs(),
            sleep_check_secs: default_sleep_check_secs(),
            nap_duration_secs: default_nap_duration_secs(),
            vehicle_offset: 0,
            sleep_checking: false,
            silent: false,
            columns: default_columns(),
            aux_kinds: default_aux_kinds(),
        }
    }
}

impl AcquisitionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn nap_check(&self) -> Duration {
        Duration::from_secs(self.nap_check_secs)
    }

    pub fn sleep_check(&self) -> Duration {
        Duration::from_secs(self.sleep_check_secs)
    }

    pub fn nap_duration(&self) -> Duration {
        Duration::from_secs(self.nap_duration_secs)
    }

    /// CSV header written once to flat files
    pub fn csv_header(&self) -> String {
        format!("timestamp,{}", self.columns.join(","))
    }
}

fn default_max_requests_per_minute() -> u32 {
    6
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_nap_check_secs() -> u64 {
    60
}

fn default_sleep_check_secs() -> u64 {
    60
}

fn default_nap_duration_secs() -> u64 {
    30 * 60
}

fn default_columns() -> Vec<String> {
    DEFAULT_STREAM_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn default_aux_kinds() -> Vec<AuxKind> {
    vec![AuxKind::Charge, AuxKind::Climate, AuxKind::Drive]
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// Flat file (CSV header + raw stream lines)
    File,
    /// Append-only document store
    Document,
    /// Publish over UDP
    Network,
}
