//! Configuration parsing
//!
//! TOML is the primary format, JSON is accepted as well.

use contracts::{AcquisitionConfig, ContractError};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<AcquisitionConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<AcquisitionConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<AcquisitionConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AcquisitionMode, AuxKind, SinkType};

    #[test]
    fn test_parse_toml_applies_defaults() {
        let content = r#"
[account]
email = "owner@example.com"

[[sinks]]
name = "log"
sink_type = "log"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.account.email, "owner@example.com");
        assert!(config.account.access_token.is_none());
        assert_eq!(config.acquisition.mode, AcquisitionMode::Stream);
        assert_eq!(config.acquisition.max_requests_per_minute, 6);
        assert_eq!(
            config.acquisition.aux_kinds,
            vec![AuxKind::Charge, AuxKind::Climate, AuxKind::Drive]
        );
        assert_eq!(config.endpoints.publish_topic, "teslams");
        assert_eq!(config.sinks[0].sink_type, SinkType::Log);
        assert_eq!(config.sinks[0].queue_capacity, 100);
    }

    #[test]
    fn test_parse_toml_full() {
        let content = r#"
[account]
email = "owner@example.com"
access_token = "abc"

[endpoints]
rest_base_url = "http://localhost:8080"
stream_url = "ws://localhost:8081/streaming/"
publish_topic = "cars"

[acquisition]
mode = "aux"
max_requests_per_minute = 12
poll_interval_secs = 30
sleep_checking = true
vehicle_offset = 1
columns = ["speed", "soc"]
aux_kinds = ["charge"]

[[sinks]]
name = "stream_csv"
sink_type = "file"
params = { path = "stream.csv" }
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.acquisition.mode, AcquisitionMode::Aux);
        assert_eq!(config.acquisition.max_requests_per_minute, 12);
        assert_eq!(config.acquisition.vehicle_offset, 1);
        assert!(config.acquisition.sleep_checking);
        assert_eq!(config.acquisition.columns, vec!["speed", "soc"]);
        assert_eq!(config.endpoints.stream_url, "ws://localhost:8081/streaming/");
        assert_eq!(
            config.sinks[0].params.get("path").map(String::as_str),
            Some("stream.csv")
        );
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "account": { "email": "owner@example.com" },
            "acquisition": { "mode": "stream", "nap_check_secs": 120 },
            "sinks": [{ "name": "docs", "sink_type": "document", "params": { "dir": "out" } }]
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.acquisition.nap_check_secs, 120);
        assert_eq!(config.sinks[0].sink_type, SinkType::Document);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        let content = r#"
[account]
email = "owner@example.com"

[acquisition]
mode = "turbo"
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
