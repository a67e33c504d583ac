//! Layered error definitions
//!
//! Categorized by source: config / upstream api / stream / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Upstream API Errors =====
    /// HTTP transport or status error
    #[error("http error calling '{call}': {message}")]
    Http { call: String, message: String },

    /// Response arrived but did not have the expected shape
    #[error("unexpected response from '{call}': {message}")]
    UnexpectedResponse { call: String, message: String },

    /// Payload failed typed schema validation
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    // ===== Stream Errors =====
    /// Streaming channel protocol error
    #[error("stream protocol error: {message}")]
    StreamProtocol { message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create HTTP error
    pub fn http(call: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            call: call.into(),
            message: message.into(),
        }
    }

    /// Create unexpected response error
    pub fn unexpected_response(call: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            call: call.into(),
            message: message.into(),
        }
    }

    /// Create decode error
    pub fn decode(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
