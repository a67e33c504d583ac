//! DataSink trait - Dispatcher output interface
//!
//! Defines the records the acquisition loop emits and the abstract
//! interface for sinks.

use serde::Serialize;
use serde_json::Value;

use crate::ContractError;

/// Document collection for aux snapshots and one-time vehicle info
pub const AUX_COLLECTION: &str = "tesla_aux";

/// Document collection for decoded stream frames
pub const STREAM_COLLECTION: &str = "tesla_stream";

/// Output record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkRecord {
    /// Flat-file line (CSV header or raw stream line), without newline
    Line { text: String },

    /// Append-only document insert
    Document { collection: String, document: Value },

    /// Publish/subscribe message
    Publish {
        topic: String,
        payload: String,
        retain: bool,
    },
}

impl SinkRecord {
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line { text: text.into() }
    }

    pub fn document(collection: impl Into<String>, document: Value) -> Self {
        Self::Document {
            collection: collection.into(),
            document,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Line { .. } => RecordKind::Line,
            Self::Document { .. } => RecordKind::Document,
            Self::Publish { .. } => RecordKind::Publish,
        }
    }
}

/// Record category used for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Line,
    Document,
    Publish,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Line, RecordKind::Document, RecordKind::Publish];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Document => "document",
            Self::Publish => "publish",
        }
    }
}

/// Data output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Whether this sink consumes records of `kind`
    fn accepts(&self, kind: RecordKind) -> bool;

    /// Write one record
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
