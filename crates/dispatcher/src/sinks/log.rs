//! LogSink - logs record summaries via tracing

use std::collections::HashMap;

use contracts::{ContractError, DataSink, RecordKind, SinkRecord};
use tracing::{info, instrument};

use super::parse_record_kinds;

/// Sink that logs one line per record, for debugging and dry runs
pub struct LogSink {
    name: String,
    kinds: Vec<RecordKind>,
    written: u64,
}

impl LogSink {
    /// Log sink accepting every record kind
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kinds: RecordKind::ALL.to_vec(),
            written: 0,
        }
    }

    /// Honours an optional `records` filter, e.g. `records = "document"`
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let mut sink = Self::new(name);
        if let Some(records) = params.get("records") {
            sink.kinds = parse_record_kinds(&sink.name, records)?;
        }
        Ok(sink)
    }

    fn log_record(&self, record: &SinkRecord) {
        match record {
            SinkRecord::Line { text } => {
                info!(sink = %self.name, line = %text, "Line record");
            }
            SinkRecord::Document {
                collection,
                document,
            } => {
                let keys: Vec<&str> = document
                    .as_object()
                    .map(|o| o.keys().map(String::as_str).collect())
                    .unwrap_or_default();
                info!(sink = %self.name, collection = %collection, keys = ?keys, "Document record");
            }
            SinkRecord::Publish {
                topic,
                payload,
                retain,
            } => {
                info!(
                    sink = %self.name,
                    topic = %topic,
                    retain,
                    bytes = payload.len(),
                    "Publish record"
                );
            }
        }
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        self.kinds.contains(&kind)
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, record),
        fields(sink = %self.name, kind = record.kind().as_str())
    )]
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError> {
        self.log_record(record);
        self.written += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, records = self.written, "LogSink closed");
        Ok(())
    }
}
