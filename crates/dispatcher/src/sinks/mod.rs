//! Sink implementations
//!
//! Contains LogSink, FileSink, DocumentSink and NetworkSink.

mod document;
mod file;
mod log;
mod network;

pub use self::document::DocumentSink;
pub use self::file::FileSink;
pub use self::log::LogSink;
pub use self::network::NetworkSink;

use contracts::{ContractError, RecordKind};

/// Parse a comma separated `records` parameter (`line,document,publish`)
pub(crate) fn parse_record_kinds(sink_name: &str, value: &str) -> Result<Vec<RecordKind>, ContractError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            RecordKind::ALL
                .into_iter()
                .find(|kind| kind.as_str() == s)
                .ok_or_else(|| {
                    ContractError::config_validation(
                        format!("sinks.{sink_name}.params.records"),
                        format!("unknown record kind '{s}'"),
                    )
                })
        })
        .collect()
}
