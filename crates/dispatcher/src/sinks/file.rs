//! FileSink - flat file of CSV lines
//!
//! The file is truncated when the sink opens, so each run starts with a
//! fresh header followed by raw stream lines.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{ContractError, DataSink, RecordKind, SinkRecord};
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file
    pub path: PathBuf,
}

impl FileSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./stream.csv"));

        Self { path }
    }
}

/// Sink that appends `Line` records to a file
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<LineWriter<File>>,
}

impl FileSink {
    /// Open (and truncate) the output file
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&config.path)?;
        let name = name.into();
        debug!(sink = %name, path = %config.path.display(), "FileSink opened");

        Ok(Self {
            name,
            path: config.path,
            writer: Some(LineWriter::new(file)),
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params);
        let path = config.path.clone();
        Self::new(&name, config).map_err(|e| ContractError::SinkConnection {
            sink_name: name,
            message: format!("cannot open {}: {e}", path.display()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&mut self, text: &str) -> Result<(), ContractError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "file already closed"))?;

        writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(|e| {
                error!(sink = %self.name, error = %e, "Write failed");
                ContractError::sink_write(&self.name, e.to_string())
            })
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        kind == RecordKind::Line
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, record),
        fields(sink = %self.name)
    )]
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError> {
        match record {
            SinkRecord::Line { text } => self.append_line(text),
            other => Err(ContractError::sink_write(
                &self.name,
                format!("unsupported record kind '{}'", other.kind().as_str()),
            )),
        }
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.writer = None;
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
