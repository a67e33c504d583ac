//! DocumentSink - append-only JSON-lines store
//!
//! One `<dir>/<collection>.jsonl` file per collection, opened in append
//! mode on first use. Documents are never updated or deleted.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::PathBuf;

use contracts::{ContractError, DataSink, RecordKind, SinkRecord};
use serde_json::Value;
use tracing::{debug, instrument};

/// Sink that inserts `Document` records
pub struct DocumentSink {
    name: String,
    dir: PathBuf,
    collections: HashMap<String, LineWriter<File>>,
}

impl DocumentSink {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            name: name.into(),
            dir,
            collections: HashMap::new(),
        })
    }

    /// `dir` defaults to `./documents`
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let dir = params
            .get("dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./documents"));

        Self::new(&name, &dir).map_err(|e| ContractError::SinkConnection {
            sink_name: name,
            message: format!("cannot create {}: {e}", dir.display()),
        })
    }

    fn collection(&mut self, collection: &str) -> Result<&mut LineWriter<File>, ContractError> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ContractError::sink_write(
                &self.name,
                format!("invalid collection name '{collection}'"),
            ));
        }

        if !self.collections.contains_key(collection) {
            let path = self.dir.join(format!("{collection}.jsonl"));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
            debug!(sink = %self.name, path = %path.display(), "Opened collection");
            self.collections
                .insert(collection.to_string(), LineWriter::new(file));
        }

        self.collections
            .get_mut(collection)
            .ok_or_else(|| ContractError::sink_write(&self.name, "collection vanished"))
    }

    fn insert(&mut self, collection: &str, document: &Value) -> Result<(), ContractError> {
        let mut line = serde_json::to_vec(document)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        line.push(b'\n');

        let name = self.name.clone();
        self.collection(collection)?
            .write_all(&line)
            .map_err(|e| ContractError::sink_write(name, e.to_string()))
    }
}

impl DataSink for DocumentSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        kind == RecordKind::Document
    }

    #[instrument(
        name = "document_sink_write",
        skip(self, record),
        fields(sink = %self.name)
    )]
    async fn write(&mut self, record: &SinkRecord) -> Result<(), ContractError> {
        match record {
            SinkRecord::Document {
                collection,
                document,
            } => self.insert(collection, document),
            other => Err(ContractError::sink_write(
                &self.name,
                format!("unsupported record kind '{}'", other.kind().as_str()),
            )),
        }
    }

    #[instrument(name = "document_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        for writer in self.collections.values_mut() {
            writer
                .flush()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "document_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        self.collections.clear();
        debug!(sink = %self.name, "DocumentSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_documents_appended_per_collection() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tesla_aux.jsonl"), "{\"ts\":0}\n").unwrap();

        let mut sink = DocumentSink::new("docs", dir.path()).unwrap();
        sink.write(&SinkRecord::document("tesla_aux", json!({"ts": 1, "chargeState": {}})))
            .await
            .unwrap();
        sink.write(&SinkRecord::document("tesla_stream", json!({"ts": 2})))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let aux = fs::read_to_string(dir.path().join("tesla_aux.jsonl")).unwrap();
        let lines: Vec<&str> = aux.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["ts"], 1);

        let stream = fs::read_to_string(dir.path().join("tesla_stream.jsonl")).unwrap();
        assert_eq!(stream, "{\"ts\":2}\n");
    }

    #[tokio::test]
    async fn test_rejects_path_like_collection() {
        let dir = tempdir().unwrap();
        let mut sink = DocumentSink::new("docs", dir.path()).unwrap();
        let result = sink
            .write(&SinkRecord::document("../escape", json!({})))
            .await;
        assert!(matches!(result, Err(ContractError::SinkWrite { .. })));
        assert!(!sink.accepts(RecordKind::Line));
    }
}
