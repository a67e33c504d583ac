//! Dispatcher - main loop routing records to sinks

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace};

use contracts::{SinkConfig, SinkRecord, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{DocumentSink, FileSink, LogSink, NetworkSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<SinkRecord>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<SinkRecord>) -> Self {
        Self { config, input_rx }
    }

    /// Open every sink and start its worker
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config).await?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    async fn initialize_handles(
        config: &DispatcherConfig,
    ) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            match create_sink_handle(sink_config).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Workers already started would otherwise outlive the error
                    for handle in handles {
                        handle.shutdown().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(handles)
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
async fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let creation = |e: contracts::ContractError| DispatcherError::sink_creation(&config.name, e.to_string());

    let handle = match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::from_params(&config.name, &config.params).map_err(creation)?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params).map_err(creation)?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::Document => {
            let sink = DocumentSink::from_params(&config.name, &config.params).map_err(creation)?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .await
                .map_err(creation)?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
    };
    Ok(handle)
}

/// Routes each record to every sink accepting its kind
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<SinkRecord>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<SinkRecord>) -> Self {
        Self { handles, input_rx }
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name().to_string()).collect()
    }

    /// Metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run until the input channel closes, then drain every sink
    ///
    /// Returns the final per-sink metrics.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, MetricsSnapshot)> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut record_count: u64 = 0;
        let mut unrouted: u64 = 0;

        while let Some(record) = self.input_rx.recv().await {
            record_count += 1;
            if self.dispatch_record(record) == 0 {
                unrouted += 1;
                trace!("No sink accepts record");
            }

            if record_count.is_multiple_of(100) {
                debug!(records = record_count, "Dispatcher progress");
            }
        }

        info!(
            records = record_count,
            unrouted,
            "Dispatcher input closed, shutting down"
        );

        let mut finals = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            let sink_metrics = handle.metrics().clone();
            handle.shutdown().await;
            finals.push((name, sink_metrics.snapshot()));
        }

        info!("Dispatcher shutdown complete");
        finals
    }

    pub fn spawn(self) -> JoinHandle<Vec<(String, MetricsSnapshot)>> {
        tokio::spawn(self.run())
    }

    /// Returns how many sinks the record was offered to
    fn dispatch_record(&self, record: SinkRecord) -> usize {
        let kind = record.kind();
        let targets: Vec<&SinkHandle> = self.handles.iter().filter(|h| h.accepts(kind)).collect();

        if let Some((last, rest)) = targets.split_last() {
            for handle in rest {
                handle.try_send(record.clone());
            }
            last.try_send(record);
        }
        targets.len()
    }
}

/// Build a dispatcher straight from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<SinkRecord>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build().await
}
