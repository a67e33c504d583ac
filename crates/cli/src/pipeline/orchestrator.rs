//! Pipeline orchestrator - wires upstream, acquisition and sinks together.
//!
//! The upstream is either the built-in mock vehicle or, with the `live`
//! feature, the owner REST API plus the streaming websocket.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use acquisition::{Orchestrator, SystemClock};
use contracts::{AcquisitionConfig, SinkRecord, StreamTransport, VehicleApi};
use tokio::sync::mpsc;
use tracing::{info, warn};
use vehicle_api::{MockTransport, MockVehicleApi};

use super::PipelineStats;
use crate::error::CliError;

/// Pause between mock stream frames
const MOCK_FEED_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on waiting for sinks to flush at shutdown
const DISPATCHER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Where vehicle data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamMode {
    /// Owner API and streaming endpoint from the config
    Live,
    /// Built-in demo vehicle, no network
    Mock,
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated acquisition config, CLI overrides applied
    pub config: AcquisitionConfig,

    pub upstream: UpstreamMode,

    /// Record channel capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves or acquisition hits a fatal error
    ///
    /// Errors are returned only for failures before acquisition starts; a
    /// fatal acquisition error is reported in the stats so the summary can
    /// still be printed.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats, CliError> {
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        match self.config.upstream {
            UpstreamMode::Mock => {
                info!("Running in MOCK mode (no upstream required)");
                let api = Arc::new(MockVehicleApi::demo());
                let transport = Arc::new(
                    MockTransport::new().with_feed(MockTransport::demo_feed(), MOCK_FEED_INTERVAL),
                );
                self.run_with(api, transport, shutdown).await
            }
            UpstreamMode::Live => self.run_live(shutdown).await,
        }
    }

    #[cfg(feature = "live")]
    async fn run_live(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats, CliError> {
        use vehicle_api::{OwnerApiClient, WebSocketTransport};

        let api = OwnerApiClient::from_config(&self.config.config)?;
        info!(
            rest = api.base_url(),
            stream = %self.config.config.endpoints.stream_url,
            "Using live upstream"
        );

        self.run_with(Arc::new(api), Arc::new(WebSocketTransport::new()), shutdown)
            .await
    }

    #[cfg(not(feature = "live"))]
    async fn run_live(self, _shutdown: impl Future<Output = ()>) -> Result<PipelineStats, CliError> {
        Err(CliError::LiveUnavailable)
    }

    /// Common logic shared between mock and live upstreams
    async fn run_with<A: VehicleApi, T: StreamTransport>(
        self,
        api: Arc<A>,
        transport: Arc<T>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<PipelineStats, CliError> {
        let start_time = Instant::now();
        let config = &self.config.config;

        info!("Setting up dispatcher...");
        let (records_tx, records_rx) = mpsc::channel::<SinkRecord>(self.config.buffer_size);
        let dispatcher = dispatcher::create_dispatcher(config.sinks.clone(), records_rx).await?;
        let sink_names = dispatcher.sink_names();
        let dispatcher_handle = dispatcher.spawn();
        info!(sinks = ?sink_names, "Dispatcher started");

        let orchestrator = Orchestrator::new(config, api, transport, SystemClock, records_tx);
        let counters = orchestrator.counters();

        // Dropping the loop drops the record sender, which lets the dispatcher drain
        let fatal = tokio::select! {
            result = orchestrator.run() => match result {
                Ok(()) => {
                    warn!("Acquisition loop ended on its own");
                    None
                }
                Err(e) => Some(e),
            },
            _ = shutdown => None,
        };

        info!("Shutting down dispatcher...");
        let sinks = match tokio::time::timeout(DISPATCHER_FLUSH_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                warn!(error = %e, "Dispatcher task failed");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout_secs = DISPATCHER_FLUSH_TIMEOUT.as_secs(),
                    "Timed out waiting for sinks to flush"
                );
                Vec::new()
            }
        };

        let stats = PipelineStats {
            duration: start_time.elapsed(),
            counters: counters.snapshot(),
            sinks,
            fatal,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            records = stats.counters.records_emitted,
            frames = stats.counters.frames_decoded,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}
