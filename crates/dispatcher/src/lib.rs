//! # Dispatcher
//!
//! Record fan-out.
//!
//! Responsibilities:
//! - Consume `SinkRecord`s emitted by the acquisition loop
//! - Route each record to the sinks that accept its kind
//! - Isolate slow or failing sinks so they never block acquisition

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, RecordKind, SinkRecord};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{DocumentSink, FileSink, LogSink, NetworkSink};
