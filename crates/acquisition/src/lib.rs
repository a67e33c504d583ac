//! # Acquisition
//!
//! Long-running vehicle telemetry acquisition: a REST budget, the wake
//! cycle, periodic sub-state sampling and one persistent stream session,
//! all driven from a single event loop.
//!
//! ## Scheduling model
//!
//! The orchestrator task owns all mutable state. Timers and network calls
//! run as separate tasks that only post events back, so every
//! check-then-update on the shared state happens within one turn.
//!
//! # Example
//!
//! ```ignore
//! let (records_tx, records_rx) = tokio::sync::mpsc::channel(100);
//! let orchestrator = Orchestrator::new(&config, api, transport, SystemClock, records_tx);
//! let counters = orchestrator.counters();
//! orchestrator.run().await?;
//! ```

pub mod aux_sampler;
mod clock;
pub mod decode;
mod error;
mod orchestrator;
pub mod rate_limiter;
pub mod scheduler;
pub mod state;
mod stats;
pub mod stream_session;
pub mod wake_cycle;

pub use aux_sampler::{AuxSampler, FetchOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use decode::LineDecoder;
pub use error::{AcquisitionError, Result};
pub use orchestrator::Orchestrator;
pub use rate_limiter::RateLimiter;
pub use scheduler::Event;
pub use state::{AcquisitionState, ReentrancyGuard, SessionFlags};
pub use stats::{AcquisitionCounters, CountersSnapshot};
pub use stream_session::{StreamPhase, StreamSession, SubscribeMessage};
pub use wake_cycle::{WakeCycleController, WakePhase};
