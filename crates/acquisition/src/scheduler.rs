//! Event scheduler
//!
//! Every timer and every network call runs as its own tokio task and reports
//! back by posting an `Event` to the orchestrator's queue. Handlers never
//! await, so each event is processed in a single uninterrupted turn.

use std::future::Future;
use std::time::Duration;

use contracts::{AuxKind, ContractError};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Orchestrator input
#[derive(Debug)]
pub enum Event {
    /// Enter the wake cycle
    WakeCycle,
    /// Nap check delay expired
    NapCheckElapsed,
    /// Login + vehicle list call returned (raw body)
    VehiclesListed(Result<String, ContractError>),
    /// Charge state wake probe returned
    WakeProbeCompleted(Result<Value, ContractError>),
    /// Aux sampling interval fired
    AuxTick,
    /// Sleep check interval fired
    SleepCheck,
    /// A sub-state fetch returned
    SubStateFetched {
        kind: AuxKind,
        result: Result<Value, ContractError>,
    },
}

pub struct Scheduler {
    events: mpsc::UnboundedSender<Event>,
    repeating: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            repeating: Vec::new(),
        }
    }

    /// Queue an event for the next turn
    pub fn post(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Post `event` once after `delay`
    pub fn after(&self, delay: Duration, event: Event) {
        let events = self.events.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = events.send(event);
        });
    }

    /// Post `make()` every `period`, first after one full period
    ///
    /// Runs until the scheduler is dropped.
    pub fn every<F>(&mut self, period: Duration, make: F)
    where
        F: Fn() -> Event + Send + 'static,
    {
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(make()).is_err() {
                    break;
                }
            }
        });
        self.repeating.push(handle);
    }

    /// Run `call` in the background and post its event
    pub fn spawn<F>(&self, call: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = call.await;
            let _ = events.send(event);
        });
    }

    pub fn repeating_count(&self) -> usize {
        self.repeating.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in &self.repeating {
            handle.abort();
        }
    }
}
