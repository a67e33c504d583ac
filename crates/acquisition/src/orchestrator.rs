//! Acquisition orchestrator
//!
//! Owns `AcquisitionState` and drives the wake cycle, the aux sampler and
//! the stream session from a single event loop. Sleep transitions are not
//! pushed to the samplers; they read the shared flags on every turn.

use std::future::Future;
use std::sync::Arc;

use contracts::{
    AcquisitionConfig, AcquisitionMode, AcquisitionSettings, AuxKind, ChannelNotice,
    ContractError, SinkRecord, StreamTransport, TelemetryFrame, VehicleApi, VehicleHandle,
    VehicleId, AUX_COLLECTION, STREAM_COLLECTION,
};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::aux_sampler::{self, AuxSampler, FetchOutcome};
use crate::clock::Clock;
use crate::error::AcquisitionError;
use crate::scheduler::{Event, Scheduler};
use crate::state::AcquisitionState;
use crate::stats::AcquisitionCounters;
use crate::stream_session::{ConnectOutcome, NoticeOutcome, StreamSession};
use crate::wake_cycle::{EntryDecision, ListOutcome, WakeCycleController};

pub struct Orchestrator<A: VehicleApi, T: StreamTransport, C: Clock> {
    settings: AcquisitionSettings,
    stream_topic: String,
    api: Arc<A>,
    clock: C,
    state: AcquisitionState,
    wake: WakeCycleController,
    sampler: AuxSampler,
    stream: Option<StreamSession<T>>,
    scheduler: Scheduler,
    events: mpsc::UnboundedReceiver<Event>,
    notices: mpsc::UnboundedReceiver<ChannelNotice>,
    records: mpsc::Sender<SinkRecord>,
    counters: Arc<AcquisitionCounters>,
}

impl<A: VehicleApi, T: StreamTransport, C: Clock> Orchestrator<A, T, C> {
    pub fn new(
        config: &AcquisitionConfig,
        api: Arc<A>,
        transport: Arc<T>,
        clock: C,
        records: mpsc::Sender<SinkRecord>,
    ) -> Self {
        let settings = config.acquisition.clone();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (notice_tx, notices) = mpsc::unbounded_channel();

        let stream = match settings.mode {
            AcquisitionMode::Stream => Some(StreamSession::new(
                transport,
                config.endpoints.stream_url.clone(),
                config.account.email.clone(),
                settings.columns.clone(),
                notice_tx,
            )),
            AcquisitionMode::Aux => None,
        };

        Self {
            stream_topic: format!("{}/stream", config.endpoints.publish_topic),
            api,
            clock,
            state: AcquisitionState::new(settings.max_requests_per_minute),
            wake: WakeCycleController::new(&settings),
            sampler: AuxSampler::new(settings.aux_kinds.clone()),
            stream,
            scheduler: Scheduler::new(event_tx),
            events,
            notices,
            records,
            counters: Arc::new(AcquisitionCounters::default()),
            settings,
        }
    }

    pub fn counters(&self) -> Arc<AcquisitionCounters> {
        self.counters.clone()
    }

    /// Run until a fatal configuration error
    ///
    /// Termination otherwise happens by dropping the future.
    pub async fn run(mut self) -> Result<(), AcquisitionError> {
        info!(
            mode = ?self.settings.mode,
            vehicle_offset = self.settings.vehicle_offset,
            max_requests_per_minute = self.settings.max_requests_per_minute,
            sleep_checking = self.settings.sleep_checking,
            "Starting acquisition"
        );
        self.scheduler.post(Event::WakeCycle);

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    if let Err(e) = self.handle_event(event) {
                        error!(error = %e, "Unrecoverable error, stopping acquisition");
                        if let Some(stream) = self.stream.as_mut() {
                            stream.stop();
                        }
                        return Err(e);
                    }
                }
                Some(notice) = self.notices.recv() => self.handle_notice(notice),
                else => break,
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Result<(), AcquisitionError> {
        match event {
            Event::WakeCycle => self.enter_wake_cycle(),
            Event::NapCheckElapsed => {
                if self.wake.on_nap_elapsed(&mut self.state) {
                    AcquisitionCounters::incr(&self.counters.long_naps);
                }
                self.enter_wake_cycle();
            }
            Event::VehiclesListed(result) => self.on_vehicles_listed(result)?,
            Event::WakeProbeCompleted(result) => {
                let delay = self.wake.on_probe_completed(&mut self.state, result);
                self.scheduler.after(delay, Event::WakeCycle);
            }
            Event::AuxTick => self.sample_aux(),
            Event::SleepCheck => {
                debug!("Periodic sleep check");
                self.enter_wake_cycle();
            }
            Event::SubStateFetched { kind, result } => self.on_sub_state(kind, result),
        }
        Ok(())
    }

    fn enter_wake_cycle(&mut self) {
        let now = self.clock.now_millis();
        match self.wake.begin(&mut self.state, now) {
            EntryDecision::Proceed => {
                let api = self.api.clone();
                self.spawn_call(
                    "list_vehicles",
                    async move { api.list_vehicles().await },
                    Event::VehiclesListed,
                );
            }
            EntryDecision::Busy => AcquisitionCounters::incr(&self.counters.wake_cycles_skipped),
            EntryDecision::Napping => {}
            EntryDecision::Throttled { retry_after } => {
                self.throttled("wake_cycle", 1);
                observability::record_wake_outcome("throttled");
                self.scheduler.after(retry_after, Event::WakeCycle);
            }
        }
    }

    fn on_vehicles_listed(
        &mut self,
        result: Result<String, ContractError>,
    ) -> Result<(), AcquisitionError> {
        let now = self.clock.now_millis();
        match self.wake.on_vehicles_listed(&mut self.state, result, now) {
            ListOutcome::Retry { delay } => {
                observability::record_wake_outcome("retry");
                self.scheduler.after(delay, Event::WakeCycle);
            }
            ListOutcome::Nap { delay, .. } => {
                observability::record_wake_outcome("nap");
                AcquisitionCounters::incr(&self.counters.naps);
                self.scheduler.after(delay, Event::NapCheckElapsed);
            }
            ListOutcome::Wake { vehicle_id } => {
                observability::record_wake_outcome("wake");
                AcquisitionCounters::incr(&self.counters.wake_probes);
                let api = self.api.clone();
                self.spawn_call(
                    AuxKind::Charge.endpoint(),
                    async move { api.fetch_sub_state(&vehicle_id, AuxKind::Charge).await },
                    Event::WakeProbeCompleted,
                );
            }
            ListOutcome::Throttled { retry_after } => {
                self.throttled("wake_probe", 1);
                observability::record_wake_outcome("throttled");
                self.scheduler.after(retry_after, Event::WakeCycle);
            }
            ListOutcome::Ready {
                handle,
                entry,
                first,
            } => {
                observability::record_wake_outcome("ready");
                AcquisitionCounters::incr(&self.counters.ready_transitions);
                self.on_ready(handle, entry, first);
            }
            ListOutcome::Fatal(e) => {
                observability::record_wake_outcome("fatal");
                return Err(e);
            }
        }
        Ok(())
    }

    fn on_ready(&mut self, handle: VehicleHandle, entry: Value, first: bool) {
        if first {
            let now = self.clock.now_millis();
            self.emit(SinkRecord::document(
                AUX_COLLECTION,
                json!({ "ts": now, "vehicles": entry }),
            ));

            for kind in [AuxKind::Vehicle, AuxKind::Gui] {
                if aux_sampler::admit(&mut self.state, kind, now) {
                    self.fetch_sub_state(&handle.id, kind);
                } else {
                    self.throttled("vehicle_info", 1);
                }
            }

            if self.stream.is_some() {
                self.emit(SinkRecord::line(self.settings.csv_header()));
            }

            self.scheduler
                .every(self.settings.poll_interval(), || Event::AuxTick);
            if self.settings.sleep_checking {
                self.scheduler
                    .every(self.settings.sleep_check(), || Event::SleepCheck);
            }
            info!(
                poll_interval_secs = self.settings.poll_interval_secs,
                aux_kinds = ?self.sampler.kinds(),
                "Auxiliary sampling started"
            );
        }

        if let Some(stream) = self.stream.as_mut() {
            if let ConnectOutcome::Opened(_) = stream.connect(&mut self.state, &handle) {
                AcquisitionCounters::incr(&self.counters.stream_connects);
            }
        }
    }

    fn sample_aux(&mut self) {
        if self.state.handle.is_none() {
            return;
        }
        let suppressed = self.state.flags.suppressed();
        let now = self.clock.now_millis();
        let kinds = self.sampler.tick(&mut self.state, now);

        if suppressed {
            AcquisitionCounters::incr(&self.counters.samples_suppressed);
            return;
        }
        let denied = self.sampler.kinds().len() - kinds.len();
        if denied > 0 {
            self.throttled("aux_sampler", denied as u64);
        }

        let Some(vehicle_id) = self.state.handle.as_ref().map(|h| h.id.clone()) else {
            return;
        };
        for kind in kinds {
            self.fetch_sub_state(&vehicle_id, kind);
        }
    }

    fn on_sub_state(&mut self, kind: AuxKind, result: Result<Value, ContractError>) {
        let now = self.clock.now_millis();
        match self.sampler.on_fetched(&mut self.state, kind, result, now) {
            FetchOutcome::Emitted(snapshot) => {
                AcquisitionCounters::incr(&self.counters.snapshots_emitted);
                observability::record_snapshot_emitted(kind.endpoint());
                debug!(kind = %kind, ts = snapshot.timestamp, "Sub-state changed");
                self.emit(SinkRecord::document(AUX_COLLECTION, snapshot.to_document()));
            }
            FetchOutcome::Duplicate => {
                AcquisitionCounters::incr(&self.counters.snapshots_deduplicated);
                observability::record_snapshot_deduplicated(kind.endpoint());
            }
            FetchOutcome::Rejected => {
                AcquisitionCounters::incr(&self.counters.snapshots_rejected);
                observability::record_snapshot_rejected(kind.endpoint());
            }
            FetchOutcome::Failed => {}
        }
    }

    fn handle_notice(&mut self, notice: ChannelNotice) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        match stream.handle_notice(notice) {
            NoticeOutcome::Update { raw, frame } => self.on_stream_update(raw, frame),
            NoticeOutcome::Dropped {
                reconnected: Some(connection),
            } => {
                debug!(connection, "Stream reconnect issued");
                AcquisitionCounters::incr(&self.counters.stream_reconnects);
                observability::record_stream_reconnect();
            }
            NoticeOutcome::ServerError(_) => {
                AcquisitionCounters::incr(&self.counters.stream_errors);
            }
            NoticeOutcome::Dropped { reconnected: None }
            | NoticeOutcome::Subscribed
            | NoticeOutcome::Hello
            | NoticeOutcome::Stale
            | NoticeOutcome::Ignored => {}
        }
    }

    fn on_stream_update(&mut self, raw: String, frame: TelemetryFrame) {
        let stored = frame.has_shift_state();
        AcquisitionCounters::incr(&self.counters.frames_decoded);
        observability::record_stream_frame(stored);

        self.emit(SinkRecord::line(raw));
        if !stored {
            return;
        }

        match serde_json::to_value(&frame) {
            Ok(document) => {
                AcquisitionCounters::incr(&self.counters.frames_stored);
                self.emit(SinkRecord::Publish {
                    topic: self.stream_topic.clone(),
                    payload: document.to_string(),
                    retain: true,
                });
                self.emit(SinkRecord::document(STREAM_COLLECTION, document));
            }
            Err(e) => warn!(error = %e, "Failed to encode telemetry frame"),
        }
    }

    fn fetch_sub_state(&mut self, vehicle_id: &VehicleId, kind: AuxKind) {
        let api = self.api.clone();
        let vehicle_id = vehicle_id.clone();
        self.spawn_call(
            kind.endpoint(),
            async move { api.fetch_sub_state(&vehicle_id, kind).await },
            move |result| Event::SubStateFetched { kind, result },
        );
    }

    /// Issue a REST call in the background; its budget is already charged
    fn spawn_call<R, F, W>(&self, call: &'static str, request: F, wrap: W)
    where
        R: Send + 'static,
        F: Future<Output = Result<R, ContractError>> + Send + 'static,
        W: FnOnce(Result<R, ContractError>) -> Event + Send + 'static,
    {
        AcquisitionCounters::incr(&self.counters.rest_requests);
        observability::record_rest_request(call);

        let counters = self.counters.clone();
        self.scheduler.spawn(async move {
            let started = tokio::time::Instant::now();
            let result = request.await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            observability::record_rest_response(call, latency_ms, result.is_ok());
            counters.record_rest_latency(latency_ms);
            if result.is_err() {
                AcquisitionCounters::incr(&counters.rest_failures);
            }
            wrap(result)
        });
    }

    fn throttled(&self, component: &'static str, n: u64) {
        AcquisitionCounters::add(&self.counters.throttled, n);
        observability::record_throttled(component);
    }

    fn emit(&self, record: SinkRecord) {
        match self.records.try_send(record) {
            Ok(()) => AcquisitionCounters::incr(&self.counters.records_emitted),
            Err(TrySendError::Full(record)) => {
                AcquisitionCounters::incr(&self.counters.records_dropped);
                warn!(kind = record.kind().as_str(), "Record queue full, dropping record");
            }
            Err(TrySendError::Closed(record)) => {
                AcquisitionCounters::incr(&self.counters.records_dropped);
                warn!(kind = record.kind().as_str(), "Record queue closed, dropping record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use contracts::{AccountConfig, ChannelEvent, ConfigVersion, EndpointConfig, RecordKind};
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, Instant};
    use vehicle_api::{vehicle_entry, vehicle_list_body, MockTransport, MockVehicleApi};

    const BASE_MILLIS: i64 = 1_700_000_000_000;
    const VEHICLE: &str = "12345678901234567";

    /// Wall clock that follows tokio's (paused) clock
    struct FollowClock {
        origin: Instant,
    }

    impl Clock for FollowClock {
        fn now_millis(&self) -> i64 {
            BASE_MILLIS + self.origin.elapsed().as_millis() as i64
        }
    }

    fn config(mode: AcquisitionMode, sleep_checking: bool) -> AcquisitionConfig {
        AcquisitionConfig {
            version: ConfigVersion::V1,
            account: AccountConfig {
                email: "owner@example.com".into(),
                access_token: None,
            },
            endpoints: EndpointConfig::default(),
            acquisition: AcquisitionSettings {
                mode,
                sleep_checking,
                max_requests_per_minute: 10,
                ..Default::default()
            },
            sinks: Vec::new(),
        }
    }

    struct Harness {
        task: JoinHandle<Result<(), AcquisitionError>>,
        records: mpsc::Receiver<SinkRecord>,
        counters: Arc<AcquisitionCounters>,
    }

    impl Harness {
        fn drain(&mut self) -> Vec<SinkRecord> {
            let mut out = Vec::new();
            while let Ok(record) = self.records.try_recv() {
                out.push(record);
            }
            out
        }

        fn count(&self, pick: impl Fn(&AcquisitionCounters) -> &std::sync::atomic::AtomicU64) -> u64 {
            pick(&self.counters).load(Ordering::Relaxed)
        }
    }

    fn start(
        config: AcquisitionConfig,
        api: &Arc<MockVehicleApi>,
        transport: &Arc<MockTransport>,
        capacity: usize,
    ) -> Harness {
        let (tx, records) = mpsc::channel(capacity);
        let clock = FollowClock {
            origin: Instant::now(),
        };
        let orchestrator = Orchestrator::new(&config, api.clone(), transport.clone(), clock, tx);
        let counters = orchestrator.counters();
        Harness {
            task: tokio::spawn(orchestrator.run()),
            records,
            counters,
        }
    }

    fn online_api() -> Arc<MockVehicleApi> {
        Arc::new(MockVehicleApi::demo())
    }

    fn documents(records: &[SinkRecord], collection: &str) -> Vec<Value> {
        records
            .iter()
            .filter_map(|r| match r {
                SinkRecord::Document {
                    collection: c,
                    document,
                } if c == collection => Some(document.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_asleep_vehicle_naps_without_sampling() {
        let api = Arc::new(MockVehicleApi::new());
        api.set_list(vehicle_list_body(&[vehicle_entry(VEHICLE, "asleep", Some("t"))]));
        let transport = Arc::new(MockTransport::new());
        let mut harness = start(config(AcquisitionMode::Aux, true), &api, &transport, 64);

        sleep(Duration::from_secs(59)).await;
        assert_eq!(api.list_calls(), 1);
        assert!(api.sub_state_calls().is_empty());

        sleep(Duration::from_secs(2)).await;
        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(60));
        assert!(api.sub_state_calls().is_empty());
        assert!(harness.drain().is_empty());
        assert_eq!(harness.count(|c| &c.naps), 2);
        assert_eq!(transport.open_count(), 0);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_ready_emits_vehicle_info_and_header() {
        let api = online_api();
        let transport = Arc::new(MockTransport::new());
        let mut harness = start(config(AcquisitionMode::Stream, false), &api, &transport, 64);

        sleep(Duration::from_millis(10)).await;
        let records = harness.drain();

        let SinkRecord::Document { collection, document } = &records[0] else {
            panic!("expected vehicles document first");
        };
        assert_eq!(collection, AUX_COLLECTION);
        assert_eq!(document["vehicles"]["id"], VEHICLE);
        assert_eq!(document["ts"], BASE_MILLIS);

        assert_eq!(
            records[1],
            SinkRecord::line(AcquisitionSettings::default().csv_header())
        );

        let aux = documents(&records, AUX_COLLECTION);
        assert_eq!(aux.len(), 3);
        assert!(aux.iter().any(|d| d.get("vehicleState").is_some()));
        assert!(aux.iter().any(|d| d.get("guiSettings").is_some()));

        assert_eq!(api.sub_state_calls(), vec![AuxKind::Vehicle, AuxKind::Gui]);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(harness.count(|c| &c.ready_transitions), 1);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_samples_and_deduplicates() {
        let api = online_api();
        let transport = Arc::new(MockTransport::new());
        let mut harness = start(config(AcquisitionMode::Aux, false), &api, &transport, 64);

        sleep(Duration::from_secs(61)).await;
        let records = harness.drain();
        assert!(records.iter().all(|r| r.kind() == RecordKind::Document));
        let aux = documents(&records, AUX_COLLECTION);
        // vehicles + vehicle/gui + charge/climate/drive
        assert_eq!(aux.len(), 6);
        assert!(aux.iter().any(|d| d.get("chargeState").is_some()));

        sleep(Duration::from_secs(60)).await;
        assert!(harness.drain().is_empty());
        assert_eq!(harness.count(|c| &c.snapshots_deduplicated), 3);
        assert_eq!(
            api.sub_state_calls()
                .iter()
                .filter(|k| **k == AuxKind::Charge)
                .count(),
            2
        );
        assert_eq!(transport.open_count(), 0);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_sub_state_is_emitted_again() {
        let api = online_api();
        api.push_sub_state(AuxKind::Climate, serde_json::json!({"inside_temp": 20.0}));
        api.push_sub_state(AuxKind::Climate, serde_json::json!({"inside_temp": 20.0}));
        api.push_sub_state(AuxKind::Climate, serde_json::json!({"inside_temp": 23.5}));
        let transport = Arc::new(MockTransport::new());
        let mut harness = start(config(AcquisitionMode::Aux, false), &api, &transport, 64);

        sleep(Duration::from_secs(181)).await;
        let climate: Vec<Value> = documents(&harness.drain(), AUX_COLLECTION)
            .into_iter()
            .filter_map(|d| d.get("climateState").cloned())
            .collect();
        assert_eq!(climate.len(), 2);
        assert_eq!(climate[0]["inside_temp"], 20.0);
        assert_eq!(climate[1]["inside_temp"], 23.5);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_key_field_sub_state_is_stored() {
        let api = online_api();
        api.push_sub_state(
            AuxKind::Climate,
            serde_json::json!({"inside_temp": null, "outside_temp": 11.0}),
        );
        let transport = Arc::new(MockTransport::new());
        let mut harness = start(config(AcquisitionMode::Aux, false), &api, &transport, 64);

        sleep(Duration::from_secs(61)).await;
        let climate: Vec<Value> = documents(&harness.drain(), AUX_COLLECTION)
            .into_iter()
            .filter_map(|d| d.get("climateState").cloned())
            .collect();
        assert_eq!(climate.len(), 1);
        assert!(climate[0]["inside_temp"].is_null());
        assert_eq!(climate[0]["outside_temp"], 11.0);
        assert_eq!(harness.count(|c| &c.snapshots_rejected), 0);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_update_routed_to_outputs() {
        let api = online_api();
        let transport = Arc::new(MockTransport::new());
        let mut harness = start(config(AcquisitionMode::Stream, false), &api, &transport, 64);

        sleep(Duration::from_millis(10)).await;
        harness.drain();

        assert!(transport.emit(1, ChannelEvent::Open));
        let parked = "1700000000500,,12345.6,78,12,270,37.49,-121.94,270,0,,201,195";
        let driving = "1700000001000,25,12345.8,77,13,272,37.4931,-121.9444,272,35,D,200,194";
        assert!(transport.emit_update(1, parked));
        assert!(transport.emit_update(1, driving));
        sleep(Duration::from_millis(10)).await;

        let subscribe: Value = serde_json::from_str(&transport.sent_messages(1)[0]).unwrap();
        assert_eq!(subscribe["msg_type"], "data:subscribe");
        assert_eq!(subscribe["tag"], VEHICLE);

        let records = harness.drain();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], SinkRecord::line(parked));
        assert_eq!(records[1], SinkRecord::line(driving));
        let SinkRecord::Publish { topic, payload, retain } = &records[2] else {
            panic!("expected publish");
        };
        assert_eq!(topic, "teslams/stream");
        assert!(retain);
        let published: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(published["ts"], 1_700_000_001_000u64);

        let stored = documents(&records, STREAM_COLLECTION);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], published);
        assert_eq!(harness.count(|c| &c.frames_decoded), 2);
        assert_eq!(harness.count(|c| &c.frames_stored), 1);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_close_reconnects_once() {
        let api = online_api();
        let transport = Arc::new(MockTransport::new());
        let harness = start(config(AcquisitionMode::Stream, false), &api, &transport, 64);

        sleep(Duration::from_millis(10)).await;
        transport.emit(1, ChannelEvent::Error("connection reset".into()));
        transport.emit(
            1,
            ChannelEvent::Close {
                code: Some(1006),
                reason: String::new(),
            },
        );
        sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.open_count(), 2);
        assert_eq!(harness.count(|c| &c.stream_reconnects), 1);

        // New channel subscribes with the same token
        transport.emit(2, ChannelEvent::Open);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.sent_messages(2).len(), 1);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_probe_then_ready() {
        let api = online_api();
        api.push_list(vehicle_list_body(&[vehicle_entry(VEHICLE, "online", None)]));
        let transport = Arc::new(MockTransport::new());
        let harness = start(config(AcquisitionMode::Stream, false), &api, &transport, 64);

        sleep(Duration::from_secs(2)).await;
        let calls = api.calls();
        assert_eq!(calls[0].call, "vehicles");
        assert_eq!(calls[1].kind, Some(AuxKind::Charge));
        assert_eq!(calls[2].call, "vehicles");
        assert_eq!(calls[2].at - calls[1].at, Duration::from_secs(1));
        assert_eq!(harness.count(|c| &c.wake_probes), 1);
        assert_eq!(harness.count(|c| &c.ready_transitions), 1);
        assert_eq!(transport.open_count(), 1);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_woken_vehicle_token_reaches_subscribe() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let api = online_api();
        api.push_list(vehicle_list_body(&[vehicle_entry(VEHICLE, "online", None)]));
        api.push_list(vehicle_list_body(&[vehicle_entry(
            VEHICLE,
            "online",
            Some("rotated-A"),
        )]));
        let transport = Arc::new(MockTransport::new());
        let harness = start(config(AcquisitionMode::Stream, false), &api, &transport, 64);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(harness.count(|c| &c.wake_probes), 1);
        assert_eq!(transport.open_count(), 1);

        assert!(transport.emit(1, ChannelEvent::Open));
        sleep(Duration::from_millis(10)).await;

        let subscribe: Value = serde_json::from_str(&transport.sent_messages(1)[0]).unwrap();
        let token = subscribe["token"].as_str().unwrap();
        let decoded = String::from_utf8(STANDARD.decode(token).unwrap()).unwrap();
        assert_eq!(decoded, "owner@example.com:rotated-A");
        assert_eq!(subscribe["tag"], VEHICLE);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_out_of_range_is_fatal() {
        let api = online_api();
        let transport = Arc::new(MockTransport::new());
        let mut config = config(AcquisitionMode::Stream, false);
        config.acquisition.vehicle_offset = 3;
        let harness = start(config, &api, &transport, 64);

        let result = harness.task.await.unwrap();
        assert!(matches!(
            result,
            Err(AcquisitionError::VehicleOffsetOutOfRange { offset: 3, count: 1 })
        ));
        assert!(api.sub_state_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_failure_retries_after_delay() {
        let api = online_api();
        api.push_list_error("connection refused");
        let transport = Arc::new(MockTransport::new());
        let harness = start(config(AcquisitionMode::Aux, false), &api, &transport, 64);

        sleep(Duration::from_secs(11)).await;
        let calls = api.calls();
        assert_eq!(calls[1].at - calls[0].at, crate::wake_cycle::PARSE_FAILURE_RETRY);
        assert_eq!(harness.count(|c| &c.rest_failures), 1);
        assert_eq!(harness.count(|c| &c.ready_transitions), 1);
        harness.task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_record_queue_drops() {
        let api = online_api();
        let transport = Arc::new(MockTransport::new());
        let harness = start(config(AcquisitionMode::Stream, false), &api, &transport, 1);

        sleep(Duration::from_millis(10)).await;
        assert_eq!(harness.count(|c| &c.records_emitted), 1);
        assert_eq!(harness.count(|c| &c.records_dropped), 3);
        harness.task.abort();
    }
}
