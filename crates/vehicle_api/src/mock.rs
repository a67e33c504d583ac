//! Mock upstream
//!
//! Scriptable `VehicleApi` and `StreamTransport` used by unit tests,
//! integration tests and `run --mock`. Responses are served from a FIFO
//! script first, then from a per-call default; with neither, the call fails.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contracts::{
    AuxKind, ChannelCommand, ChannelEvent, ChannelHandle, ChannelNotice, ConnectionId,
    ContractError, NoticeSender, StreamTransport, VehicleApi, VehicleId,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Recorded REST call
#[derive(Debug, Clone)]
pub struct ApiCall {
    /// `vehicles` or the sub-state endpoint name
    pub call: String,
    pub vehicle_id: Option<VehicleId>,
    pub kind: Option<AuxKind>,
    pub at: Instant,
}

/// Scripted reply
type Scripted<T> = Result<T, String>;

/// Calls kept in the log; older entries are dropped first
pub const MAX_RECORDED_CALLS: usize = 4096;

/// Mock REST API
pub struct MockVehicleApi {
    /// Artificial per-call latency
    latency: Duration,
    list_script: Mutex<VecDeque<Scripted<String>>>,
    list_default: Mutex<Option<String>>,
    sub_state_script: Mutex<HashMap<AuxKind, VecDeque<Scripted<Value>>>>,
    sub_state_default: Mutex<HashMap<AuxKind, Value>>,
    calls: Mutex<VecDeque<ApiCall>>,
}

impl MockVehicleApi {
    /// Create an empty mock; every call fails until scripted
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            list_script: Mutex::new(VecDeque::new()),
            list_default: Mutex::new(None),
            sub_state_script: Mutex::new(HashMap::new()),
            sub_state_default: Mutex::new(HashMap::new()),
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Online vehicle with plausible defaults for every sub-state
    pub fn demo() -> Self {
        let api = Self::new();
        api.set_list(vehicle_list_body(&[vehicle_entry(
            "12345678901234567",
            "online",
            Some("demo-stream-token"),
        )]));
        for kind in AuxKind::ALL {
            api.set_sub_state(kind, sample_sub_state(kind));
        }
        api
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue one vehicle list body
    pub fn push_list(&self, body: impl Into<String>) {
        self.list_script.lock().unwrap().push_back(Ok(body.into()));
    }

    /// Queue one transport failure for the vehicle list
    pub fn push_list_error(&self, message: impl Into<String>) {
        self.list_script.lock().unwrap().push_back(Err(message.into()));
    }

    /// Body served once the list script is exhausted
    pub fn set_list(&self, body: impl Into<String>) {
        *self.list_default.lock().unwrap() = Some(body.into());
    }

    pub fn push_sub_state(&self, kind: AuxKind, payload: Value) {
        self.sub_state_script
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(Ok(payload));
    }

    pub fn push_sub_state_error(&self, kind: AuxKind, message: impl Into<String>) {
        self.sub_state_script
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(Err(message.into()));
    }

    pub fn set_sub_state(&self, kind: AuxKind, payload: Value) {
        self.sub_state_default.lock().unwrap().insert(kind, payload);
    }

    /// Most recent calls in arrival order, at most `MAX_RECORDED_CALLS`
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().iter().cloned().collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn list_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.kind.is_none())
            .count()
    }

    /// Sub-state kinds requested, in order
    pub fn sub_state_calls(&self) -> Vec<AuxKind> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c.kind)
            .collect()
    }

    fn record(&self, call: &str, vehicle_id: Option<&VehicleId>, kind: Option<AuxKind>) {
        let mut calls = self.calls.lock().unwrap();
        if calls.len() == MAX_RECORDED_CALLS {
            calls.pop_front();
        }
        calls.push_back(ApiCall {
            call: call.to_string(),
            vehicle_id: vehicle_id.cloned(),
            kind,
            at: Instant::now(),
        });
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for MockVehicleApi {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleApi for MockVehicleApi {
    #[instrument(name = "mock_list_vehicles", skip(self))]
    async fn list_vehicles(&self) -> Result<String, ContractError> {
        self.record("vehicles", None, None);
        self.delay().await;

        let scripted = self.list_script.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(ContractError::http("vehicles", message)),
            None => self
                .list_default
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ContractError::http("vehicles", "no scripted response")),
        }
    }

    #[instrument(name = "mock_fetch_sub_state", skip(self, vehicle_id, kind), fields(kind = %kind))]
    async fn fetch_sub_state(
        &self,
        vehicle_id: &VehicleId,
        kind: AuxKind,
    ) -> Result<Value, ContractError> {
        self.record(kind.endpoint(), Some(vehicle_id), Some(kind));
        self.delay().await;

        let scripted = self
            .sub_state_script
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(message)) => Err(ContractError::http(kind.endpoint(), message)),
            None => self
                .sub_state_default
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .ok_or_else(|| ContractError::http(kind.endpoint(), "no scripted response")),
        }
    }
}

/// One vehicle list entry as the upstream sends it
pub fn vehicle_entry(id: &str, state: &str, token: Option<&str>) -> Value {
    json!({
        "id": id,
        "vehicle_id": id,
        "display_name": "Mock",
        "state": state,
        "tokens": token.map(|t| vec![t.to_string(), format!("{t}-2")]),
    })
}

/// `{"response": [...], "count": n}`
pub fn vehicle_list_body(entries: &[Value]) -> String {
    json!({ "response": entries, "count": entries.len() }).to_string()
}

/// Minimal payload that passes the sub-state schema check
pub fn sample_sub_state(kind: AuxKind) -> Value {
    match kind {
        AuxKind::Charge => json!({
            "charging_state": "Disconnected",
            "battery_level": 78,
            "battery_range": 201.5,
            "charge_limit_soc": 90,
        }),
        AuxKind::Climate => json!({
            "inside_temp": 21.5,
            "outside_temp": 14.0,
            "is_climate_on": false,
        }),
        AuxKind::Drive => json!({
            "native_type": "wgs",
            "shift_state": "D",
            "speed": 42,
            "latitude": 37.4925,
            "longitude": -121.9447,
        }),
        AuxKind::Vehicle => json!({
            "car_version": "2024.8.7",
            "locked": true,
            "odometer": 12345.6,
        }),
        AuxKind::Gui => json!({
            "gui_distance_units": "mi/hr",
            "gui_temperature_units": "C",
        }),
    }
}

/// Mock connection bookkeeping
struct MockConnection {
    id: ConnectionId,
    url: String,
    notices: NoticeSender,
    /// Taken by the feed task when one runs; drained lazily otherwise
    commands: Option<mpsc::UnboundedReceiver<ChannelCommand>>,
    sent: Vec<String>,
    close_requested: bool,
}

impl MockConnection {
    fn apply(&mut self, command: ChannelCommand) {
        match command {
            ChannelCommand::Send(text) => self.sent.push(text),
            ChannelCommand::Close => self.close_requested = true,
        }
    }

    fn drain(&mut self) {
        let Some(commands) = self.commands.as_mut() else {
            return;
        };
        let mut pending = Vec::new();
        while let Ok(command) = commands.try_recv() {
            pending.push(command);
        }
        for command in pending {
            self.apply(command);
        }
    }
}

/// Synthetic `data:update` feed
#[derive(Debug, Clone)]
struct MockFeed {
    /// CSV lines; the leading timestamp is replaced with the current time
    lines: Vec<String>,
    interval: Duration,
}

/// Mock stream transport
///
/// Without a feed nothing happens on its own: tests drive each connection
/// with [`MockTransport::emit`]. With a feed every connection opens
/// immediately, says hello and then plays the feed until closed.
pub struct MockTransport {
    connections: Arc<Mutex<Vec<MockConnection>>>,
    auto_open: bool,
    feed: Option<MockFeed>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(Vec::new())),
            auto_open: false,
            feed: None,
        }
    }

    /// Report `Open` as soon as a connection is requested
    pub fn with_auto_open(mut self) -> Self {
        self.auto_open = true;
        self
    }

    /// Play `lines` on every connection, one per `interval`
    ///
    /// Requires a tokio runtime when connections are opened.
    pub fn with_feed(mut self, lines: Vec<String>, interval: Duration) -> Self {
        self.auto_open = true;
        self.feed = Some(MockFeed { lines, interval });
        self
    }

    /// Feed of a car parked then driving off, in the default column order
    pub fn demo_feed() -> Vec<String> {
        [
            "0,,12345.6,78,12,270,37.4925,-121.9447,270,0,,201,195",
            "0,0,12345.6,78,12,270,37.4925,-121.9447,270,2,D,201,195",
            "0,12,12345.7,78,12,271,37.4927,-121.9446,271,18,D,200,194",
            "0,25,12345.8,77,13,272,37.4931,-121.9444,272,35,D,200,194",
            "0,31,12346.0,77,13,272,37.4936,-121.9441,272,22,D,199,193",
        ]
        .iter()
        .map(|line| line.to_string())
        .collect()
    }

    pub fn open_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// `(connection, url)` for every open call
    pub fn opens(&self) -> Vec<(ConnectionId, String)> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.id, c.url.clone()))
            .collect()
    }

    pub fn last_connection(&self) -> Option<ConnectionId> {
        self.connections.lock().unwrap().last().map(|c| c.id)
    }

    /// Text frames the owner sent on `connection`
    pub fn sent_messages(&self, connection: ConnectionId) -> Vec<String> {
        let mut connections = self.connections.lock().unwrap();
        connections
            .iter_mut()
            .find(|c| c.id == connection)
            .map(|c| {
                c.drain();
                c.sent.clone()
            })
            .unwrap_or_default()
    }

    /// Connections the owner asked to close
    pub fn close_requests(&self) -> Vec<ConnectionId> {
        let mut connections = self.connections.lock().unwrap();
        connections
            .iter_mut()
            .filter_map(|c| {
                c.drain();
                c.close_requested.then_some(c.id)
            })
            .collect()
    }

    /// Deliver `event` as if it came from the socket; false if unknown or the owner is gone
    pub fn emit(&self, connection: ConnectionId, event: ChannelEvent) -> bool {
        let connections = self.connections.lock().unwrap();
        connections
            .iter()
            .find(|c| c.id == connection)
            .is_some_and(|c| c.notices.send(ChannelNotice { connection, event }).is_ok())
    }

    /// Deliver a `data:update` carrying `line`
    pub fn emit_update(&self, connection: ConnectionId, line: &str) -> bool {
        self.emit(connection, ChannelEvent::Message(update_message(line)))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTransport for MockTransport {
    fn open(&self, url: &str, connection: ConnectionId, notices: NoticeSender) -> ChannelHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        debug!(connection, url, "Mock stream connection requested");

        if self.auto_open {
            let _ = notices.send(ChannelNotice {
                connection,
                event: ChannelEvent::Open,
            });
        }

        let (commands, feed_commands) = match &self.feed {
            Some(_) => (None, Some(cmd_rx)),
            None => (Some(cmd_rx), None),
        };

        self.connections.lock().unwrap().push(MockConnection {
            id: connection,
            url: url.to_string(),
            notices: notices.clone(),
            commands,
            sent: Vec::new(),
            close_requested: false,
        });

        if let (Some(feed), Some(cmd_rx)) = (&self.feed, feed_commands) {
            tokio::spawn(run_feed(
                self.connections.clone(),
                connection,
                notices,
                cmd_rx,
                feed.clone(),
            ));
        }

        ChannelHandle::new(connection, cmd_tx)
    }
}

fn update_message(line: &str) -> String {
    json!({ "msg_type": "data:update", "tag": "mock", "value": line }).to_string()
}

/// Replace the leading timestamp field with the current time
fn stamp(line: &str) -> String {
    let now = chrono::Utc::now().timestamp_millis();
    match line.split_once(',') {
        Some((_, rest)) => format!("{now},{rest}"),
        None => now.to_string(),
    }
}

async fn run_feed(
    connections: Arc<Mutex<Vec<MockConnection>>>,
    connection: ConnectionId,
    notices: NoticeSender,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
    feed: MockFeed,
) {
    let notify = |event: ChannelEvent| notices.send(ChannelNotice { connection, event }).is_ok();

    let hello = json!({ "msg_type": "control:hello", "connection_timeout": 30000 });
    if !notify(ChannelEvent::Message(hello.to_string())) {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + feed.interval, feed.interval);
    let mut next = 0usize;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    return;
                };
                let close = command == ChannelCommand::Close;
                if let Some(c) = connections.lock().unwrap().iter_mut().find(|c| c.id == connection) {
                    c.apply(command);
                }
                if close {
                    notify(ChannelEvent::Close {
                        code: Some(1000),
                        reason: "closed by client".into(),
                    });
                    return;
                }
            }
            _ = ticker.tick() => {
                if feed.lines.is_empty() {
                    continue;
                }
                let line = stamp(&feed.lines[next % feed.lines.len()]);
                next += 1;
                if !notify(ChannelEvent::Message(update_message(&line))) {
                    return;
                }
            }
        }
    }
}
