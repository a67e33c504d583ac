//! Persistent streaming session
//!
//! `Closed -> Connecting -> Subscribed -> Closed`. At most one channel is
//! live at a time; a connect request while one exists is a no-op. A dropped
//! channel is reopened straight away while a token is known and polling is
//! wanted. Notices from connections other than the current one are ignored.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use contracts::{
    ChannelEvent, ChannelHandle, ChannelNotice, ConnectionId, NoticeSender, StreamTransport,
    TelemetryFrame, VehicleHandle, VehicleId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decode::LineDecoder;
use crate::state::AcquisitionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Closed,
    Connecting,
    Subscribed,
}

/// Subscribe control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeMessage {
    pub msg_type: String,
    /// base64 of `<email>:<stream token>`
    pub token: String,
    /// Comma separated column list
    pub value: String,
    /// Vehicle id
    pub tag: String,
}

impl SubscribeMessage {
    pub fn new(email: &str, stream_token: &str, columns: &[String], vehicle_id: &VehicleId) -> Self {
        Self {
            msg_type: "data:subscribe".to_string(),
            token: STANDARD.encode(format!("{email}:{stream_token}")),
            value: columns.join(","),
            tag: vehicle_id.to_string(),
        }
    }
}

/// Inbound envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    msg_type: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Opened(ConnectionId),
    AlreadyOpen,
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeOutcome {
    /// Notice from a connection that is no longer current
    Stale,
    Subscribed,
    Hello,
    /// Decoded `data:update`
    Update { raw: String, frame: TelemetryFrame },
    /// `data:error`; the channel has been asked to close
    ServerError(String),
    /// Channel gone; `reconnected` is the replacement connection, if any
    Dropped { reconnected: Option<ConnectionId> },
    /// Unknown or unparseable message, logged only
    Ignored,
}

pub struct StreamSession<T: StreamTransport> {
    transport: Arc<T>,
    url: String,
    email: String,
    decoder: LineDecoder,
    notices: NoticeSender,
    channel: Option<ChannelHandle>,
    phase: StreamPhase,
    next_connection: ConnectionId,
    last_token: Option<String>,
    vehicle_id: Option<VehicleId>,
    polling: bool,
}

impl<T: StreamTransport> StreamSession<T> {
    pub fn new(
        transport: Arc<T>,
        url: impl Into<String>,
        email: impl Into<String>,
        columns: Vec<String>,
        notices: NoticeSender,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            email: email.into(),
            decoder: LineDecoder::new(columns),
            notices,
            channel: None,
            phase: StreamPhase::Closed,
            next_connection: 1,
            last_token: None,
            vehicle_id: None,
            polling: false,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Current connection id, if a channel exists
    pub fn connection(&self) -> Option<ConnectionId> {
        self.channel.as_ref().map(ChannelHandle::connection)
    }

    pub fn last_token(&self) -> Option<&str> {
        self.last_token.as_deref()
    }

    /// Make sure a channel exists for the ready vehicle
    ///
    /// A rotated token is remembered and used at the next (re)connect; a live
    /// channel is not torn down for it.
    pub fn connect(&mut self, st: &mut AcquisitionState, handle: &VehicleHandle) -> ConnectOutcome {
        if !st.stream_guard.enter() {
            return ConnectOutcome::Busy;
        }

        self.polling = true;
        if self.last_token.as_deref() != Some(handle.stream_token.as_str()) {
            if self.last_token.is_some() {
                info!(vehicle_id = %handle.id, "Stream token changed");
            }
            self.last_token = Some(handle.stream_token.clone());
        }
        self.vehicle_id = Some(handle.id.clone());

        let outcome = if self.channel.is_some() {
            debug!(connection = ?self.connection(), "Stream channel already open");
            ConnectOutcome::AlreadyOpen
        } else {
            ConnectOutcome::Opened(self.open())
        };

        st.stream_guard.exit();
        outcome
    }

    /// Stop polling and close the current channel without reconnecting
    pub fn stop(&mut self) {
        self.polling = false;
        if let Some(channel) = self.channel.take() {
            info!(connection = channel.connection(), "Closing stream channel");
            channel.close();
        }
        self.phase = StreamPhase::Closed;
    }

    pub fn handle_notice(&mut self, notice: ChannelNotice) -> NoticeOutcome {
        if self.connection() != Some(notice.connection) {
            debug!(
                connection = notice.connection,
                current = ?self.connection(),
                event = ?notice.event,
                "Ignoring event from stale stream connection"
            );
            return NoticeOutcome::Stale;
        }

        match notice.event {
            ChannelEvent::Open => self.on_open(notice.connection),
            ChannelEvent::Message(text) => self.on_message(&text),
            ChannelEvent::Close { code, reason } => {
                info!(connection = notice.connection, code = ?code, reason = %reason, "Stream channel closed");
                self.on_dropped()
            }
            ChannelEvent::Error(error) => {
                warn!(connection = notice.connection, error = %error, "Stream channel error");
                self.on_dropped()
            }
        }
    }

    fn open(&mut self) -> ConnectionId {
        let connection = self.next_connection;
        self.next_connection += 1;

        info!(
            connection,
            url = %self.url,
            vehicle_id = ?self.vehicle_id.as_ref().map(VehicleId::as_str),
            "Opening stream channel"
        );
        self.channel = Some(self.transport.open(&self.url, connection, self.notices.clone()));
        self.phase = StreamPhase::Connecting;
        connection
    }

    fn on_open(&mut self, connection: ConnectionId) -> NoticeOutcome {
        let (Some(token), Some(vehicle_id), Some(channel)) =
            (&self.last_token, &self.vehicle_id, &self.channel)
        else {
            return NoticeOutcome::Ignored;
        };

        let subscribe = SubscribeMessage::new(&self.email, token, self.decoder.columns(), vehicle_id);
        match serde_json::to_string(&subscribe) {
            Ok(text) => {
                if !channel.send(text) {
                    warn!(connection, "Stream channel task is gone, subscribe not sent");
                }
            }
            Err(e) => warn!(connection, error = %e, "Failed to encode subscribe message"),
        }

        debug!(connection, columns = %subscribe.value, "Subscribed to stream");
        self.phase = StreamPhase::Subscribed;
        NoticeOutcome::Subscribed
    }

    fn on_message(&mut self, text: &str) -> NoticeOutcome {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, message = %text, "Unparseable stream message");
                return NoticeOutcome::Ignored;
            }
        };

        match envelope.msg_type.as_str() {
            "control:hello" => NoticeOutcome::Hello,
            "data:error" => {
                let error_type = envelope.error_type.unwrap_or_default();
                warn!(error_type = %error_type, "Stream data error, closing channel");
                if let Some(channel) = &self.channel {
                    channel.close();
                }
                NoticeOutcome::ServerError(error_type)
            }
            "data:update" => {
                let Some(raw) = envelope.value else {
                    warn!("Stream update without a value");
                    return NoticeOutcome::Ignored;
                };
                debug!(line = %raw, "Stream update");
                let frame = self.decoder.decode(&raw);
                NoticeOutcome::Update { raw, frame }
            }
            other => {
                info!(msg_type = other, message = %text, "Unhandled stream message");
                NoticeOutcome::Ignored
            }
        }
    }

    fn on_dropped(&mut self) -> NoticeOutcome {
        self.channel = None;
        self.phase = StreamPhase::Closed;

        let reconnected = (self.polling && self.last_token.is_some()).then(|| self.open());
        NoticeOutcome::Dropped { reconnected }
    }
}
