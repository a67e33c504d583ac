//! StreamTransport trait - persistent streaming channel abstraction
//!
//! A transport turns one `open` call into a background connection that
//! reports its lifecycle as `ChannelNotice`s and accepts `ChannelCommand`s.
//! Every notice is tagged with the connection id it belongs to, so the
//! owner can ignore late events from a connection it already dropped.

use tokio::sync::mpsc;

/// Monotonic id assigned by the owner for each `open` call
pub type ConnectionId = u64;

/// Socket lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection established
    Open,
    /// Text message received
    Message(String),
    /// Connection closed (by either side)
    Close { code: Option<u16>, reason: String },
    /// Transport failure; no further events follow for this connection
    Error(String),
}

/// Event tagged with its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNotice {
    pub connection: ConnectionId,
    pub event: ChannelEvent,
}

/// Sender side the transport reports notices on
pub type NoticeSender = mpsc::UnboundedSender<ChannelNotice>;

/// Command from the owner to an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    Send(String),
    Close,
}

/// Owner's handle on one connection
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    connection: ConnectionId,
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    pub fn new(connection: ConnectionId, commands: mpsc::UnboundedSender<ChannelCommand>) -> Self {
        Self {
            connection,
            commands,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Queue a text frame; false if the connection task is gone
    pub fn send(&self, text: String) -> bool {
        self.commands.send(ChannelCommand::Send(text)).is_ok()
    }

    /// Ask the connection to close; the close itself is reported as a notice
    pub fn close(&self) -> bool {
        self.commands.send(ChannelCommand::Close).is_ok()
    }
}

/// Streaming transport
pub trait StreamTransport: Send + Sync + 'static {
    /// Start connecting to `url` in the background
    ///
    /// Must not block. All outcomes, including connect failures, are
    /// reported through `notices` tagged with `connection`.
    fn open(&self, url: &str, connection: ConnectionId, notices: NoticeSender) -> ChannelHandle;
}
