//! Websocket stream transport
//!
//! One background task per `open` call. The task connects, reports `Open`,
//! then multiplexes owner commands with inbound frames until either side
//! closes. Connect failures are reported as `Error` on the notice channel.

use contracts::{
    ChannelCommand, ChannelEvent, ChannelHandle, ChannelNotice, ConnectionId, NoticeSender,
    StreamTransport,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Websocket transport backed by `tokio-tungstenite`
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl StreamTransport for WebSocketTransport {
    fn open(&self, url: &str, connection: ConnectionId, notices: NoticeSender) -> ChannelHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(url.to_string(), connection, notices, cmd_rx));
        ChannelHandle::new(connection, cmd_tx)
    }
}

async fn run_connection(
    url: String,
    connection: ConnectionId,
    notices: NoticeSender,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
) {
    let notify = |event: ChannelEvent| {
        // Owner gone means nobody cares about this connection any more
        let _ = notices.send(ChannelNotice { connection, event });
    };

    let socket = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((socket, response)) => {
            debug!(connection, status = %response.status(), "Websocket connected");
            socket
        }
        Err(e) => {
            warn!(connection, url = %url, error = %e, "Websocket connect failed");
            notify(ChannelEvent::Error(e.to_string()));
            return;
        }
    };
    notify(ChannelEvent::Open);

    let (mut write, mut read) = socket.split();
    let mut closing = false;

    loop {
        tokio::select! {
            command = commands.recv(), if !closing => match command {
                Some(ChannelCommand::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        notify(ChannelEvent::Error(e.to_string()));
                        return;
                    }
                }
                Some(ChannelCommand::Close) | None => {
                    // Wait for the peer's close frame, which ends the loop below
                    closing = true;
                    if let Err(e) = write.send(Message::Close(None)).await {
                        notify(ChannelEvent::Error(e.to_string()));
                        return;
                    }
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => notify(ChannelEvent::Message(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => notify(ChannelEvent::Message(text)),
                    Err(_) => debug!(connection, len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    notify(ChannelEvent::Close { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    notify(ChannelEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    notify(ChannelEvent::Close {
                        code: None,
                        reason: "stream ended".into(),
                    });
                    return;
                }
            },
        }
    }
}
