//! Client pumps: one reader flow, one writer flow per connection.
//!
//! Both are free functions rather than methods on a `Client` struct, because
//! once registered a client's state lives entirely inside the room's
//! `RoomMember` — the room is the sole owner of the client's lifecycle once
//! registered, and the client's back-reference is a pure lookup handle.
//! These pumps only ever touch the room through its bounded command channel.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::error::CoreError;
use crate::room::RoomCommand;
use crate::shutdown::Shutdown;

/// Outbound queue capacity: large enough to absorb a room-state
/// snapshot plus a short chat burst without dropping, small enough to bound
/// per-client memory for a stuck consumer.
pub const OUTBOUND_QUEUE_CAP: usize = 256;

/// Consumes the outbound queue and writes each message to the transport.
/// Ends, and closes the transport, when the queue is closed (client was
/// torn down) or a write fails.
pub async fn run_writer(
    mut ws_tx: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = ws_tx.send(message).await {
            tracing::debug!(error = %e, "writer pump: send failed, closing transport");
            break;
        }
    }
    let _ = ws_tx.close().await;
}

/// Reads one message at a time from the transport and submits each decoded
/// event to the room's bounded command channel. Unregisters on transport
/// close/error; a stuck room (full command channel) causes the event to be
/// dropped rather than stalling the transport. Also races each read
/// against the process-wide shutdown signal so a connection doesn't block
/// the graceful-shutdown drain deadline on an idle client.
pub async fn run_reader(
    client_id: String,
    mut ws_rx: futures_util::stream::SplitStream<WebSocket>,
    room_tx: mpsc::Sender<RoomCommand>,
    mut shutdown: Shutdown,
) {
    loop {
        let result = tokio::select! {
            result = ws_rx.next() => result,
            _ = shutdown.async_listen() => {
                tracing::debug!(client = %client_id, "reader pump: shutdown signal received");
                break;
            }
        };

        let Some(result) = result else { break };
        let message = match result {
            Ok(m) => m,
            Err(e) => {
                let err = CoreError::Transport(e.to_string());
                tracing::debug!(client = %client_id, error = %err, "reader pump: transport error");
                break;
            }
        };

        if message.is_close() {
            break;
        }
        if !message.is_text() {
            continue;
        }
        let text = message.to_str().unwrap_or_default();

        match serde_json::from_str(text) {
            Ok(event) => {
                if room_tx
                    .try_send(RoomCommand::Event {
                        client_id: client_id.clone(),
                        event,
                    })
                    .is_err()
                {
                    tracing::warn!(client = %client_id, "room command channel full, dropping inbound event");
                }
            }
            Err(e) => {
                let err = CoreError::Payload {
                    event: "unknown".to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(client = %client_id, error = %err, "dropping inbound message");
            }
        }
    }

    // Idempotent: the room silently ignores an unregister for an id it no
    // longer holds (e.g. already dropped as a slow consumer).
    let _ = room_tx.try_send(RoomCommand::Unregister {
        client_id: client_id.clone(),
    });
}
