//! WebSocket upgrade handler and per-connection duplex loop (§4.C, §6).

pub mod protocol;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ids::new_session_id;
use crate::registry::{dispatch, RoomRegistry};
use crate::AppState;
use protocol::{InboundFrame, OutboundFrame};

/// Outbound mailbox capacity. A peer that can't drain this many frames is
/// treated as wedged and the non-volatile sender blocks on it (§5); it is
/// never grown unbounded.
///
/// Server-originated acks/mirrors (below) always write into this same
/// socket's own mailbox from within the task that is also the only reader
/// draining it. A blocking `.send().await` there would deadlock the
/// connection the instant the mailbox fills from other sessions' reliable
/// `broadcast`/`append_chat` fan-out, so these always use `try_send`
/// instead, matching the presence-frame pattern in `registry.rs`.
const OUTBOX_CAPACITY: usize = 64;

pub async fn socket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry))
}

async fn handle_socket(socket: WebSocket, registry: Arc<RoomRegistry>) {
    let session_id = new_session_id();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOX_CAPACITY);

    info!(session_id = %session_id, "socket connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(frame) = outbound else { break };
                if send_frame(&mut sink, &frame).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(&registry, &session_id, &tx, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // binary/ping/pong frames carry no protocol meaning here.
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "socket read error");
                        break;
                    }
                }
            }
        }
    }

    // §4.C: leave runs before any socket resource is released.
    registry.leave(&session_id);
    info!(session_id = %session_id, "socket disconnected");
}

async fn handle_text_frame(
    registry: &RoomRegistry,
    session_id: &str,
    self_outbox: &mpsc::Sender<OutboundFrame>,
    text: &str,
) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "malformed frame");
            let _ = self_outbox.try_send(OutboundFrame::ack_error("unknown", e.to_string()));
            return;
        }
    };
    let ack_id = frame.ack_id().map(str::to_string);

    let result = dispatch_inbound(registry, session_id, self_outbox, frame).await;

    if let Some(ack_id) = ack_id {
        let ack = match result {
            Ok(()) => OutboundFrame::ack(ack_id),
            Err(message) => OutboundFrame::ack_error(ack_id, message),
        };
        let _ = self_outbox.try_send(ack);
    }
}

async fn dispatch_inbound(
    registry: &RoomRegistry,
    session_id: &str,
    self_outbox: &mpsc::Sender<OutboundFrame>,
    frame: InboundFrame,
) -> Result<(), String> {
    match frame {
        InboundFrame::JoinRoom { room_id, .. } => {
            debug!(session_id = %session_id, %room_id, "join-room");
            registry.join(&room_id, session_id, self_outbox.clone());
            let _ = self_outbox.try_send(OutboundFrame::JoinRoomAck { room_id });
            Ok(())
        }
        InboundFrame::LeaveRoom { .. } => {
            registry.leave(session_id);
            Ok(())
        }
        InboundFrame::ServerBroadcast {
            room_id,
            payload,
            metadata,
            ..
        } => {
            let effects = registry
                .broadcast(session_id, payload, metadata, false)
                .map_err(|e| e.to_string())?;
            dispatch(effects).await;
            let _ = self_outbox.try_send(OutboundFrame::BroadcastAck { room_id });
            Ok(())
        }
        InboundFrame::ServerVolatileBroadcast {
            payload, metadata, ..
        } => {
            let effects = registry
                .broadcast(session_id, payload, metadata, true)
                .map_err(|e| e.to_string())?;
            dispatch(effects).await;
            Ok(())
        }
        InboundFrame::ServerChatMessage { id, content, .. } => {
            let (_message, effects) = registry
                .append_chat(session_id, id, content)
                .map_err(|e| e.to_string())?;
            dispatch(effects).await;
            Ok(())
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &OutboundFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("OutboundFrame always serializes");
    sink.send(Message::Text(text)).await
}
