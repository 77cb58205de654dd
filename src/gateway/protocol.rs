//! Wire format for the `GET /socket` connection: a named-event JSON
//! envelope per frame, with an optional client-supplied `ackId` that the
//! server echoes back in an `ack` frame (§4.C).
//!
//! `payload`/`metadata` on broadcast frames are opaque JSON the server
//! round-trips without inspecting (§9) — only the envelope around them is
//! typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::ChatMessage;

/// A frame sent by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum InboundFrame {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        ack_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        room_id: String,
        ack_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ServerBroadcast {
        room_id: String,
        payload: Value,
        #[serde(default)]
        metadata: Value,
        ack_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ServerVolatileBroadcast {
        room_id: String,
        payload: Value,
        #[serde(default)]
        metadata: Value,
        ack_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ServerChatMessage {
        room_id: String,
        id: String,
        content: String,
        ack_id: Option<String>,
    },
}

impl InboundFrame {
    pub fn ack_id(&self) -> Option<&str> {
        match self {
            Self::JoinRoom { ack_id, .. }
            | Self::LeaveRoom { ack_id, .. }
            | Self::ServerBroadcast { ack_id, .. }
            | Self::ServerVolatileBroadcast { ack_id, .. }
            | Self::ServerChatMessage { ack_id, .. } => ack_id.as_deref(),
        }
    }
}

/// Status carried by an `ack` frame.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// A frame sent by the server, either to the socket that caused it or
/// fanned out to other members of a room.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OutboundFrame {
    /// Sent to a joining socket when it is the only member of the room.
    FirstInRoom,

    /// Sent to the pre-existing members of a room when someone joins.
    #[serde(rename_all = "camelCase")]
    NewUser { socket_id: String },

    /// Full member roster, sent to every member after membership changes.
    #[serde(rename_all = "camelCase")]
    RoomUserChange { socket_ids: Vec<String> },

    /// Sent to a joining socket: the room's retained chat backlog.
    #[serde(rename_all = "camelCase")]
    ChatHistory {
        room_id: String,
        messages: Vec<ChatMessage>,
    },

    /// Relays someone else's `server-broadcast` / `server-volatile-broadcast`.
    /// `metadata` always carries the sender's session id under `userId`.
    ClientBroadcast { payload: Value, metadata: Value },

    /// Relays a `server-chat-message`, including back to its own sender.
    ClientChatMessage { message: ChatMessage },

    /// Correlates to an inbound frame's `ackId`.
    #[serde(rename_all = "camelCase")]
    Ack {
        ack_id: String,
        status: AckStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Event-mirror ack for `join-room`, for clients that don't correlate
    /// via `ackId` (§4.C, §9).
    #[serde(rename_all = "camelCase")]
    JoinRoomAck { room_id: String },

    /// Event-mirror ack for a broadcast, mirroring `JoinRoomAck`.
    #[serde(rename_all = "camelCase")]
    BroadcastAck { room_id: String },
}

impl OutboundFrame {
    pub fn ack(ack_id: impl Into<String>) -> Self {
        Self::Ack {
            ack_id: ack_id.into(),
            status: AckStatus::Ok,
            error: None,
        }
    }

    pub fn ack_error(ack_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ack {
            ack_id: ack_id.into(),
            status: AckStatus::Error,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_join_room_parses_camel_case_fields() {
        let raw = r#"{"event":"join-room","roomId":"r1","ackId":"a1"}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        match frame {
            InboundFrame::JoinRoom { room_id, ack_id } => {
                assert_eq!(room_id, "r1");
                assert_eq!(ack_id.as_deref(), Some("a1"));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn inbound_broadcast_defaults_metadata_when_absent() {
        let raw = r#"{"event":"server-broadcast","roomId":"r1","payload":{"x":1}}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        match frame {
            InboundFrame::ServerBroadcast { metadata, .. } => assert_eq!(metadata, Value::Null),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn outbound_new_user_serializes_kebab_event_camel_fields() {
        let frame = OutboundFrame::NewUser {
            socket_id: "abc".into(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"event\":\"new-user\""));
        assert!(json.contains("\"socketId\":\"abc\""));
    }

    #[test]
    fn client_broadcast_round_trips_opaque_payload() {
        let frame = OutboundFrame::ClientBroadcast {
            payload: json!({"elements": [1, 2, 3]}),
            metadata: json!({"userId": "s1"}),
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"elements\""));
        assert!(text.contains("\"userId\":\"s1\""));
    }

    #[test]
    fn ack_error_omits_error_field_when_absent() {
        let ok = OutboundFrame::ack("a1");
        let json = serde_json::to_string(&ok).unwrap();
        assert!(!json.contains("error"));
    }
}
