//! The in-memory room registry: who is in which room, and the bounded
//! mailbox used to reach each of them (§4.B, §5).
//!
//! `rooms` and `session_room` are guarded by one lock so that "which room is
//! this session in" and "who else is in that room" can never be observed out
//! of sync with each other. Presence frames (join/leave fan-out) are pushed
//! onto each peer's mailbox with `try_send` while the lock is still held, so
//! a joiner's `chat-history`/`first-in-room` frame is queued before any
//! later broadcast for that room can reach it (§9). `Broadcast` and
//! `AppendChat` carry real traffic and apply true backpressure instead, so
//! they return [`Effect`]s the caller sends after the lock is released.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::gateway::protocol::OutboundFrame;
use crate::ids::now_millis;
use crate::models::{ChatMessage, RoomSummary, CHAT_HISTORY_CAP};

/// Outbound mailbox for one connected socket. Bounded so a non-volatile send
/// can apply real backpressure instead of growing without limit (§5).
pub type Outbox = mpsc::Sender<OutboundFrame>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session {0} is not a member of room {1}")]
    NotAMember(String, String),
}

/// One unit of work the caller must perform outside the registry's lock.
pub struct Effect {
    pub session_id: String,
    pub outbox: Outbox,
    pub frame: OutboundFrame,
    /// Volatile effects should be sent with `try_send` (drop-on-full);
    /// non-volatile ones with `.send().await` (true backpressure) (§5).
    pub volatile: bool,
}

impl Effect {
    fn reliable(session_id: &str, outbox: &Outbox, frame: OutboundFrame) -> Self {
        Self {
            session_id: session_id.to_string(),
            outbox: outbox.clone(),
            frame,
            volatile: false,
        }
    }

    fn volatile(session_id: &str, outbox: &Outbox, frame: OutboundFrame) -> Self {
        Self {
            session_id: session_id.to_string(),
            outbox: outbox.clone(),
            frame,
            volatile: true,
        }
    }
}

/// Send every effect the registry handed back, honoring each one's
/// backpressure policy. Effects for different sessions proceed
/// concurrently so one wedged peer can't delay another's fan-out.
pub async fn dispatch(effects: Vec<Effect>) {
    use futures_util::stream::{FuturesUnordered, StreamExt};

    let mut sends = FuturesUnordered::new();
    for effect in effects {
        sends.push(async move {
            if effect.volatile {
                let _ = effect.outbox.try_send(effect.frame);
            } else {
                let _ = effect.outbox.send(effect.frame).await;
            }
        });
    }
    while sends.next().await.is_some() {}
}

struct Member {
    outbox: Outbox,
}

struct Room {
    members: HashMap<String, Member>,
    chat_history: VecDeque<ChatMessage>,
    last_active: i64,
}

impl Room {
    fn new() -> Self {
        Self {
            members: HashMap::new(),
            chat_history: VecDeque::new(),
            last_active: now_millis(),
        }
    }

    fn member_ids_sorted(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[derive(Default)]
struct State {
    rooms: HashMap<String, Room>,
    /// Invariant #1 (§8): a session is a member of at most one room.
    session_room: HashMap<String, String>,
}

impl State {
    /// Remove `session_id` from its current room, if any, pushing the
    /// updated roster (or none, if the room is now empty) to whoever is
    /// left. Used both by the public `leave` operation and by `join`'s
    /// implicit-leave-on-rejoin rule (§4.B, §9 open question).
    fn leave_locked(&mut self, session_id: &str) {
        let Some(room_id) = self.session_room.remove(session_id) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        room.members.remove(session_id);
        room.last_active = now_millis();

        if room.members.is_empty() {
            self.rooms.remove(&room_id);
            return;
        }

        let roster = room.member_ids_sorted();
        for member in room.members.values() {
            let _ = member
                .outbox
                .try_send(OutboundFrame::RoomUserChange {
                    socket_ids: roster.clone(),
                })
                .map_err(|_| warn!(%room_id, "presence mailbox full, dropping room-user-change"));
        }
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    state: RwLock<State>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session_id` to `room_id`, implicitly leaving any room it was
    /// already a member of first (§4.B, §9). Presence frames for the
    /// joiner and the room's existing members are enqueued synchronously
    /// while the lock is held, guaranteeing they precede any broadcast the
    /// joiner or its new peers later see for this room.
    pub fn join(&self, room_id: &str, session_id: &str, outbox: Outbox) {
        let mut state = self.state.write().unwrap();

        if state.session_room.get(session_id).is_some_and(|r| r != room_id) {
            state.leave_locked(session_id);
        }

        let room = state
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(Room::new);
        room.last_active = now_millis();

        let was_empty = room.members.is_empty();
        room.members.insert(
            session_id.to_string(),
            Member {
                outbox: outbox.clone(),
            },
        );
        state.session_room.insert(session_id.to_string(), room_id.to_string());
        let room = state.rooms.get_mut(room_id).expect("just inserted");

        if was_empty {
            let _ = outbox.try_send(OutboundFrame::FirstInRoom);
        } else {
            for (id, member) in &room.members {
                if id != session_id {
                    let _ = member.outbox.try_send(OutboundFrame::NewUser {
                        socket_id: session_id.to_string(),
                    });
                }
            }
        }

        let _ = outbox.try_send(OutboundFrame::ChatHistory {
            room_id: room_id.to_string(),
            messages: room.chat_history.iter().cloned().collect(),
        });

        let roster = room.member_ids_sorted();
        for member in room.members.values() {
            let _ = member.outbox.try_send(OutboundFrame::RoomUserChange {
                socket_ids: roster.clone(),
            });
        }
    }

    /// Remove `session_id` from whatever room it is in, if any.
    pub fn leave(&self, session_id: &str) {
        self.state.write().unwrap().leave_locked(session_id);
    }

    /// Relay a scene-update broadcast to every other member of the room.
    /// `volatile` selects drop-on-full vs. true-backpressure delivery (§5).
    /// The server attaches `userId` to the caller-supplied `metadata`
    /// object so recipients can attribute the payload (§6).
    pub fn broadcast(
        &self,
        sender_session_id: &str,
        payload: serde_json::Value,
        metadata: serde_json::Value,
        volatile: bool,
    ) -> Result<Vec<Effect>, RegistryError> {
        let state = self.state.read().unwrap();
        let room_id = state
            .session_room
            .get(sender_session_id)
            .ok_or_else(|| RegistryError::NotAMember(sender_session_id.to_string(), "<none>".to_string()))?;
        let room = state.rooms.get(room_id).expect("session_room is kept in sync");

        let metadata = attach_user_id(metadata, sender_session_id);
        let frame = OutboundFrame::ClientBroadcast { payload, metadata };
        Ok(room
            .members
            .iter()
            .filter(|(id, _)| id.as_str() != sender_session_id)
            .map(|(id, member)| {
                if volatile {
                    Effect::volatile(id, &member.outbox, frame.clone())
                } else {
                    Effect::reliable(id, &member.outbox, frame.clone())
                }
            })
            .collect())
    }

    /// Append a chat message to the room's bounded history and relay it to
    /// every current member, including the sender (§4.B).
    pub fn append_chat(
        &self,
        sender_session_id: &str,
        client_id: String,
        content: String,
    ) -> Result<(ChatMessage, Vec<Effect>), RegistryError> {
        let mut state = self.state.write().unwrap();
        let room_id = state
            .session_room
            .get(sender_session_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotAMember(sender_session_id.to_string(), "<none>".to_string()))?;
        let room = state
            .rooms
            .get_mut(&room_id)
            .expect("session_room is kept in sync");

        let message = ChatMessage {
            id: client_id,
            room_id: room_id.clone(),
            sender: sender_session_id.to_string(),
            content,
            timestamp: now_millis(),
        };
        room.chat_history.push_back(message.clone());
        while room.chat_history.len() > CHAT_HISTORY_CAP {
            room.chat_history.pop_front();
        }
        room.last_active = now_millis();

        let effects = room
            .members
            .iter()
            .map(|(id, member)| {
                Effect::reliable(
                    id,
                    &member.outbox,
                    OutboundFrame::ClientChatMessage {
                        message: message.clone(),
                    },
                )
            })
            .collect();
        Ok((message, effects))
    }

    /// A snapshot of every currently non-empty room (`GET /api/rooms`, §4.D),
    /// sorted by user count desc, then last-active desc, then id asc (§4.B).
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let state = self.state.read().unwrap();
        let mut rooms: Vec<RoomSummary> = state
            .rooms
            .iter()
            .map(|(id, room)| RoomSummary {
                id: id.clone(),
                users: room.members.len(),
                last_active: room.last_active,
            })
            .collect();
        rooms.sort_by(|a, b| {
            b.users
                .cmp(&a.users)
                .then(b.last_active.cmp(&a.last_active))
                .then(a.id.cmp(&b.id))
        });
        rooms
    }

    /// Forcibly clear a room's membership, notifying every member that the
    /// room is now empty (§4.B `EvictRoom`). Does not touch persisted
    /// snapshots — that is the caller's job via the storage backend.
    pub fn evict_room(&self, room_id: &str) {
        let mut state = self.state.write().unwrap();
        let Some(room) = state.rooms.remove(room_id) else {
            return;
        };
        for (session_id, member) in &room.members {
            state.session_room.remove(session_id);
            let _ = member.outbox.try_send(OutboundFrame::RoomUserChange { socket_ids: Vec::new() });
        }
    }

    /// Evict every room, notifying every currently joined session. Used on
    /// graceful shutdown so no socket is left believing it's still in a room
    /// whose server process is about to exit (§4.E).
    pub fn drain(&self) {
        let room_ids: Vec<String> = {
            let state = self.state.read().unwrap();
            state.rooms.keys().cloned().collect()
        };
        for room_id in room_ids {
            self.evict_room(&room_id);
        }
    }
}

/// Attach the server-assigned sender id to a client-supplied opaque
/// metadata value without inspecting the rest of it (§6, §9). Non-object
/// metadata is preserved under `value` rather than discarded.
fn attach_user_id(metadata: serde_json::Value, user_id: &str) -> serde_json::Value {
    use serde_json::Value;
    match metadata {
        Value::Object(mut map) => {
            map.insert("userId".to_string(), Value::String(user_id.to_string()));
            Value::Object(map)
        }
        Value::Null => {
            let mut map = serde_json::Map::new();
            map.insert("userId".to_string(), Value::String(user_id.to_string()));
            Value::Object(map)
        }
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map.insert("userId".to_string(), Value::String(user_id.to_string()));
            Value::Object(map)
        }
    }
}
