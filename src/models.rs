//! Data model shared by the registry, persistence backends, and HTTP surface.
//!
//! See `SPEC_FULL.md` §3 for the authoritative field-level contract.

use serde::{Deserialize, Serialize};

/// The sentinel `createdBy` value that marks a snapshot as the room's
/// singleton autosave row (§3, §4.A).
pub const AUTOSAVE_CREATED_BY: &str = "__autosave__";

pub const DEFAULT_MAX_SNAPSHOTS: u32 = 10;
pub const MIN_MAX_SNAPSHOTS: u32 = 1;
pub const DEFAULT_AUTO_SAVE_INTERVAL: u32 = 300;
pub const MIN_AUTO_SAVE_INTERVAL: u32 = 60;
pub const CHAT_HISTORY_CAP: usize = 1000;

/// One chat message appended to a room's bounded history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
}

/// A room as seen from `GET /api/rooms`: a snapshot-in-time view of the
/// registry, not a persisted row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub users: usize,
    pub last_active: i64,
}

/// Snapshot metadata common to both the list view and the full record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMeta {
    pub id: String,
    pub room_id: String,
    pub name: String,
    pub description: String,
    pub thumbnail: String,
    pub created_by: String,
    pub created_at: i64,
}

impl SnapshotMeta {
    pub fn is_autosave(&self) -> bool {
        self.created_by == AUTOSAVE_CREATED_BY
    }
}

/// A full snapshot row including the opaque scene payload. Never produced by
/// `ListSnapshots` — only by `GetSnapshot`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRecord {
    #[serde(flatten)]
    pub meta: SnapshotMeta,
    /// Opaque scene payload, base64-encoded on the wire.
    pub data: Vec<u8>,
}

/// Input to `CreateSnapshot` / `UpsertAutosaveSnapshot`: everything the
/// caller supplies, before the backend assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub room_id: String,
    pub name: String,
    pub description: String,
    pub thumbnail: String,
    pub created_by: String,
    pub data: Vec<u8>,
}

/// Per-room snapshot and autosave tuning (§3 RoomSettings).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSettings {
    pub max_snapshots: u32,
    pub auto_save_interval: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            auto_save_interval: DEFAULT_AUTO_SAVE_INTERVAL,
        }
    }
}

impl RoomSettings {
    /// Clamp caller-supplied values, replacing anything below the documented
    /// minimum with the default rather than rejecting the request (§3).
    pub fn clamped(max_snapshots: u32, auto_save_interval: u32) -> Self {
        Self {
            max_snapshots: if max_snapshots < MIN_MAX_SNAPSHOTS {
                DEFAULT_MAX_SNAPSHOTS
            } else {
                max_snapshots
            },
            auto_save_interval: if auto_save_interval < MIN_AUTO_SAVE_INTERVAL {
                DEFAULT_AUTO_SAVE_INTERVAL
            } else {
                auto_save_interval
            },
        }
    }
}

/// Legacy anonymous document share. No HTTP route exposes this in the core;
/// it exists only because the three backends share one storage surface (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_clamp_to_defaults_below_minimum() {
        let s = RoomSettings::clamped(0, 1);
        assert_eq!(s, RoomSettings::default());
    }

    #[test]
    fn settings_keep_valid_values() {
        let s = RoomSettings::clamped(3, 120);
        assert_eq!(s.max_snapshots, 3);
        assert_eq!(s.auto_save_interval, 120);
    }

    #[test]
    fn autosave_detection() {
        let meta = SnapshotMeta {
            id: "1".into(),
            room_id: "r".into(),
            name: "".into(),
            description: "".into(),
            thumbnail: "".into(),
            created_by: AUTOSAVE_CREATED_BY.into(),
            created_at: 0,
        };
        assert!(meta.is_autosave());
    }
}
