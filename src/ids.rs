//! Id and timestamp helpers shared across the registry and persistence layers.

use std::sync::atomic::{AtomicU32, Ordering};

/// Current epoch time in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A new server-assigned session id, stable for the socket's lifetime.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

static SNAPSHOT_SEQ: AtomicU32 = AtomicU32::new(0);

/// A server-assigned snapshot id that is lexicographically sortable and
/// monotonically increasing even when several snapshots are created within
/// the same millisecond: `<16 hex digit millis><8 hex digit counter>`.
pub fn new_snapshot_id() -> String {
    let millis = now_millis().max(0) as u64;
    let seq = SNAPSHOT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{millis:016x}{seq:08x}")
}
