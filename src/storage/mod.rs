//! Persistence abstraction for snapshots, room settings, and legacy
//! documents (§3, §4.A).
//!
//! All three backends implement [`Backend`] with synchronous methods: no
//! `.await` inside an implementation. Callers that may block on real I/O
//! (filesystem, SQLite) are expected to run the call through
//! `tokio::task::spawn_blocking` — see [`blocking`] — so a slow disk never
//! stalls the async runtime's worker threads, and so the room registry's
//! locks are never held across a backend call (§5).

mod error;
mod filesystem;
mod memory;
mod sqlite;

pub use error::StorageError;
pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::sync::Arc;

use crate::models::{Document, NewSnapshot, RoomSettings, SnapshotMeta, SnapshotRecord};

/// Object-safe persistence contract. Implementations must be `Send + Sync`
/// so a single instance can be shared (via [`SharedBackend`]) across every
/// HTTP handler and socket session.
pub trait Backend: Send + Sync + 'static {
    /// Insert a new non-autosave snapshot, evicting the oldest one first if
    /// the room is already at `RoomSettings.max_snapshots` (§4.A).
    fn create_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError>;

    /// Atomically replace or create the room's singleton autosave snapshot.
    /// Never counts against `max_snapshots`.
    fn upsert_autosave_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError>;

    /// Metadata-only listing, newest first (`created_at` DESC, `id` DESC).
    /// Empty room returns `Ok(vec![])`, never `NotFound`.
    fn list_snapshots(&self, room_id: &str) -> Result<Vec<SnapshotMeta>, StorageError>;

    /// Full row including `data`. `NotFound` if absent.
    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord, StorageError>;

    /// Remove a snapshot. `NotFound` if absent.
    fn delete_snapshot(&self, id: &str) -> Result<(), StorageError>;

    /// Update `name`/`description` in place. `data`, `thumbnail`, and
    /// `created_at` are left untouched. `NotFound` if absent.
    fn update_snapshot_metadata(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<(), StorageError>;

    /// Returns defaults when no settings row exists. Never `NotFound`.
    fn get_room_settings(&self, room_id: &str) -> Result<RoomSettings, StorageError>;

    /// Upsert, clamping out-of-range values to the defaults before storing.
    fn update_room_settings(
        &self,
        room_id: &str,
        settings: RoomSettings,
    ) -> Result<(), StorageError>;

    /// Remove every snapshot and the settings row for `room_id`. Idempotent:
    /// deleting an already-absent room succeeds.
    fn delete_room(&self, room_id: &str) -> Result<(), StorageError>;

    /// Shared-surface only (§3): store a legacy anonymous document. No HTTP
    /// route in the core exercises this.
    fn put_document(&self, id: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Shared-surface only (§3): fetch a legacy anonymous document.
    fn get_document(&self, id: &str) -> Result<Document, StorageError>;

    /// Flush any buffered writes to durable storage, called once on
    /// graceful shutdown (§4.E). A no-op for backends with nothing to
    /// flush; `SqliteBackend` overrides this to checkpoint its WAL.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A backend shared across the HTTP surface and socket gateway.
pub type SharedBackend = Arc<dyn Backend>;

/// Run a (potentially blocking) backend call on the blocking thread pool.
///
/// `MemoryBackend` never blocks, but routing every backend call through this
/// helper keeps the HTTP handlers backend-agnostic and matches the
/// filesystem/SQLite backends' actual need for it.
pub async fn blocking<F, T>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(join_err) => Err(StorageError::Io(format!(
            "backend task panicked: {join_err}"
        ))),
    }
}

/// Oldest-first tie-break used by the cap-enforcement eviction rule: smallest
/// `created_at`, then smallest `id` (§4.A).
pub(crate) fn oldest_non_autosave(snapshots: &[SnapshotMeta]) -> Option<&SnapshotMeta> {
    snapshots
        .iter()
        .filter(|s| !s.is_autosave())
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

/// Listing sort order shared by all three backends: `created_at` DESC, tie
/// break `id` DESC (§4.A).
pub(crate) fn sort_listing(snapshots: &mut [SnapshotMeta]) {
    snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
