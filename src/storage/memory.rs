//! In-process, non-durable backend. Data lives only for the server's
//! lifetime — the default when `STORAGE_TYPE` is unset (§4.A).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::ids::{new_snapshot_id, now_millis};
use crate::models::{Document, NewSnapshot, RoomSettings, SnapshotMeta, SnapshotRecord};

use super::{oldest_non_autosave, sort_listing, Backend, StorageError};

#[derive(Default)]
struct RoomState {
    snapshots: Vec<SnapshotRecord>,
    settings: Option<RoomSettings>,
}

/// `RwLock`-guarded maps, mirroring the registry's own locking discipline:
/// short critical sections, no I/O while the lock is held.
#[derive(Default)]
pub struct MemoryBackend {
    rooms: RwLock<HashMap<String, RoomState>>,
    documents: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn create_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError> {
        let mut rooms = self.rooms.write().unwrap();
        let room = rooms.entry(new.room_id.clone()).or_default();
        let cap = room
            .settings
            .unwrap_or_default()
            .max_snapshots
            .max(1) as usize;

        let non_autosave = room
            .snapshots
            .iter()
            .filter(|s| !s.meta.is_autosave())
            .count();
        if non_autosave >= cap {
            if let Some(victim) = oldest_non_autosave(
                &room.snapshots.iter().map(|s| s.meta.clone()).collect::<Vec<_>>(),
            ) {
                let victim_id = victim.id.clone();
                room.snapshots.retain(|s| s.id != victim_id);
            }
        }

        let id = new_snapshot_id();
        room.snapshots.push(SnapshotRecord {
            meta: SnapshotMeta {
                id: id.clone(),
                room_id: new.room_id,
                name: new.name,
                description: new.description,
                thumbnail: new.thumbnail,
                created_by: new.created_by,
                created_at: now_millis(),
            },
            data: new.data,
        });
        Ok(id)
    }

    fn upsert_autosave_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError> {
        let mut rooms = self.rooms.write().unwrap();
        let room = rooms.entry(new.room_id.clone()).or_default();
        room.snapshots.retain(|s| !s.meta.is_autosave());

        let id = new_snapshot_id();
        room.snapshots.push(SnapshotRecord {
            meta: SnapshotMeta {
                id: id.clone(),
                room_id: new.room_id,
                name: new.name,
                description: new.description,
                thumbnail: new.thumbnail,
                created_by: new.created_by,
                created_at: now_millis(),
            },
            data: new.data,
        });
        Ok(id)
    }

    fn list_snapshots(&self, room_id: &str) -> Result<Vec<SnapshotMeta>, StorageError> {
        let rooms = self.rooms.read().unwrap();
        let mut out = rooms
            .get(room_id)
            .map(|r| r.snapshots.iter().map(|s| s.meta.clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        sort_listing(&mut out);
        Ok(out)
    }

    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord, StorageError> {
        let rooms = self.rooms.read().unwrap();
        rooms
            .values()
            .flat_map(|r| r.snapshots.iter())
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn delete_snapshot(&self, id: &str) -> Result<(), StorageError> {
        let mut rooms = self.rooms.write().unwrap();
        for room in rooms.values_mut() {
            let before = room.snapshots.len();
            room.snapshots.retain(|s| s.id != id);
            if room.snapshots.len() != before {
                return Ok(());
            }
        }
        Err(StorageError::NotFound(id.to_string()))
    }

    fn update_snapshot_metadata(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<(), StorageError> {
        let mut rooms = self.rooms.write().unwrap();
        for room in rooms.values_mut() {
            if let Some(s) = room.snapshots.iter_mut().find(|s| s.id == id) {
                s.meta.name = name.to_string();
                s.meta.description = description.to_string();
                return Ok(());
            }
        }
        Err(StorageError::NotFound(id.to_string()))
    }

    fn get_room_settings(&self, room_id: &str) -> Result<RoomSettings, StorageError> {
        let rooms = self.rooms.read().unwrap();
        Ok(rooms
            .get(room_id)
            .and_then(|r| r.settings)
            .unwrap_or_default())
    }

    fn update_room_settings(
        &self,
        room_id: &str,
        settings: RoomSettings,
    ) -> Result<(), StorageError> {
        let mut rooms = self.rooms.write().unwrap();
        rooms.entry(room_id.to_string()).or_default().settings = Some(settings);
        Ok(())
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StorageError> {
        self.rooms.write().unwrap().remove(room_id);
        Ok(())
    }

    fn put_document(&self, id: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.documents.write().unwrap().insert(id.to_string(), data);
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<Document, StorageError> {
        self.documents
            .read()
            .unwrap()
            .get(id)
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            })
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(room: &str) -> NewSnapshot {
        NewSnapshot {
            room_id: room.to_string(),
            name: "untitled".into(),
            description: String::new(),
            thumbnail: String::new(),
            created_by: "alice".into(),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn cap_enforcement_evicts_oldest_non_autosave() {
        let backend = MemoryBackend::new();
        backend.update_room_settings("r1", RoomSettings::clamped(2, 300)).unwrap();
        let first = backend.create_snapshot(snap("r1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        backend.create_snapshot(snap("r1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        backend.create_snapshot(snap("r1")).unwrap();

        let listing = backend.list_snapshots("r1").unwrap();
        assert_eq!(listing.len(), 2);
        assert!(listing.iter().all(|s| s.id != first));
    }

    #[test]
    fn autosave_never_counts_against_cap() {
        let backend = MemoryBackend::new();
        backend.update_room_settings("r1", RoomSettings::clamped(1, 300)).unwrap();
        backend.create_snapshot(snap("r1")).unwrap();
        let mut autosave = snap("r1");
        autosave.created_by = crate::models::AUTOSAVE_CREATED_BY.to_string();
        backend.upsert_autosave_snapshot(autosave).unwrap();

        let listing = backend.list_snapshots("r1").unwrap();
        assert_eq!(listing.len(), 2);
    }

    #[test]
    fn autosave_upsert_replaces_previous() {
        let backend = MemoryBackend::new();
        let mut autosave = snap("r1");
        autosave.created_by = crate::models::AUTOSAVE_CREATED_BY.to_string();
        let first = backend.upsert_autosave_snapshot(autosave.clone()).unwrap();
        let second = backend.upsert_autosave_snapshot(autosave).unwrap();

        let listing = backend.list_snapshots("r1").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].id, second);
        assert_ne!(first, second);
    }

    #[test]
    fn get_missing_snapshot_is_not_found() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.get_snapshot("nope"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn empty_room_listing_is_empty_not_an_error() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.list_snapshots("ghost").unwrap(), Vec::new());
    }

    #[test]
    fn delete_room_removes_its_snapshots() {
        let backend = MemoryBackend::new();
        backend.create_snapshot(snap("r1")).unwrap();
        backend.delete_room("r1").unwrap();
        assert_eq!(backend.list_snapshots("r1").unwrap(), Vec::new());
    }

    #[test]
    fn documents_round_trip() {
        let backend = MemoryBackend::new();
        backend.put_document("doc1", vec![9, 9, 9]).unwrap();
        let doc = backend.get_document("doc1").unwrap();
        assert_eq!(doc.data, vec![9, 9, 9]);
    }
}
