//! Durable backend that lays out one directory per room under a configured
//! root (`LOCAL_STORAGE_PATH`). Chosen over a single flat file so that
//! deleting a room (`DeleteRoom`) is a single directory removal (§4.A).
//!
//! Layout:
//! ```text
//! <root>/<roomId>/snapshots/<snapshotId>.json
//! <root>/<roomId>/settings.json
//! <root>/_documents/<id>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ids::{new_snapshot_id, now_millis};
use crate::models::{Document, NewSnapshot, RoomSettings, SnapshotMeta, SnapshotRecord};

use super::{oldest_non_autosave, sort_listing, Backend, StorageError};

const DOCUMENTS_DIR: &str = "_documents";

/// Filesystem operations here are individually atomic-ish (`fs::write` per
/// file) but cap enforcement is read-modify-write across several files, so a
/// process-wide lock serializes writers. Reads still hit disk directly.
pub struct FilesystemBackend {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join(DOCUMENTS_DIR))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Rejects any id component that could escape the storage root.
    fn validate_component(raw: &str) -> Result<&str, StorageError> {
        if raw.is_empty() || raw.contains(['/', '\\']) || raw == "." || raw == ".." {
            return Err(StorageError::InvalidId(raw.to_string()));
        }
        Ok(raw)
    }

    fn room_dir(&self, room_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(Self::validate_component(room_id)?))
    }

    fn snapshots_dir(&self, room_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.room_dir(room_id)?.join("snapshots"))
    }

    fn snapshot_path(&self, room_id: &str, id: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .snapshots_dir(room_id)?
            .join(format!("{}.json", Self::validate_component(id)?)))
    }

    fn settings_path(&self, room_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.room_dir(room_id)?.join("settings.json"))
    }

    fn document_path(&self, id: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .root
            .join(DOCUMENTS_DIR)
            .join(format!("{}.json", Self::validate_component(id)?)))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(value)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn list_all_for_room(&self, room_id: &str) -> Result<Vec<SnapshotRecord>, StorageError> {
        let dir = self.snapshots_dir(room_id)?;
        let mut out = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(record) = Self::read_json::<SnapshotRecord>(&path)? {
                    out.push(record);
                }
            }
        }
        Ok(out)
    }

    fn insert_snapshot(&self, meta: SnapshotMeta, data: Vec<u8>) -> Result<String, StorageError> {
        let path = self.snapshot_path(&meta.room_id, &meta.id)?;
        let id = meta.id.clone();
        Self::write_json(&path, &SnapshotRecord { meta, data })?;
        Ok(id)
    }
}

impl Backend for FilesystemBackend {
    fn create_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let settings = self
            .read_room_settings_locked(&new.room_id)?
            .unwrap_or_default();
        let existing = self.list_all_for_room(&new.room_id)?;
        let metas: Vec<SnapshotMeta> = existing.iter().map(|r| r.meta.clone()).collect();
        let non_autosave = metas.iter().filter(|m| !m.is_autosave()).count();

        if non_autosave >= settings.max_snapshots.max(1) as usize {
            if let Some(victim) = oldest_non_autosave(&metas) {
                let victim_path = self.snapshot_path(&new.room_id, &victim.id)?;
                let _ = fs::remove_file(victim_path);
            }
        }

        let meta = SnapshotMeta {
            id: new_snapshot_id(),
            room_id: new.room_id,
            name: new.name,
            description: new.description,
            thumbnail: new.thumbnail,
            created_by: new.created_by,
            created_at: now_millis(),
        };
        self.insert_snapshot(meta, new.data)
    }

    fn upsert_autosave_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        for record in self.list_all_for_room(&new.room_id)? {
            if record.meta.is_autosave() {
                let path = self.snapshot_path(&new.room_id, &record.meta.id)?;
                let _ = fs::remove_file(path);
            }
        }
        let meta = SnapshotMeta {
            id: new_snapshot_id(),
            room_id: new.room_id,
            name: new.name,
            description: new.description,
            thumbnail: new.thumbnail,
            created_by: new.created_by,
            created_at: now_millis(),
        };
        self.insert_snapshot(meta, new.data)
    }

    fn list_snapshots(&self, room_id: &str) -> Result<Vec<SnapshotMeta>, StorageError> {
        let mut out: Vec<SnapshotMeta> = self
            .list_all_for_room(room_id)?
            .into_iter()
            .map(|r| r.meta)
            .collect();
        sort_listing(&mut out);
        Ok(out)
    }

    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord, StorageError> {
        for room_entry in fs::read_dir(&self.root)? {
            let room_entry = room_entry?;
            if !room_entry.path().is_dir() || room_entry.file_name() == DOCUMENTS_DIR {
                continue;
            }
            let room_id = room_entry.file_name().to_string_lossy().into_owned();
            let path = self.snapshot_path(&room_id, id)?;
            if let Some(record) = Self::read_json::<SnapshotRecord>(&path)? {
                return Ok(record);
            }
        }
        Err(StorageError::NotFound(id.to_string()))
    }

    fn delete_snapshot(&self, id: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        for room_entry in fs::read_dir(&self.root)? {
            let room_entry = room_entry?;
            if !room_entry.path().is_dir() || room_entry.file_name() == DOCUMENTS_DIR {
                continue;
            }
            let room_id = room_entry.file_name().to_string_lossy().into_owned();
            let path = self.snapshot_path(&room_id, id)?;
            if path.exists() {
                fs::remove_file(path)?;
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
        let _guard = self.write_lock.lock().unwrap();
        for room_entry in fs::read_dir(&self.root)? {
            let room_entry = room_entry?;
            if !room_entry.path().is_dir() || room_entry.file_name() == DOCUMENTS_DIR {
                continue;
            }
            let room_id = room_entry.file_name().to_string_lossy().into_owned();
            let path = self.snapshot_path(&room_id, id)?;
            if let Some(mut record) = Self::read_json::<SnapshotRecord>(&path)? {
                record.meta.name = name.to_string();
                record.meta.description = description.to_string();
                Self::write_json(&path, &record)?;
                return Ok(());
            }
        }
        Err(StorageError::NotFound(id.to_string()))
    }

    fn get_room_settings(&self, room_id: &str) -> Result<RoomSettings, StorageError> {
        Ok(self
            .read_room_settings_locked(room_id)?
            .unwrap_or_default())
    }

    fn update_room_settings(
        &self,
        room_id: &str,
        settings: RoomSettings,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        Self::write_json(&self.settings_path(room_id)?, &settings)
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        let dir = self.room_dir(room_id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn put_document(&self, id: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap();
        Self::write_json(
            &self.document_path(id)?,
            &Document {
                id: id.to_string(),
                data,
            },
        )
    }

    fn get_document(&self, id: &str) -> Result<Document, StorageError> {
        Self::read_json(&self.document_path(id)?)?.ok_or_else(|| StorageError::NotFound(id.to_string()))
    }
}

impl FilesystemBackend {
    fn read_room_settings_locked(&self, room_id: &str) -> Result<Option<RoomSettings>, StorageError> {
        Self::read_json(&self.settings_path(room_id)?)
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
            data: vec![4, 5, 6],
        }
    }

    #[test]
    fn round_trips_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).unwrap();
        let id = backend.create_snapshot(snap("r1")).unwrap();
        let record = backend.get_snapshot(&id).unwrap();
        assert_eq!(record.data, vec![4, 5, 6]);
    }

    #[test]
    fn rejects_path_traversal_room_id() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).unwrap();
        let err = backend.create_snapshot(snap("../escape")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidId(_)));
    }

    #[test]
    fn delete_room_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).unwrap();
        backend.create_snapshot(snap("r1")).unwrap();
        backend.delete_room("r1").unwrap();
        assert_eq!(backend.list_snapshots("r1").unwrap(), Vec::new());
    }

    #[test]
    fn delete_missing_room_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).unwrap();
        backend.delete_room("ghost").unwrap();
    }

    #[test]
    fn cap_enforcement_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).unwrap();
        backend
            .update_room_settings("r1", RoomSettings::clamped(1, 300))
            .unwrap();
        let first = backend.create_snapshot(snap("r1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        backend.create_snapshot(snap("r1")).unwrap();

        let listing = backend.list_snapshots("r1").unwrap();
        assert_eq!(listing.len(), 1);
        assert_ne!(listing[0].id, first);
    }

    #[test]
    fn documents_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).unwrap();
        backend.put_document("doc1", vec![7, 7]).unwrap();
        assert_eq!(backend.get_document("doc1").unwrap().data, vec![7, 7]);
    }
}
