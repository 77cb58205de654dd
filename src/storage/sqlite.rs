//! Durable backend on top of an embedded SQL database (`DATA_SOURCE_NAME`
//! as the file path, matching the teacher's own SQLite usage).

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::ids::{new_snapshot_id, now_millis};
use crate::models::{Document, NewSnapshot, RoomSettings, SnapshotMeta, SnapshotRecord};

use super::{Backend, StorageError};

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(data_source_name: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(data_source_name)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS snapshots (
                 id          TEXT PRIMARY KEY,
                 room_id     TEXT NOT NULL,
                 name        TEXT NOT NULL,
                 description TEXT NOT NULL,
                 thumbnail   TEXT NOT NULL,
                 created_by  TEXT NOT NULL,
                 created_at  INTEGER NOT NULL,
                 data        BLOB NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_snapshots_room ON snapshots(room_id);
             CREATE TABLE IF NOT EXISTS room_settings (
                 room_id           TEXT PRIMARY KEY,
                 max_snapshots     INTEGER NOT NULL,
                 auto_save_interval INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS documents (
                 id   TEXT PRIMARY KEY,
                 data BLOB NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_meta(row: &rusqlite::Row) -> rusqlite::Result<SnapshotMeta> {
        Ok(SnapshotMeta {
            id: row.get("id")?,
            room_id: row.get("room_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            thumbnail: row.get("thumbnail")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
        })
    }

    fn settings_for(conn: &Connection, room_id: &str) -> Result<RoomSettings, StorageError> {
        conn.query_row(
            "SELECT max_snapshots, auto_save_interval FROM room_settings WHERE room_id = ?1",
            params![room_id],
            |row| {
                Ok(RoomSettings {
                    max_snapshots: row.get(0)?,
                    auto_save_interval: row.get(1)?,
                })
            },
        )
        .optional()
        .map(|opt| opt.unwrap_or_default())
        .map_err(StorageError::from)
    }

    fn insert_snapshot(
        conn: &Connection,
        meta: &SnapshotMeta,
        data: &[u8],
    ) -> Result<(), StorageError> {
        conn.execute(
            "INSERT INTO snapshots
                (id, room_id, name, description, thumbnail, created_by, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                meta.id,
                meta.room_id,
                meta.name,
                meta.description,
                meta.thumbnail,
                meta.created_by,
                meta.created_at,
                data,
            ],
        )?;
        Ok(())
    }

    fn evict_oldest_non_autosave(conn: &Connection, room_id: &str) -> Result<(), StorageError> {
        let victim: Option<String> = conn
            .query_row(
                "SELECT id FROM snapshots
                   WHERE room_id = ?1 AND created_by != '__autosave__'
                   ORDER BY created_at ASC, id ASC LIMIT 1",
                params![room_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = victim {
            conn.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn create_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let settings = Self::settings_for(&tx, &new.room_id)?;
        let non_autosave: i64 = tx.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE room_id = ?1 AND created_by != '__autosave__'",
            params![new.room_id],
            |row| row.get(0),
        )?;
        if non_autosave as u32 >= settings.max_snapshots.max(1) {
            Self::evict_oldest_non_autosave(&tx, &new.room_id)?;
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
        Self::insert_snapshot(&tx, &meta, &new.data)?;
        tx.commit()?;
        Ok(meta.id)
    }

    fn upsert_autosave_snapshot(&self, new: NewSnapshot) -> Result<String, StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM snapshots WHERE room_id = ?1 AND created_by = '__autosave__'",
            params![new.room_id],
        )?;
        let meta = SnapshotMeta {
            id: new_snapshot_id(),
            room_id: new.room_id,
            name: new.name,
            description: new.description,
            thumbnail: new.thumbnail,
            created_by: new.created_by,
            created_at: now_millis(),
        };
        Self::insert_snapshot(&tx, &meta, &new.data)?;
        tx.commit()?;
        Ok(meta.id)
    }

    fn list_snapshots(&self, room_id: &str) -> Result<Vec<SnapshotMeta>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, room_id, name, description, thumbnail, created_by, created_at
               FROM snapshots WHERE room_id = ?1
               ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![room_id], Self::row_to_meta)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_snapshot(&self, id: &str) -> Result<SnapshotRecord, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, room_id, name, description, thumbnail, created_by, created_at, data
               FROM snapshots WHERE id = ?1",
            params![id],
            |row| {
                Ok(SnapshotRecord {
                    meta: Self::row_to_meta(row)?,
                    data: row.get("data")?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn delete_snapshot(&self, id: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn update_snapshot_metadata(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE snapshots SET name = ?2, description = ?3 WHERE id = ?1",
            params![id, name, description],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn get_room_settings(&self, room_id: &str) -> Result<RoomSettings, StorageError> {
        let conn = self.conn.lock().unwrap();
        Self::settings_for(&conn, room_id)
    }

    fn update_room_settings(
        &self,
        room_id: &str,
        settings: RoomSettings,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO room_settings (room_id, max_snapshots, auto_save_interval)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(room_id) DO UPDATE SET
                max_snapshots = excluded.max_snapshots,
                auto_save_interval = excluded.auto_save_interval",
            params![room_id, settings.max_snapshots, settings.auto_save_interval],
        )?;
        Ok(())
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM snapshots WHERE room_id = ?1", params![room_id])?;
        tx.execute(
            "DELETE FROM room_settings WHERE room_id = ?1",
            params![room_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn put_document(&self, id: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO documents (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            params![id, data],
        )?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<Document, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, data FROM documents WHERE id = ?1",
            params![id],
            |row| {
                Ok(Document {
                    id: row.get(0)?,
                    data: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn flush(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
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
            data: vec![1, 1, 2, 3],
        }
    }

    fn backend() -> SqliteBackend {
        SqliteBackend::open(":memory:").unwrap()
    }

    #[test]
    fn round_trips_a_snapshot() {
        let backend = backend();
        let id = backend.create_snapshot(snap("r1")).unwrap();
        let record = backend.get_snapshot(&id).unwrap();
        assert_eq!(record.data, vec![1, 1, 2, 3]);
    }

    #[test]
    fn cap_enforcement_evicts_oldest() {
        let backend = backend();
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
    fn settings_default_when_absent() {
        let backend = backend();
        let settings = backend.get_room_settings("ghost").unwrap();
        assert_eq!(settings, RoomSettings::default());
    }

    #[test]
    fn delete_room_cascades() {
        let backend = backend();
        backend.create_snapshot(snap("r1")).unwrap();
        backend
            .update_room_settings("r1", RoomSettings::clamped(3, 120))
            .unwrap();
        backend.delete_room("r1").unwrap();
        assert_eq!(backend.list_snapshots("r1").unwrap(), Vec::new());
        assert_eq!(backend.get_room_settings("r1").unwrap(), RoomSettings::default());
    }

    #[test]
    fn documents_round_trip() {
        let backend = backend();
        backend.put_document("doc1", vec![5, 5]).unwrap();
        assert_eq!(backend.get_document("doc1").unwrap().data, vec![5, 5]);
    }

    #[test]
    fn autosave_upsert_replaces_previous() {
        let backend = backend();
        let mut autosave = snap("r1");
        autosave.created_by = crate::models::AUTOSAVE_CREATED_BY.to_string();
        let first = backend.upsert_autosave_snapshot(autosave.clone()).unwrap();
        autosave.data = vec![7, 7, 7];
        let second = backend.upsert_autosave_snapshot(autosave).unwrap();

        let listing = backend.list_snapshots("r1").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].id, second);
        assert_ne!(first, second);
        assert_eq!(backend.get_snapshot(&second).unwrap().data, vec![7, 7, 7]);
    }

    #[test]
    fn autosave_never_counts_against_cap() {
        let backend = backend();
        backend
            .update_room_settings("r1", RoomSettings::clamped(1, 300))
            .unwrap();
        backend.create_snapshot(snap("r1")).unwrap();
        let mut autosave = snap("r1");
        autosave.created_by = crate::models::AUTOSAVE_CREATED_BY.to_string();
        backend.upsert_autosave_snapshot(autosave).unwrap();

        let listing = backend.list_snapshots("r1").unwrap();
        assert_eq!(listing.len(), 2);
    }
}
