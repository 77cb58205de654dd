//! Snapshot CRUD and autosave endpoints (§4.D).
//!
//! The backend stores scene payloads as raw bytes; the wire format
//! base64-encodes them, same as `thumbnail` (already a string, typically a
//! data URL supplied by the client).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{NewSnapshot, SnapshotMeta};
use crate::storage::{blocking, SharedBackend};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotMetaWire {
    id: String,
    room_id: String,
    name: String,
    description: String,
    thumbnail: String,
    created_by: String,
    created_at: i64,
}

impl From<SnapshotMeta> for SnapshotMetaWire {
    fn from(m: SnapshotMeta) -> Self {
        Self {
            id: m.id,
            room_id: m.room_id,
            name: m.name,
            description: m.description,
            thumbnail: m.thumbnail,
            created_by: m.created_by,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRecordWire {
    #[serde(flatten)]
    meta: SnapshotMetaWire,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    thumbnail: String,
    created_by: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSnapshotMetadataRequest {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Serialize)]
struct IdResponse {
    id: String,
}

fn decode_data(raw: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(raw)
        .map_err(|e| ApiError::BadRequest(format!("data is not valid base64: {e}")))
}

pub async fn list_snapshots(
    State(backend): State<SharedBackend>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<SnapshotMetaWire>>, ApiError> {
    let metas = blocking(move || backend.list_snapshots(&room_id)).await?;
    Ok(Json(metas.into_iter().map(Into::into).collect()))
}

pub async fn create_snapshot(
    State(backend): State<SharedBackend>,
    Path(room_id): Path<String>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let data = decode_data(&req.data)?;
    let new = NewSnapshot {
        room_id,
        name: req.name,
        description: req.description,
        thumbnail: req.thumbnail,
        created_by: req.created_by,
        data,
    };
    let id = blocking(move || backend.create_snapshot(new)).await?;
    Ok(Json(IdResponse { id }))
}

pub async fn upsert_autosave_snapshot(
    State(backend): State<SharedBackend>,
    Path(room_id): Path<String>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let data = decode_data(&req.data)?;
    let new = NewSnapshot {
        room_id,
        name: req.name,
        description: req.description,
        thumbnail: req.thumbnail,
        created_by: crate::models::AUTOSAVE_CREATED_BY.to_string(),
        data,
    };
    let id = blocking(move || backend.upsert_autosave_snapshot(new)).await?;
    Ok(Json(IdResponse { id }))
}

pub async fn get_snapshot(
    State(backend): State<SharedBackend>,
    Path(snapshot_id): Path<String>,
) -> Result<Json<SnapshotRecordWire>, ApiError> {
    let record = blocking(move || backend.get_snapshot(&snapshot_id)).await?;
    Ok(Json(SnapshotRecordWire {
        meta: record.meta.into(),
        data: BASE64.encode(record.data),
    }))
}

pub async fn delete_snapshot(
    State(backend): State<SharedBackend>,
    Path(snapshot_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    blocking(move || backend.delete_snapshot(&snapshot_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_snapshot_metadata(
    State(backend): State<SharedBackend>,
    Path(snapshot_id): Path<String>,
    Json(req): Json<UpdateSnapshotMetadataRequest>,
) -> Result<StatusCode, ApiError> {
    blocking(move || backend.update_snapshot_metadata(&snapshot_id, &req.name, &req.description)).await?;
    Ok(StatusCode::NO_CONTENT)
}
