//! `GET`/`PUT /api/rooms/{roomId}/settings` (§4.D).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::RoomSettings;
use crate::storage::{blocking, SharedBackend};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettingsWire {
    max_snapshots: u32,
    auto_save_interval: u32,
}

impl From<RoomSettings> for RoomSettingsWire {
    fn from(s: RoomSettings) -> Self {
        Self {
            max_snapshots: s.max_snapshots,
            auto_save_interval: s.auto_save_interval,
        }
    }
}

pub async fn get_room_settings(
    State(backend): State<SharedBackend>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSettingsWire>, ApiError> {
    let settings = blocking(move || backend.get_room_settings(&room_id)).await?;
    Ok(Json(settings.into()))
}

pub async fn update_room_settings(
    State(backend): State<SharedBackend>,
    Path(room_id): Path<String>,
    Json(req): Json<RoomSettingsWire>,
) -> Result<StatusCode, ApiError> {
    let clamped = RoomSettings::clamped(req.max_snapshots, req.auto_save_interval);
    blocking(move || backend.update_room_settings(&room_id, clamped)).await?;
    Ok(StatusCode::NO_CONTENT)
}
