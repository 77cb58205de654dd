//! `GET /api/rooms` and `DELETE /api/rooms/{roomId}` (§4.D).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::RoomSummary;
use crate::registry::RoomRegistry;
use crate::storage::{blocking, SharedBackend};

const CONFIRMATION_TOKEN: &str = "confirm";

#[derive(Deserialize)]
pub struct DeleteRoomRequest {
    confirmation: String,
}

pub async fn list_rooms(State(registry): State<Arc<RoomRegistry>>) -> Json<Vec<RoomSummary>> {
    Json(registry.list_rooms())
}

pub async fn delete_room(
    State(registry): State<Arc<RoomRegistry>>,
    State(backend): State<SharedBackend>,
    Path(room_id): Path<String>,
    Json(req): Json<DeleteRoomRequest>,
) -> Result<StatusCode, ApiError> {
    if req.confirmation != CONFIRMATION_TOKEN {
        return Err(ApiError::PreconditionFailed(
            "confirmation text does not match".to_string(),
        ));
    }

    registry.evict_room(&room_id);
    blocking(move || backend.delete_room(&room_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
