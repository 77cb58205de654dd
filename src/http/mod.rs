//! REST surface: room listing, snapshot CRUD, and room settings (§4.D).

mod rooms;
mod settings;
mod snapshots;

use axum::routing::{delete, get, put};
use axum::Router;

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/rooms", get(rooms::list_rooms))
        .route("/api/rooms/{room_id}", delete(rooms::delete_room))
        .route(
            "/api/rooms/{room_id}/snapshots",
            get(snapshots::list_snapshots).post(snapshots::create_snapshot),
        )
        .route(
            "/api/rooms/{room_id}/autosave",
            put(snapshots::upsert_autosave_snapshot),
        )
        .route(
            "/api/snapshots/{snapshot_id}",
            get(snapshots::get_snapshot)
                .delete(snapshots::delete_snapshot)
                .put(snapshots::update_snapshot_metadata),
        )
        .route(
            "/api/rooms/{room_id}/settings",
            get(settings::get_room_settings).put(settings::update_room_settings),
        )
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
