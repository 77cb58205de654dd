//! HTTP surface tests driven through `tower::ServiceExt::oneshot`, no
//! socket bound (§4.D, §8 E4-E6).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use collab_relay::build_app;
use collab_relay::storage::MemoryBackend;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    build_app(Arc::new(MemoryBackend::new())).0
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn health_check_reports_status_and_version() {
    let response = app()
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn empty_server_lists_no_rooms() {
    let response = app()
        .oneshot(Request::builder().uri("/api/rooms").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rooms = body_json(response).await;
    assert_eq!(rooms, json!([]));
}

#[tokio::test]
async fn snapshot_create_get_delete_round_trip() {
    let app = app();
    let data = BASE64.encode(b"scene-bytes");

    let create = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/rooms/r1/snapshots",
            json!({
                "name": "v1",
                "description": "",
                "thumbnail": "",
                "createdBy": "alice",
                "data": data,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::OK);
    let id = body_json(create).await["id"].as_str().unwrap().to_string();

    let get = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/snapshots/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let record = body_json(get).await;
    assert_eq!(record["data"], json!(data));

    let delete = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/snapshots/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let missing = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/snapshots/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn snapshot_cap_enforcement_through_http() {
    let app = app();

    let put_settings = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/rooms/r1/settings",
            json!({"maxSnapshots": 2, "autoSaveInterval": 300}),
        ))
        .await
        .unwrap();
    assert_eq!(put_settings.status(), StatusCode::NO_CONTENT);

    let mut ids = Vec::new();
    for i in 0..3 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/rooms/r1/snapshots",
                json!({
                    "name": format!("v{i}"),
                    "description": "",
                    "thumbnail": "",
                    "createdBy": "alice",
                    "data": BASE64.encode(format!("bytes-{i}")),
                }),
            ))
            .await
            .unwrap();
        ids.push(body_json(response).await["id"].as_str().unwrap().to_string());
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let listing = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/rooms/r1/snapshots")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listing = body_json(listing).await;
    assert_eq!(listing.as_array().unwrap().len(), 2);

    let oldest_gone = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/snapshots/{}", ids[0]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(oldest_gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_room_requires_matching_confirmation() {
    let app = app();

    let wrong = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            "/api/rooms/r1",
            json!({"confirmation": "nope"}),
        ))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::PRECONDITION_FAILED);

    let right = app
        .oneshot(json_request(
            "DELETE",
            "/api/rooms/r1",
            json!({"confirmation": "confirm"}),
        ))
        .await
        .unwrap();
    assert_eq!(right.status(), StatusCode::NO_CONTENT);
}
