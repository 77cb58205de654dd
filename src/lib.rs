pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod ids;
pub mod models;
pub mod registry;
pub mod storage;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::{Config, StorageKind};
use registry::RoomRegistry;
use storage::{FilesystemBackend, MemoryBackend, SharedBackend, SqliteBackend, StorageError};

/// Shared application state, handed to every HTTP handler and the socket
/// gateway via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub backend: SharedBackend,
}

impl FromRef<AppState> for Arc<RoomRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl FromRef<AppState> for SharedBackend {
    fn from_ref(state: &AppState) -> Self {
        state.backend.clone()
    }
}

/// Construct the backend named by `config.storage`.
pub fn build_backend(config: &Config) -> Result<SharedBackend, StorageError> {
    let backend: SharedBackend = match config.storage {
        StorageKind::Memory => Arc::new(MemoryBackend::new()),
        StorageKind::Filesystem => {
            let path = config
                .local_storage_path
                .as_deref()
                .expect("Config::from_env guarantees this is set for StorageKind::Filesystem");
            Arc::new(FilesystemBackend::new(path)?)
        }
        StorageKind::Sqlite => {
            let dsn = config
                .data_source_name
                .as_deref()
                .expect("Config::from_env guarantees this is set for StorageKind::Sqlite");
            Arc::new(SqliteBackend::open(dsn)?)
        }
    };
    Ok(backend)
}

/// Assemble the full axum `Router`: socket gateway, REST surface, CORS.
/// Mirrors the split between constructing state and mounting routes that a
/// framework-level `build()` function usually does. Returns the `AppState`
/// alongside the router so the caller can drive shutdown (evict every
/// session, flush the backend) after `axum::serve` returns (§4.E).
pub fn build_app(backend: SharedBackend) -> (Router, AppState) {
    let state = AppState {
        registry: Arc::new(RoomRegistry::new()),
        backend,
    };

    let router = Router::new()
        .merge(http::routes())
        .route("/socket", axum::routing::get(gateway::socket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (router, state)
}
