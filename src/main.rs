use std::process::ExitCode;

use collab_relay::config::Config;
use collab_relay::{build_app, build_backend};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    let backend = match build_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize storage backend");
            return ExitCode::FAILURE;
        }
    };

    let (app, state) = build_app(backend);
    let addr = format!("0.0.0.0:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%addr, storage = %config.storage, "collab-relay listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    // §4.E: once `serve` stops accepting new connections, evict every
    // session still joined to a room and flush the backend before exiting.
    state.registry.drain();
    if let Err(e) = state.backend.flush() {
        tracing::error!(error = %e, "failed to flush storage backend on shutdown");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
