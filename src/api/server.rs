use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{services, state::AppState};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Builds the router for the `/v1` batch surface (spec §6.1). Split out
/// from [`run`] so tests can drive the app without binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/files", post(services::upload_file))
        .route("/v1/files/{file_id}/content", get(services::get_file_content))
        .route("/v1/batches", post(services::create_batch))
        .route("/v1/batches", get(services::list_batches))
        .route("/v1/batches/{id}", get(services::get_batch))
        .route("/v1/batches/{id}", delete(services::cancel_batch))
        .route("/v1/batches/{id}/results", get(services::get_batch_results))
        .route("/v1/batches/{id}/errors", get(services::get_batch_errors))
        .route("/v1/models", get(services::list_models))
        .route("/v1/health", get(services::health))
        .route("/health", get(services::health))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(address: SocketAddr, state: AppState) -> Result<(), AnyError> {
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "batchd API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
