//! HTTP query surface.
//!
//! Serves the drift records the controller maintains. Read-only except for
//! `/api/v1/analyze`, which hands a trigger to the controller's loop.

pub mod error;
pub mod handlers;

pub use error::ApiError;

use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::sync::broadcast;

use crate::db::Database;
use crate::error::DriftGuardError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Store handle; handlers only read.
    pub db: Database,
    /// Wakes the controller loop for an immediate pass.
    pub trigger_tx: broadcast::Sender<()>,
}

/// Builds the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/api/v1/drifts", get(handlers::list_drifts))
        .route("/api/v1/drifts/active", get(handlers::active_drifts))
        .route("/api/v1/drifts/resolved", get(handlers::resolved_drifts))
        .route("/api/v1/drifts/:resource_id", get(handlers::get_drift))
        .route("/api/v1/statistics", get(handlers::statistics))
        .route("/api/v1/analyze", post(handlers::trigger_analysis))
        .with_state(state)
}

/// Binds and serves the API until `shutdown` completes.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DriftGuardError> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| DriftGuardError::Server(format!("failed to bind port {}: {}", port, e)))?;

    log::info!("HTTP server listening on port {}", port);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| DriftGuardError::Server(e.to_string()))
}
