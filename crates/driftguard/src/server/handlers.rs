//! API handlers for the drift query surface.
//!
//! Handlers only read the store and forward trigger requests; every write
//! to drift records stays inside the controller.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::db::{drift_repo, DriftFilter, DriftStatistics};
use crate::model::{DriftRecord, DriftStatus};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "driftguard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn ready(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    // Readiness means the store answers queries.
    drift_repo::query(&state.db, &DriftFilter { limit: Some(1), ..Default::default() })?;
    Ok(Json(HealthResponse {
        status: "ready",
        service: "driftguard",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub namespace: Option<String>,
    pub drift_detected: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub records: Vec<DriftRecord>,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
}

pub async fn list_drifts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let filter = DriftFilter {
        namespace: params.namespace,
        drift_detected: params.drift_detected,
        ..Default::default()
    };
    let (records, count) = drift_repo::query(&state.db, &filter)?;
    Ok(Json(ListResponse {
        records,
        count,
        status: None,
    }))
}

pub async fn active_drifts(
    State(state): State<AppState>,
) -> Result<Json<ListResponse>, ApiError> {
    let (records, count) =
        drift_repo::query(&state.db, &DriftFilter::by_status(DriftStatus::Active))?;
    Ok(Json(ListResponse {
        records,
        count,
        status: Some("active"),
    }))
}

pub async fn resolved_drifts(
    State(state): State<AppState>,
) -> Result<Json<ListResponse>, ApiError> {
    let (records, count) =
        drift_repo::query(&state.db, &DriftFilter::by_status(DriftStatus::Resolved))?;
    Ok(Json(ListResponse {
        records,
        count,
        status: Some("resolved"),
    }))
}

pub async fn get_drift(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<Json<DriftRecord>, ApiError> {
    match drift_repo::find_by_resource_id(&state.db, &resource_id)? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::RecordNotFound { resource_id }),
    }
}

pub async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<DriftStatistics>, ApiError> {
    let stats = drift_repo::statistics(&state.db, Utc::now())?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub message: &'static str,
}

pub async fn trigger_analysis(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
    log::info!("Manual drift analysis requested via API");
    let _ = state.trigger_tx.send(());
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "accepted",
            message: "Drift analysis scheduled",
        }),
    )
}
