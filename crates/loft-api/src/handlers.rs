//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` (or the dispatcher) and
//! returns JSON responses in a consistent envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use loft_core::epoch_millis;
use loft_dispatch::{DispatchError, LaunchRequest};
use loft_router::summarize;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Deployments ────────────────────────────────────────────────

/// POST /api/v1/deployments
pub async fn create_deployment(
    State(state): State<ApiState>,
    Json(request): Json<LaunchRequest>,
) -> impl IntoResponse {
    match state.dispatcher.launch(request).await {
        Ok(response) => (StatusCode::CREATED, ApiResponse::ok(response)).into_response(),
        Err(e @ DispatchError::InvalidSubdomain(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/deployments
pub async fn list_deployments(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_deployments() {
        Ok(deployments) => ApiResponse::ok(deployments).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/deployments/{id}
pub async fn get_deployment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_deployment(&id) {
        Ok(Some(deployment)) => ApiResponse::ok(deployment).into_response(),
        Ok(None) => error_response("deployment not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/deployments/{id}/logs
pub async fn get_logs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.logs_for_deployment(&id) {
        Ok(logs) => ApiResponse::ok(logs).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Analytics ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AnalyticsParams {
    #[serde(default = "default_days")]
    days: u32,
}

fn default_days() -> u32 {
    7
}

/// GET /api/v1/analytics/{subdomain}?days=N
pub async fn get_analytics(
    State(state): State<ApiState>,
    Path(subdomain): Path<String>,
    Query(params): Query<AnalyticsParams>,
) -> impl IntoResponse {
    match summarize(&state.store, &subdomain, params.days, epoch_millis()) {
        Ok(summary) => ApiResponse::ok(summary).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
