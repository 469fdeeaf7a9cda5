//! HTTP front end for the batching system.
//!
//! Exposes the coordinator over a small JSON API and owns the mapping from
//! core outcomes to transport-level responses: a result maps to 200, a
//! caller timeout to 503, malformed input to 400, and anything unexpected
//! to 500. Input validation stops at this boundary; the core assumes
//! well-formed work items.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::coordinator::BatchCoordinator;
use crate::domain::work::{WorkItem, WorkResult};
use crate::error::MicrobatchError;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: BatchCoordinator,
}

/// API errors with HTTP status code mappings.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Processing timed out")]
    Timeout,

    #[error("An error occurred processing the request")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<MicrobatchError> for ApiError {
    fn from(err: MicrobatchError) -> Self {
        match err {
            MicrobatchError::Timeout(_) => ApiError::Timeout,
            MicrobatchError::ValidationError(message) => ApiError::BadRequest(message),
            other => {
                tracing::error!(error = %other, "Unexpected error processing request");
                ApiError::Internal
            }
        }
    }
}

/// Basic health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process", post(process_item))
        .route("/health", get(health))
        .with_state(state)
}

/// POST /process: submit one work item and wait for its result.
async fn process_item(
    State(state): State<AppState>,
    Json(item): Json<WorkItem>,
) -> Result<Json<WorkResult>, ApiError> {
    if item.input.is_empty() {
        tracing::warn!(item_id = item.id, "Rejected work item with empty input");
        return Err(MicrobatchError::ValidationError(
            "input string cannot be empty".to_string(),
        )
        .into());
    }

    tracing::info!(item_id = item.id, "Processing request");
    let result = state.coordinator.process(item).await?;
    tracing::info!(item_id = result.id, "Request processed");
    Ok(Json(result))
}

/// GET /health: liveness probe.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
