use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use librarr_core::{AcquireError, ImportError, IndexerError, SanitizedConfig, StoreError};

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error half of every fallible handler.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, message)
}

pub fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound { .. } => not_found(e.to_string()),
        StoreError::AlreadyExists { .. } => api_error(StatusCode::CONFLICT, e.to_string()),
        _ => {
            error!(error = %e, "Store error");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn indexer_error(e: IndexerError) -> ApiError {
    match e {
        IndexerError::NotFound(_) => not_found(e.to_string()),
        IndexerError::NoIndexers | IndexerError::InvalidConfig(_) => bad_request(e.to_string()),
        _ => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

pub fn import_error(e: ImportError) -> ApiError {
    match e {
        ImportError::Store(e) => store_error(e),
        e if e.is_collision() => api_error(StatusCode::CONFLICT, e.to_string()),
        e => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn acquire_error(e: AcquireError) -> ApiError {
    match e {
        AcquireError::BookNotFound(_) | AcquireError::DownloadNotFound(_) => {
            not_found(e.to_string())
        }
        AcquireError::NoIndexers
        | AcquireError::NoDownloadClients
        | AcquireError::NotMonitored(_) => bad_request(e.to_string()),
        AcquireError::InvalidState { .. } | AcquireError::NotWanted { .. } => {
            api_error(StatusCode::CONFLICT, e.to_string())
        }
        AcquireError::Search(e) => indexer_error(e),
        AcquireError::Dispatch { .. } => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
        AcquireError::Import(e) => import_error(e),
        AcquireError::Store(e) => store_error(e),
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
