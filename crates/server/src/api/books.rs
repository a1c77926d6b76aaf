//! Catalog entry actions.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use librarr_core::{AcquireOutcome, Download, Protocol, SearchResult};

use super::handlers::{acquire_error, not_found, ApiError};
use crate::state::AppState;

/// What was picked, without the full indexer payload.
#[derive(Debug, Serialize)]
pub struct ResultSummary {
    pub title: String,
    pub indexer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub size_bytes: u64,
    pub seeders: u32,
    pub protocol: Protocol,
}

impl From<&SearchResult> for ResultSummary {
    fn from(r: &SearchResult) -> Self {
        Self {
            title: r.title.clone(),
            indexer: r.indexer.clone(),
            format: r.format.clone(),
            size_bytes: r.size_bytes,
            seeders: r.seeders,
            protocol: r.protocol,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AcquireResponse {
    pub result: ResultSummary,
    pub download: Download,
}

/// POST /api/v1/catalog-entries/{id}/search
///
/// Search, pick the best candidate and dispatch it.
pub async fn search_and_acquire(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AcquireResponse>, ApiError> {
    match state.acquirer().acquire(&id).await.map_err(acquire_error)? {
        AcquireOutcome::Found { result, download } => Ok(Json(AcquireResponse {
            result: ResultSummary::from(&result),
            download,
        })),
        AcquireOutcome::NotFound {
            results_considered, ..
        } => Err(not_found(format!(
            "No acceptable result found ({} considered)",
            results_considered
        ))),
    }
}
