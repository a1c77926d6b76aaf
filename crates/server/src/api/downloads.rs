//! Download API handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use librarr_core::{
    AcquireError, Download, DownloadStatus, ImportOutcome, LibraryStore, Protocol, SearchResult,
};

use super::handlers::{acquire_error, bad_request, ApiError};
use super::import::staged_source;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Manual dispatch of a result the caller picked.
///
/// Every field is optional at the serde level so missing ones surface as
/// a 400 with a message rather than a body rejection.
#[derive(Debug, Deserialize)]
pub struct CreateDownloadRequest {
    #[serde(default)]
    pub book_id: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub indexer: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub delete_data: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadListResponse {
    pub downloads: Vec<Download>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub download: Download,
    pub media_file: ImportOutcome,
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| bad_request(format!("Missing required field: {}", field)))
}

fn protocol_for_url(url: &str) -> Protocol {
    let lower = url.to_lowercase();
    if lower.ends_with(".nzb") || lower.contains("getnzb") || lower.contains("t=get&") {
        Protocol::Usenet
    } else {
        Protocol::Torrent
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/downloads
pub async fn create_download(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateDownloadRequest>,
) -> Result<(StatusCode, Json<Download>), ApiError> {
    let book_id = required(body.book_id, "book_id")?;
    let url = required(body.download_url, "download_url")?;

    let acquirer = state.acquirer();
    let book = acquirer
        .store()
        .get_book(&book_id)
        .map_err(|e| acquire_error(e.into()))?
        .ok_or_else(|| acquire_error(AcquireError::BookNotFound(book_id.clone())))?;

    let protocol = body.protocol.unwrap_or_else(|| protocol_for_url(&url));
    let title = body.title.unwrap_or_else(|| book.title.clone());
    let indexer = body.indexer.unwrap_or_else(|| "manual".to_string());
    let mut result = SearchResult::new(indexer, title, url, protocol);
    result.size_bytes = body.size_bytes.unwrap_or(0);
    result.format = body.format.map(|f| f.to_uppercase());

    let download = acquirer
        .dispatch(&book_id, &result)
        .await
        .map_err(acquire_error)?;
    Ok((StatusCode::CREATED, Json(download)))
}

/// GET /api/v1/downloads?status=…
pub async fn list_downloads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<DownloadListResponse>, ApiError> {
    let status = params
        .status
        .map(|s| s.parse::<DownloadStatus>())
        .transpose()
        .map_err(|e| bad_request(format!("Invalid status: {}", e)))?;

    let downloads = state
        .acquirer()
        .list_downloads(status)
        .map_err(acquire_error)?;
    let count = downloads.len();
    Ok(Json(DownloadListResponse { downloads, count }))
}

/// GET /api/v1/downloads/{id}
pub async fn get_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Download>, ApiError> {
    state
        .acquirer()
        .get_download(&id)
        .map(Json)
        .map_err(acquire_error)
}

/// DELETE /api/v1/downloads/{id}?delete_data=
pub async fn cancel_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
    state
        .acquirer()
        .cancel_download(&id, params.delete_data)
        .await
        .map_err(acquire_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/downloads/{id}/complete
///
/// External completion signal: the transfer landed at `path` and should be
/// imported.
pub async fn complete_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let path = body
        .path
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| bad_request("Missing required field: path"))?;
    let path = staged_source(state.staging_dir(), &path).await?;

    let (download, media_file) = state
        .acquirer()
        .complete_download(&id, &path)
        .await
        .map_err(acquire_error)?;
    Ok(Json(CompleteResponse {
        download,
        media_file,
    }))
}

/// POST /api/v1/downloads/{id}/fail
pub async fn fail_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<FailRequest>,
) -> Result<Json<Download>, ApiError> {
    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Reported failed".to_string());

    state
        .acquirer()
        .fail_download(&id, &message)
        .await
        .map(Json)
        .map_err(acquire_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_for_url() {
        assert_eq!(protocol_for_url("magnet:?xt=urn:btih:abc"), Protocol::Torrent);
        assert_eq!(protocol_for_url("https://x/file.torrent"), Protocol::Torrent);
        assert_eq!(protocol_for_url("https://x/getnzb/abc.nzb"), Protocol::Usenet);
        assert_eq!(protocol_for_url("https://x/api?t=get&id=1"), Protocol::Usenet);
    }

    #[test]
    fn test_required_rejects_blank() {
        assert!(required(None, "book_id").is_err());
        assert!(required(Some("  ".into()), "book_id").is_err());
        assert_eq!(required(Some("b1".into()), "book_id").unwrap(), "b1");
    }
}
