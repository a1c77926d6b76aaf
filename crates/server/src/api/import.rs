//! Import API handlers.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use librarr_core::library::PendingImport;
use librarr_core::{
    AcquireError, ImportError, ImportOperation, ImportRequest, LibraryStore, MediaType,
};

use super::handlers::{acquire_error, bad_request, import_error, store_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ManualImportRequest {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub book_id: Option<String>,
    #[serde(default)]
    pub operation: Option<ImportOperation>,
    #[serde(default)]
    pub edition: Option<String>,
    /// Ebook format to convert to before placing.
    #[serde(default)]
    pub convert_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ManualImportResponse {
    pub path: PathBuf,
    pub media_file_id: String,
    pub files_imported: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub pending: Vec<PendingImport>,
    pub count: usize,
}

/// Resolve a client-supplied path and require it to lie inside the
/// staging directory. Relative paths are taken relative to staging. A path
/// that does not exist yet is resolved through its parent.
pub(super) async fn staged_source(
    staging: &FsPath,
    path: &FsPath,
) -> Result<PathBuf, ApiError> {
    let outside = || {
        bad_request(format!(
            "Path is outside the staging directory: {}",
            path.display()
        ))
    };

    let root = tokio::fs::canonicalize(staging)
        .await
        .map_err(|_| bad_request("Staging directory does not exist"))?;
    let requested = staging.join(path);

    let resolved = match tokio::fs::canonicalize(&requested).await {
        Ok(resolved) => resolved,
        Err(_) => {
            let (Some(parent), Some(name)) = (requested.parent(), requested.file_name()) else {
                return Err(outside());
            };
            tokio::fs::canonicalize(parent)
                .await
                .map_err(|_| outside())?
                .join(name)
        }
    };

    if resolved == root || !resolved.starts_with(&root) {
        return Err(outside());
    }
    Ok(resolved)
}

/// GET /api/v1/import/pending
///
/// Staged content waiting to be imported. A missing staging directory is
/// an empty list.
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PendingResponse>, ApiError> {
    let pending = match state.importer().pending(state.staging_dir()).await {
        Ok(pending) => pending,
        Err(ImportError::SourceNotFound { path }) => {
            debug!(path = %path.display(), "Staging directory missing");
            Vec::new()
        }
        Err(e) => return Err(import_error(e)),
    };
    let count = pending.len();
    Ok(Json(PendingResponse { pending, count }))
}

/// POST /api/v1/import/manual
pub async fn manual_import(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ManualImportRequest>,
) -> Result<Json<ManualImportResponse>, ApiError> {
    let path = body
        .path
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| bad_request("Missing required field: path"))?;
    let source = staged_source(state.staging_dir(), &path).await?;
    let book_id = body
        .book_id
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| bad_request("Missing required field: book_id"))?;

    let book = state
        .store()
        .get_book(&book_id)
        .map_err(store_error)?
        .ok_or_else(|| acquire_error(AcquireError::BookNotFound(book_id.clone())))?;

    // Folders are audio bundles; single files are classified by extension
    let media_type = if source.is_dir() {
        book.media_type
    } else {
        MediaType::from_path(&source).unwrap_or(book.media_type)
    };

    let request = ImportRequest {
        book_id: book.id.clone(),
        source,
        media_type,
        metadata: book.metadata(),
        operation: body.operation,
        edition: body.edition,
        convert_to: body.convert_to,
    };
    let outcome = state
        .acquirer()
        .import_manual(&request)
        .await
        .map_err(acquire_error)?;

    Ok(Json(ManualImportResponse {
        path: outcome.destination,
        media_file_id: outcome.media_file_id,
        files_imported: outcome.files_imported,
        size_bytes: outcome.size_bytes,
    }))
}

/// DELETE /api/v1/media-files/{id}
///
/// Soft delete: the file moves to the recycle bin and the record is
/// tombstoned.
pub async fn delete_media_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .importer()
        .remove_media_file(&id)
        .await
        .map_err(import_error)?;
    Ok(StatusCode::NO_CONTENT)
}
