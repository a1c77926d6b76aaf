//! Repository boundary used by the acquisition engine.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use super::types::{Book, BookStatus, Download, DownloadStatus, MediaFile};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Narrow data-access boundary for books, downloads and media files.
///
/// Catalog CRUD lives elsewhere; books are only read and have their
/// status updated here, plus `upsert_book` for seeding.
pub trait LibraryStore: Send + Sync {
    fn upsert_book(&self, book: &Book) -> Result<(), StoreError>;

    fn get_book(&self, id: &str) -> Result<Option<Book>, StoreError>;

    fn set_book_status(&self, id: &str, status: BookStatus) -> Result<(), StoreError>;

    fn insert_download(&self, download: &Download) -> Result<(), StoreError>;

    fn get_download(&self, id: &str) -> Result<Option<Download>, StoreError>;

    /// Downloads, newest first, optionally restricted to one status.
    fn list_downloads(&self, status: Option<DownloadStatus>) -> Result<Vec<Download>, StoreError>;

    /// Replace a stored download with `download` (matched by id).
    fn update_download(&self, download: &Download) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    fn delete_download(&self, id: &str) -> Result<bool, StoreError>;

    fn insert_media_file(&self, file: &MediaFile) -> Result<(), StoreError>;

    fn get_media_file(&self, id: &str) -> Result<Option<MediaFile>, StoreError>;

    fn list_media_files(
        &self,
        book_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<MediaFile>, StoreError>;

    /// Set the tombstone on a media file.
    fn mark_media_file_deleted(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        recycled_path: Option<PathBuf>,
    ) -> Result<(), StoreError>;
}
