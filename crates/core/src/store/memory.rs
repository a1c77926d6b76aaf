//! In-memory store for tests and ephemeral runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::traits::{LibraryStore, StoreError};
use super::types::{Book, BookStatus, Download, DownloadStatus, MediaFile};

#[derive(Default)]
struct Tables {
    books: HashMap<String, Book>,
    downloads: HashMap<String, Download>,
    media_files: HashMap<String, MediaFile>,
}

/// [`LibraryStore`] backed by hash maps behind a lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))
    }
}

impl LibraryStore for MemoryStore {
    fn upsert_book(&self, book: &Book) -> Result<(), StoreError> {
        self.write()?.books.insert(book.id.clone(), book.clone());
        Ok(())
    }

    fn get_book(&self, id: &str) -> Result<Option<Book>, StoreError> {
        Ok(self.read()?.books.get(id).cloned())
    }

    fn set_book_status(&self, id: &str, status: BookStatus) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let book = tables
            .books
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("book", id))?;
        book.status = status;
        Ok(())
    }

    fn insert_download(&self, download: &Download) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.downloads.contains_key(&download.id) {
            return Err(StoreError::AlreadyExists {
                entity: "download",
                id: download.id.clone(),
            });
        }
        tables
            .downloads
            .insert(download.id.clone(), download.clone());
        Ok(())
    }

    fn get_download(&self, id: &str) -> Result<Option<Download>, StoreError> {
        Ok(self.read()?.downloads.get(id).cloned())
    }

    fn list_downloads(&self, status: Option<DownloadStatus>) -> Result<Vec<Download>, StoreError> {
        let tables = self.read()?;
        let mut downloads: Vec<Download> = tables
            .downloads
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        downloads.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(downloads)
    }

    fn update_download(&self, download: &Download) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.downloads.get_mut(&download.id) {
            Some(existing) => {
                *existing = download.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("download", &download.id)),
        }
    }

    fn delete_download(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.downloads.remove(id).is_some())
    }

    fn insert_media_file(&self, file: &MediaFile) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let path_taken = tables
            .media_files
            .values()
            .any(|f| !f.is_deleted() && f.path == file.path);
        if path_taken || tables.media_files.contains_key(&file.id) {
            return Err(StoreError::AlreadyExists {
                entity: "media file",
                id: file.path.display().to_string(),
            });
        }
        tables.media_files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    fn get_media_file(&self, id: &str) -> Result<Option<MediaFile>, StoreError> {
        Ok(self.read()?.media_files.get(id).cloned())
    }

    fn list_media_files(
        &self,
        book_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<MediaFile>, StoreError> {
        let tables = self.read()?;
        let mut files: Vec<MediaFile> = tables
            .media_files
            .values()
            .filter(|f| f.book_id == book_id && (include_deleted || !f.is_deleted()))
            .cloned()
            .collect();
        files.sort_by(|a, b| a.imported_at.cmp(&b.imported_at));
        Ok(files)
    }

    fn mark_media_file_deleted(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        recycled_path: Option<PathBuf>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let file = tables
            .media_files
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("media file", id))?;
        file.deleted_at = Some(deleted_at);
        file.recycled_path = recycled_path;
        Ok(())
    }
}
