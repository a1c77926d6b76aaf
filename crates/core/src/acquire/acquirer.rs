//! Search, dispatch and completion of downloads for catalog entries.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{AcquireError, AcquireOutcome, AcquireSettings};
use crate::download_client::{AddDownloadRequest, DownloadClient};
use crate::indexer::{IndexerManager, SearchOutcome, SearchQuery, SearchResult};
use crate::library::{ImportOutcome, ImportRequest, Importer};
use crate::metrics::{ACQUISITION_ATTEMPTS, DOWNLOADS_DISPATCHED, DOWNLOADS_FAILED};
use crate::quality::QualityProfile;
use crate::store::{Book, BookStatus, Download, DownloadStatus, LibraryStore, StoreError};

/// Drives a catalog entry through search, dispatch and import.
///
/// Download lifecycle:
///
/// ```text
/// downloading -> completed -> importing -> downloaded
///      \             \            \-> completed (import failed)
///       \-------------\-> failed
/// ```
///
/// Operations touching the same book are serialized with a per-book lock;
/// different books proceed concurrently.
pub struct Acquirer {
    store: Arc<dyn LibraryStore>,
    indexers: Arc<IndexerManager>,
    /// Enabled clients, lowest priority value first.
    clients: Vec<Arc<dyn DownloadClient>>,
    importer: Arc<Importer>,
    settings: AcquireSettings,
    book_locks: BookLocks,
}

type BookLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Exclusive hold on one book. The map entry is pruned on release when
/// nobody else is waiting for it.
struct BookGuard<'a> {
    locks: &'a BookLocks,
    book_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for BookGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.book_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.book_id);
        }
    }
}

impl Acquirer {
    pub fn new(
        store: Arc<dyn LibraryStore>,
        indexers: Arc<IndexerManager>,
        mut clients: Vec<Arc<dyn DownloadClient>>,
        importer: Arc<Importer>,
        settings: AcquireSettings,
    ) -> Self {
        clients.sort_by_key(|c| c.priority());
        Self {
            store,
            indexers,
            clients,
            importer,
            settings,
            book_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn indexers(&self) -> &IndexerManager {
        &self.indexers
    }

    pub fn clients(&self) -> &[Arc<dyn DownloadClient>] {
        &self.clients
    }

    pub fn client(&self, name: &str) -> Option<Arc<dyn DownloadClient>> {
        self.clients.iter().find(|c| c.name() == name).cloned()
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    pub fn settings(&self) -> &AcquireSettings {
        &self.settings
    }

    async fn lock_book(&self, book_id: &str) -> BookGuard<'_> {
        let lock = {
            let mut locks = self.book_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(book_id.to_string()).or_default().clone()
        };
        BookGuard {
            locks: &self.book_locks,
            book_id: book_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of books with a live lock entry.
    #[cfg(test)]
    fn locked_books(&self) -> usize {
        self.book_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn load_book(&self, book_id: &str) -> Result<Book, AcquireError> {
        self.store
            .get_book(book_id)?
            .ok_or_else(|| AcquireError::BookNotFound(book_id.to_string()))
    }

    fn load_download(&self, id: &str) -> Result<Download, AcquireError> {
        self.store
            .get_download(id)?
            .ok_or_else(|| AcquireError::DownloadNotFound(id.to_string()))
    }

    fn profile_for(&self, book: &Book) -> QualityProfile {
        QualityProfile::for_media_type(&self.settings.quality_profiles, book.media_type)
    }

    /// Set a book's status, tolerating a book that has since disappeared.
    fn set_book_status(&self, book_id: &str, status: BookStatus) -> Result<(), AcquireError> {
        match self.store.set_book_status(book_id, status) {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => {
                warn!(book_id = %book_id, status = %status, "Book vanished before status update");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Search all indexers for a book and rank the results under its
    /// quality profile. Changes no state.
    pub async fn search_for_book(&self, book_id: &str) -> Result<SearchOutcome, AcquireError> {
        let book = self.load_book(book_id)?;
        if self.indexers.is_empty() {
            return Err(AcquireError::NoIndexers);
        }
        self.search(&book).await
    }

    async fn search(&self, book: &Book) -> Result<SearchOutcome, AcquireError> {
        let mut outcome = self.search_raw(book).await?;
        outcome.results = self.profile_for(book).rank(outcome.results);
        Ok(outcome)
    }

    async fn search_raw(&self, book: &Book) -> Result<SearchOutcome, AcquireError> {
        let query = SearchQuery {
            title: book.title.clone(),
            author: Some(book.author.clone()).filter(|a| !a.trim().is_empty()),
            isbn: book.isbn.clone(),
            book_id: Some(book.id.clone()),
            media_type: book.media_type,
        };
        Ok(self
            .indexers
            .search_all(&query, self.settings.search_timeout)
            .await?)
    }

    /// Search for a book and dispatch the best candidate.
    ///
    /// Configuration is checked before any network call. Finding nothing
    /// acceptable is not an error and leaves the book untouched.
    pub async fn acquire(&self, book_id: &str) -> Result<AcquireOutcome, AcquireError> {
        let _guard = self.lock_book(book_id).await;

        let book = self.load_book(book_id)?;
        if !book.monitored {
            return Err(AcquireError::NotMonitored(book.id));
        }
        if book.status != BookStatus::Missing {
            return Err(AcquireError::NotWanted {
                id: book.id,
                status: book.status,
            });
        }
        if self.indexers.is_empty() {
            return Err(AcquireError::NoIndexers);
        }
        if self.clients.is_empty() {
            return Err(AcquireError::NoDownloadClients);
        }

        let outcome = match self.search_raw(&book).await {
            Ok(outcome) => outcome,
            Err(e) => {
                ACQUISITION_ATTEMPTS.with_label_values(&["failed"]).inc();
                return Err(e);
            }
        };

        let Some(best) = self.profile_for(&book).best(&outcome.results).cloned() else {
            ACQUISITION_ATTEMPTS.with_label_values(&["not_found"]).inc();
            info!(
                book_id = %book_id,
                indexer_errors = outcome.indexer_errors.len(),
                "No acceptable result found"
            );
            return Ok(AcquireOutcome::NotFound {
                results_considered: outcome.results.len(),
                indexer_errors: outcome.indexer_errors,
            });
        };

        match self.dispatch_locked(&book, &best).await {
            Ok(download) => {
                ACQUISITION_ATTEMPTS.with_label_values(&["dispatched"]).inc();
                Ok(AcquireOutcome::Found {
                    result: best,
                    download,
                })
            }
            Err(e) => {
                ACQUISITION_ATTEMPTS.with_label_values(&["failed"]).inc();
                Err(e)
            }
        }
    }

    /// Hand a chosen result to a download client and record the download.
    pub async fn dispatch(&self, book_id: &str, result: &SearchResult) -> Result<Download, AcquireError> {
        let _guard = self.lock_book(book_id).await;

        let book = self.load_book(book_id)?;
        self.dispatch_locked(&book, result).await
    }

    /// First enabled client speaking the result's protocol, else the first
    /// enabled client.
    fn select_client(&self, result: &SearchResult) -> Option<&Arc<dyn DownloadClient>> {
        self.clients
            .iter()
            .find(|c| c.protocol() == result.protocol)
            .or_else(|| self.clients.first())
    }

    async fn dispatch_locked(&self, book: &Book, result: &SearchResult) -> Result<Download, AcquireError> {
        let client = self
            .select_client(result)
            .ok_or(AcquireError::NoDownloadClients)?;

        let request = AddDownloadRequest::from_result(result);
        let external_id = match client.add_download(&request).await {
            Ok(id) => id,
            Err(e) => {
                DOWNLOADS_DISPATCHED
                    .with_label_values(&[client.name(), "failed"])
                    .inc();
                warn!(
                    book_id = %book.id,
                    client = %client.name(),
                    title = %result.title,
                    error = %e,
                    "Download client rejected dispatch"
                );
                return Err(AcquireError::Dispatch {
                    client: client.name().to_string(),
                    source: e,
                });
            }
        };

        let download = Download {
            id: Uuid::new_v4().to_string(),
            book_id: book.id.clone(),
            client_name: client.name().to_string(),
            external_id,
            media_type: book.media_type,
            title: result.title.clone(),
            download_url: result.download_url.clone(),
            indexer: Some(result.indexer.clone()),
            size_bytes: result.size_bytes,
            bytes_downloaded: 0,
            status: DownloadStatus::Downloading,
            category: request.category.clone(),
            error_message: None,
            added_at: Utc::now(),
            completed_at: None,
        };
        self.store.insert_download(&download)?;
        self.set_book_status(&book.id, BookStatus::Downloading)?;

        DOWNLOADS_DISPATCHED
            .with_label_values(&[client.name(), "success"])
            .inc();
        info!(
            book_id = %book.id,
            download_id = %download.id,
            client = %client.name(),
            external_id = %download.external_id,
            title = %download.title,
            "Download dispatched"
        );
        Ok(download)
    }

    fn transition(&self, download: &mut Download, next: DownloadStatus) -> Result<(), AcquireError> {
        if !download.status.can_transition_to(next) {
            return Err(AcquireError::InvalidState {
                id: download.id.clone(),
                expected: format!("a status that can become {}", next),
                actual: download.status,
            });
        }
        debug!(download_id = %download.id, from = %download.status, to = %next, "Download transition");
        download.status = next;
        self.store.update_download(download)?;
        Ok(())
    }

    /// Record that a transfer finished at `staged_path` and import it.
    ///
    /// On import failure the download goes back to `completed` with the
    /// error recorded; it is not retried automatically.
    pub async fn complete_download(
        &self,
        download_id: &str,
        staged_path: &Path,
    ) -> Result<(Download, ImportOutcome), AcquireError> {
        let book_id = self.load_download(download_id)?.book_id;
        let _guard = self.lock_book(&book_id).await;

        let mut download = self.load_download(download_id)?;
        match download.status {
            DownloadStatus::Downloading => {
                download.completed_at = Some(Utc::now());
                download.bytes_downloaded = download.size_bytes;
                self.transition(&mut download, DownloadStatus::Completed)?;
            }
            DownloadStatus::Completed => {}
            actual => {
                return Err(AcquireError::InvalidState {
                    id: download.id,
                    expected: "downloading or completed".to_string(),
                    actual,
                })
            }
        }

        let book = self.load_book(&download.book_id)?;
        download.error_message = None;
        self.transition(&mut download, DownloadStatus::Importing)?;

        let request = ImportRequest {
            book_id: book.id.clone(),
            source: staged_path.to_path_buf(),
            media_type: download.media_type,
            metadata: book.metadata(),
            operation: None,
            edition: None,
            convert_to: None,
        };

        match self.importer.import(&request).await {
            Ok(outcome) => {
                self.transition(&mut download, DownloadStatus::Downloaded)?;
                info!(
                    download_id = %download.id,
                    book_id = %book.id,
                    media_file_id = %outcome.media_file_id,
                    "Download imported"
                );
                Ok((download, outcome))
            }
            Err(e) => {
                download.error_message = Some(e.to_string());
                self.transition(&mut download, DownloadStatus::Completed)?;
                Err(e.into())
            }
        }
    }

    /// Import staged content for a book outside any tracked download.
    ///
    /// Holds the book's lock so it cannot interleave with a completion
    /// importing into the same destination.
    pub async fn import_manual(
        &self,
        request: &ImportRequest,
    ) -> Result<ImportOutcome, AcquireError> {
        let _guard = self.lock_book(&request.book_id).await;
        self.load_book(&request.book_id)?;

        let outcome = self.importer.import(request).await?;
        info!(
            book_id = %request.book_id,
            media_file_id = %outcome.media_file_id,
            "Manual import finished"
        );
        Ok(outcome)
    }

    /// Mark a transfer failed and put the book back to missing.
    pub async fn fail_download(&self, download_id: &str, message: &str) -> Result<Download, AcquireError> {
        let book_id = self.load_download(download_id)?.book_id;
        let _guard = self.lock_book(&book_id).await;

        let mut download = self.load_download(download_id)?;
        download.error_message = Some(message.to_string());
        self.transition(&mut download, DownloadStatus::Failed)?;
        self.set_book_status(&download.book_id, BookStatus::Missing)?;

        DOWNLOADS_FAILED.inc();
        warn!(download_id = %download.id, book_id = %download.book_id, message = %message, "Download failed");
        Ok(download)
    }

    /// Remove a download from its client (best effort) and forget it.
    pub async fn cancel_download(&self, download_id: &str, delete_data: bool) -> Result<(), AcquireError> {
        let book_id = self.load_download(download_id)?.book_id;
        let _guard = self.lock_book(&book_id).await;

        let download = self.load_download(download_id)?;
        match self.client(&download.client_name) {
            Some(client) => {
                if let Err(e) = client.remove_download(&download.external_id, delete_data).await {
                    warn!(
                        download_id = %download.id,
                        client = %download.client_name,
                        error = %e,
                        "Failed to remove download from client"
                    );
                }
            }
            None => warn!(
                download_id = %download.id,
                client = %download.client_name,
                "Download client no longer configured"
            ),
        }

        self.store.delete_download(&download.id)?;
        if let Some(book) = self.store.get_book(&download.book_id)? {
            if book.status != BookStatus::Downloaded {
                self.set_book_status(&book.id, BookStatus::Missing)?;
            }
        }
        info!(download_id = %download.id, delete_data, "Download cancelled");
        Ok(())
    }

    pub fn list_downloads(&self, status: Option<DownloadStatus>) -> Result<Vec<Download>, AcquireError> {
        Ok(self.store.list_downloads(status)?)
    }

    pub fn get_download(&self, id: &str) -> Result<Download, AcquireError> {
        self.load_download(id)
    }
}
