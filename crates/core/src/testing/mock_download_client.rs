//! Mock download client for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::DownloadClientKind;
use crate::download_client::{
    extract_hash_from_magnet, AddDownloadRequest, DownloadClient, DownloadClientError,
};

/// A recorded add_download call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAdd {
    pub request: AddDownloadRequest,
    /// Id handed back to the caller.
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Mock implementation of the DownloadClient trait.
///
/// Provides controllable behavior for testing:
/// - Track submitted downloads for assertions
/// - Reject every submission, or fail just the next call
/// - Track removals
///
/// Magnet submissions get their info hash as id; anything else gets
/// `mock-N`.
#[derive(Debug, Clone)]
pub struct MockDownloadClient {
    name: String,
    kind: DownloadClientKind,
    priority: u32,
    added: Arc<RwLock<Vec<RecordedAdd>>>,
    removed: Arc<RwLock<Vec<(String, bool)>>>,
    /// If set, every add_download is rejected with this message.
    reject_with: Option<String>,
    /// If set, the next operation fails with this error.
    next_error: Arc<RwLock<Option<DownloadClientError>>>,
    counter: Arc<AtomicU32>,
}

impl MockDownloadClient {
    pub fn new(name: impl Into<String>, kind: DownloadClientKind) -> Self {
        Self {
            name: name.into(),
            kind,
            priority: 1,
            added: Arc::new(RwLock::new(Vec::new())),
            removed: Arc::new(RwLock::new(Vec::new())),
            reject_with: None,
            next_error: Arc::new(RwLock::new(None)),
            counter: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Reject every submission.
    pub fn rejecting(mut self, message: impl Into<String>) -> Self {
        self.reject_with = Some(message.into());
        self
    }

    /// Fail the next operation with `error`.
    pub async fn fail_next(&self, error: DownloadClientError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn added_downloads(&self) -> Vec<RecordedAdd> {
        self.added.read().await.clone()
    }

    /// `(id, delete_data)` for every removal.
    pub async fn removed_downloads(&self) -> Vec<(String, bool)> {
        self.removed.read().await.clone()
    }

    async fn take_error(&self) -> Option<DownloadClientError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DownloadClientKind {
        self.kind
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn test(&self) -> Result<String, DownloadClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok("mock-1.0".to_string())
    }

    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if let Some(message) = &self.reject_with {
            return Err(DownloadClientError::Rejected(message.clone()));
        }

        let id = extract_hash_from_magnet(&request.url).unwrap_or_else(|| {
            format!("mock-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        self.added.write().await.push(RecordedAdd {
            request: request.clone(),
            id: id.clone(),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.removed.write().await.push((id.to_string(), delete_data));
        Ok(())
    }
}
