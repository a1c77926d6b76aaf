//! Types for download client operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DownloadClientKind, Protocol};
use crate::indexer::SearchResult;

/// Errors that can occur while talking to a download client.
#[derive(Debug, Error)]
pub enum DownloadClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    /// The response could not be understood at all.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The client answered but refused the download.
    #[error("Download rejected: {0}")]
    Rejected(String),

    #[error("Download not found: {0}")]
    NotFound(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DownloadClientError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadClientError::Timeout
        } else if e.is_connect() {
            DownloadClientError::ConnectionFailed(e.to_string())
        } else {
            DownloadClientError::ApiError(e.to_string())
        }
    }

    /// Transient failures a caller may reasonably try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadClientError::ConnectionFailed(_) | DownloadClientError::Timeout
        )
    }
}

/// What to hand to a download client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddDownloadRequest {
    /// Magnet URI, .torrent URL or NZB URL.
    pub url: String,
    /// Display name, used by usenet clients as the job name.
    pub title: String,
    /// Overrides the client's configured category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub protocol: Protocol,
}

impl AddDownloadRequest {
    pub fn new(url: impl Into<String>, title: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            category: None,
            protocol,
        }
    }

    pub fn from_result(result: &SearchResult) -> Self {
        Self::new(&result.download_url, &result.title, result.protocol)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn is_magnet(&self) -> bool {
        self.url.starts_with("magnet:")
    }
}

/// Trait for download client backends.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Configured client name.
    fn name(&self) -> &str;

    fn kind(&self) -> DownloadClientKind;

    /// Lower is preferred when dispatching.
    fn priority(&self) -> u32;

    fn protocol(&self) -> Protocol {
        self.kind().protocol()
    }

    /// Check connectivity and credentials; returns the client version.
    async fn test(&self) -> Result<String, DownloadClientError>;

    /// Submit a download; returns the client's id for it.
    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError>;

    /// Remove a download, optionally with its data.
    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError>;
}

/// Extract the lowercase info hash from a magnet URI.
pub fn extract_hash_from_magnet(magnet: &str) -> Option<String> {
    let (_, query) = magnet.strip_prefix("magnet:")?.split_once('?')?;
    query
        .split('&')
        .find_map(|param| param.strip_prefix("xt=urn:btih:"))
        .filter(|hash| !hash.is_empty())
        .map(|hash| hash.to_lowercase())
}

/// Keep error bodies short in messages.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
