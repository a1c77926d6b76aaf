//! Types for the acquisition state machine.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::download_client::DownloadClientError;
use crate::indexer::{IndexerError, SearchResult};
use crate::library::ImportError;
use crate::quality::QualityProfile;
use crate::store::{BookStatus, Download, DownloadStatus, StoreError};

/// Errors that can occur while acquiring or tracking a download.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("book not found: {0}")]
    BookNotFound(String),

    #[error("download not found: {0}")]
    DownloadNotFound(String),

    #[error("book {0} is not monitored")]
    NotMonitored(String),

    /// Only missing books are searched for.
    #[error("book {id} is {status}, not missing")]
    NotWanted { id: String, status: BookStatus },

    #[error("no indexers configured")]
    NoIndexers,

    #[error("no download clients configured")]
    NoDownloadClients,

    /// Operation not allowed from the download's current status.
    #[error("download {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        expected: String,
        actual: DownloadStatus,
    },

    #[error("search failed: {0}")]
    Search(#[from] IndexerError),

    /// The download client refused or could not be reached.
    #[error("download client {client} failed: {source}")]
    Dispatch {
        client: String,
        #[source]
        source: DownloadClientError,
    },

    #[error("import failed: {0}")]
    Import(#[from] ImportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of an acquire attempt that did not error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AcquireOutcome {
    /// A candidate was chosen and handed to a download client.
    Found {
        result: SearchResult,
        download: Download,
    },
    /// No acceptable candidate; the book is untouched.
    NotFound {
        results_considered: usize,
        indexer_errors: HashMap<String, String>,
    },
}

/// Settings the acquirer needs from the application config.
#[derive(Debug, Clone)]
pub struct AcquireSettings {
    pub quality_profiles: Vec<QualityProfile>,
    /// Per-indexer deadline for one search.
    pub search_timeout: Duration,
}

impl AcquireSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quality_profiles: config.quality_profiles.clone(),
            search_timeout: Duration::from_secs(config.search.timeout_secs),
        }
    }
}

impl Default for AcquireSettings {
    fn default() -> Self {
        Self {
            quality_profiles: Vec::new(),
            search_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AcquireError::InvalidState {
            id: "d1".to_string(),
            expected: "downloading".to_string(),
            actual: DownloadStatus::Failed,
        };
        assert_eq!(err.to_string(), "download d1 is failed, expected downloading");

        let err = AcquireError::Dispatch {
            client: "qbit".to_string(),
            source: DownloadClientError::Rejected("full".to_string()),
        };
        assert!(err.to_string().contains("qbit"));
    }

    #[test]
    fn test_not_found_serialization() {
        let outcome = AcquireOutcome::NotFound {
            results_considered: 3,
            indexer_errors: HashMap::new(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "not_found");
        assert_eq!(json["results_considered"], 3);
    }
}
