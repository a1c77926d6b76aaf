//! Records persisted by the acquisition engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::library::{BookMetadata, MediaType};

/// Whether a catalog entry has a file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    #[default]
    Missing,
    Downloading,
    Downloaded,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Missing => "missing",
            BookStatus::Downloading => "downloading",
            BookStatus::Downloaded => "downloaded",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(BookStatus::Missing),
            "downloading" => Ok(BookStatus::Downloading),
            "downloaded" => Ok(BookStatus::Downloaded),
            other => Err(format!("unknown book status: {}", other)),
        }
    }
}

/// The slice of a catalog entry the engine needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_index: Option<f32>,
    pub media_type: MediaType,
    #[serde(default)]
    pub status: BookStatus,
    #[serde(default = "default_monitored")]
    pub monitored: bool,
}

fn default_monitored() -> bool {
    true
}

impl Book {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        media_type: MediaType,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            isbn: None,
            series: None,
            series_index: None,
            media_type,
            status: BookStatus::Missing,
            monitored: true,
        }
    }

    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            author: self.author.clone(),
            title: self.title.clone(),
            series: self.series.clone(),
            series_index: self.series_index,
        }
    }
}

/// Lifecycle of a transfer.
///
/// `queued -> downloading -> completed -> importing -> downloaded`, with
/// `failed` reachable from any non-terminal state and `importing ->
/// completed` when an import fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Importing,
    Downloaded,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Importing => "importing",
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded | DownloadStatus::Failed)
    }

    pub fn can_transition_to(&self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        matches!(
            (self, next),
            (Queued, Downloading)
                | (Downloading, Completed)
                | (Completed, Importing)
                | (Importing, Downloaded)
                | (Importing, Completed)
                | (Queued | Downloading | Completed | Importing, Failed)
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DownloadStatus::Queued),
            "downloading" => Ok(DownloadStatus::Downloading),
            "completed" => Ok(DownloadStatus::Completed),
            "importing" => Ok(DownloadStatus::Importing),
            "downloaded" => Ok(DownloadStatus::Downloaded),
            "failed" => Ok(DownloadStatus::Failed),
            other => Err(format!("unknown download status: {}", other)),
        }
    }
}

/// One transfer handed to a download client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Download {
    pub id: String,
    pub book_id: String,
    pub client_name: String,
    /// Id the download client knows the transfer by.
    pub external_id: String,
    pub media_type: MediaType,
    pub title: String,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexer: Option<String>,
    pub size_bytes: u64,
    pub bytes_downloaded: u64,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A file imported into the library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaFile {
    pub id: String,
    pub book_id: String,
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
    pub format: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    pub imported_at: DateTime<Utc>,
    /// Tombstone; set when the file was moved to the recycle bin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycled_path: Option<PathBuf>,
}

impl MediaFile {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
