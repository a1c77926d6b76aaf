//! Types for the indexer search system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::{IndexerKind, Protocol};
use crate::library::MediaType;

/// What to look for. Built from a catalog entry or from free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// Catalog entry this search is for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
}

impl SearchQuery {
    /// Free-text query with no catalog entry attached.
    pub fn free_text(text: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            title: text.into(),
            author: None,
            isbn: None,
            book_id: None,
            media_type,
        }
    }

    /// "title author", the form most indexers expect.
    pub fn terms(&self) -> String {
        match self.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(author) => format!("{} {}", self.title.trim(), author),
            None => self.title.trim().to_string(),
        }
    }
}

/// A candidate release returned by one indexer.
///
/// Results are never cached; they live only for the search call that
/// produced them and whatever dispatch follows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Which indexer returned this result.
    pub indexer: String,
    pub title: String,
    pub size_bytes: u64,
    /// Uppercased format, e.g. "EPUB" or "M4B", when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    #[serde(default)]
    pub seeders: u32,
    #[serde(default)]
    pub leechers: u32,
    /// Magnet URI, .torrent URL or NZB URL.
    pub download_url: String,
    #[serde(default)]
    pub freeleech: bool,
    #[serde(default)]
    pub vip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    pub protocol: Protocol,
}

impl SearchResult {
    /// Minimal result; adapters fill in the rest.
    pub fn new(
        indexer: impl Into<String>,
        title: impl Into<String>,
        download_url: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        let title = title.into();
        Self {
            indexer: indexer.into(),
            format: detect_format(&title),
            title,
            size_bytes: 0,
            bitrate_kbps: None,
            seeders: 0,
            leechers: 0,
            download_url: download_url.into(),
            freeleech: false,
            vip: false,
            language: None,
            publish_date: None,
            protocol,
        }
    }
}

/// Aggregate of one fan-out search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: SearchQuery,
    /// Results in indexer priority order.
    pub results: Vec<SearchResult>,
    /// How long the search took in milliseconds.
    pub duration_ms: u64,
    /// Indexers that failed or timed out (name -> error message).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub indexer_errors: HashMap<String, String>,
}

/// Errors that can occur during search operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Indexer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Indexer rejected credentials: {0}")]
    AuthFailed(String),

    #[error("Indexer API error: {0}")]
    ApiError(String),

    #[error("Failed to parse indexer response: {0}")]
    ParseError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Indexer not found: {0}")]
    NotFound(String),

    #[error("No indexers configured")]
    NoIndexers,

    #[error("All indexers failed")]
    AllFailed(HashMap<String, String>),

    #[error("Invalid indexer configuration: {0}")]
    InvalidConfig(String),
}

impl IndexerError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IndexerError::Timeout
        } else if e.is_connect() {
            IndexerError::ConnectionFailed(e.to_string())
        } else {
            IndexerError::ApiError(e.to_string())
        }
    }

    /// Transient failures worth a caller-driven retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexerError::Timeout | IndexerError::ConnectionFailed(_)
        )
    }
}

/// A configured search source.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Configured name, used in logs and error maps.
    fn name(&self) -> &str;

    fn kind(&self) -> IndexerKind;

    /// Lower is searched and ranked first.
    fn priority(&self) -> u32;

    /// Connectivity and credential probe.
    async fn test(&self) -> Result<(), IndexerError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexerError>;
}

/// Formats recognised in release titles. Plain-text and word-processor
/// extensions are left out since they collide with ordinary words.
const TITLE_FORMATS: &[&str] = &[
    "epub", "azw3", "azw", "mobi", "pdf", "djvu", "fb2", "cbz", "cbr", "m4b", "m4a", "mp3",
    "flac", "opus", "ogg", "aac",
];

/// Guess a release's format from its title.
///
/// Looks at whole tokens so "Epubs for Dummies" does not count, and
/// returns the first known format that appears.
pub fn detect_format(title: &str) -> Option<String> {
    let lower = title.to_ascii_lowercase();
    lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .find(|token| TITLE_FORMATS.contains(token))
        .map(|t| t.to_ascii_uppercase())
}

/// Parse human-readable sizes like "1.5 GB", "700 MiB" or "12,345 KB".
/// Units are binary (1 KB = 1024 bytes). A bare number is bytes.
pub fn parse_size(text: &str) -> Option<u64> {
    let cleaned: String = text.trim().replace(',', "");
    let split = cleaned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(cleaned.len());
    let (number, unit) = cleaned.split_at(split);
    let value: f64 = number.trim().parse().ok()?;
    if value < 0.0 {
        return None;
    }

    let multiplier: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" | "bytes" => 1.0,
        "kb" | "kib" | "k" => 1024.0,
        "mb" | "mib" | "m" => 1024.0 * 1024.0,
        "gb" | "gib" | "g" => 1024.0 * 1024.0 * 1024.0,
        "tb" | "tib" | "t" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some((value * multiplier).round() as u64)
}
