//! Types shared by the import pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Extensions treated as ebooks.
pub const EBOOK_EXTENSIONS: &[&str] = &[
    "epub", "pdf", "mobi", "azw", "azw3", "djvu", "fb2", "cbz", "cbr", "txt", "rtf", "doc",
    "docx",
];

/// Extensions treated as audiobook parts.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "m4b", "aac", "flac", "ogg", "opus", "wma", "wav",
];

/// Kind of media a catalog entry or file represents.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Ebook,
    Audiobook,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Ebook => "ebook",
            MediaType::Audiobook => "audiobook",
        }
    }

    /// Classify a file by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_of(path)?;
        if EBOOK_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Ebook)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaType::Audiobook)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ebook" | "book" => Ok(MediaType::Ebook),
            "audiobook" | "audio" => Ok(MediaType::Audiobook),
            _ => Err(format!("Unknown media type: {}", s)),
        }
    }
}

/// Lowercased extension of a path, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// How a staged file is brought into the library.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportOperation {
    /// Rename, falling back to copy + delete across filesystems.
    Move,
    /// Byte copy; the staged file stays.
    Copy,
    /// Hard link, falling back to copy when linking fails.
    #[default]
    Hardlink,
}

impl fmt::Display for ImportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportOperation::Move => write!(f, "move"),
            ImportOperation::Copy => write!(f, "copy"),
            ImportOperation::Hardlink => write!(f, "hardlink"),
        }
    }
}

/// Author/title/series guessed from a file or folder name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_index: Option<f32>,
}

/// A staged artifact that has not been imported yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingImport {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    /// Lowercased extension; for folders the dominant audio extension.
    pub format: String,
    pub media_type: MediaType,
    pub is_folder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_index: Option<f32>,
}

/// Book metadata needed to place a file in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub author: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_index: Option<f32>,
}

/// Request to import one staged file or folder for a catalog entry.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub book_id: String,
    pub source: PathBuf,
    pub media_type: MediaType,
    pub metadata: BookMetadata,
    /// Overrides the configured operation.
    pub operation: Option<ImportOperation>,
    /// Edition label stored on the media file (e.g. "Unabridged").
    pub edition: Option<String>,
    /// Convert a single ebook to this format before placing it.
    pub convert_to: Option<String>,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub media_file_id: String,
    pub destination: PathBuf,
    pub files_imported: usize,
    pub size_bytes: u64,
}
