//! Error types for the import pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::converter::ConverterError;
use crate::store::StoreError;

/// Errors that can occur while importing staged content.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Source file or folder not found.
    #[error("Source not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Destination already exists; imports never overwrite.
    #[error("Destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// Failed to create destination directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy file.
    #[error("Failed to copy file from {source} to {destination}")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to move/rename file.
    #[error("Failed to move file from {source} to {destination}")]
    MoveFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Some leaves of a folder import failed.
    #[error("{}", partial_message(.imported, .failed))]
    PartialFolder {
        imported: usize,
        failed: Vec<(PathBuf, String)>,
    },

    /// Source contains nothing importable.
    #[error("No importable files in {path}")]
    NothingToImport { path: PathBuf },

    /// Converter or probe failure.
    #[error("Conversion failed: {0}")]
    Converter(#[from] ConverterError),

    /// Persisting the media file failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn partial_message(imported: &usize, failed: &[(PathBuf, String)]) -> String {
    let list = failed
        .iter()
        .map(|(p, e)| format!("{} ({})", p.display(), e))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} of {} files failed to import: {}",
        failed.len(),
        failed.len() + imported,
        list
    )
}

impl ImportError {
    /// Creates a copy failed error.
    pub fn copy_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::CopyFailed {
            source,
            destination,
            error,
        }
    }

    /// Creates a move failed error.
    pub fn move_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::MoveFailed {
            source,
            destination,
            error,
        }
    }

    /// Whether the failure is a destination collision.
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::DestinationExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_folder_message_lists_failures() {
        let err = ImportError::PartialFolder {
            imported: 2,
            failed: vec![(PathBuf::from("/lib/b.mp3"), "denied".to_string())],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("1 of 3 files failed"));
        assert!(msg.contains("/lib/b.mp3 (denied)"));
    }

    #[test]
    fn test_is_collision() {
        let err = ImportError::DestinationExists {
            path: PathBuf::from("/x"),
        };
        assert!(err.is_collision());
        assert!(!ImportError::NothingToImport {
            path: PathBuf::from("/x")
        }
        .is_collision());
    }
}
