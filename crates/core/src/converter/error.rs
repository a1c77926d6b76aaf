//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running an external conversion tool.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Tool binary not found.
    #[error("{tool} not found at path: {path}")]
    BinaryNotFound { tool: String, path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed { path: PathBuf },

    /// Tool exited with a non-zero status.
    #[error("Conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Tool exited cleanly but produced nothing.
    #[error("Conversion reported success but produced no output: {path}")]
    OutputMissing { path: PathBuf },

    /// Conversion timed out.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Request cannot be carried out (no inputs, no chapters, ...).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse tool output.
    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },
}

impl ConverterError {
    /// Creates a new conversion failed error with stderr output.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new invalid input error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }
}
