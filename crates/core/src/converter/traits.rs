//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::audiobook::AudioInfo;
use super::error::ConverterError;

/// Reads duration, bitrate and chapters from an audio file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Returns the name of this probe implementation.
    fn name(&self) -> &str;

    /// Probes an audio file.
    async fn probe(&self, path: &Path) -> Result<AudioInfo, ConverterError>;
}
