//! Ebook conversion through calibre's `ebook-convert`.

use std::path::{Path, PathBuf};
use tracing::info;

use super::command::run_tool;
use super::config::ConverterConfig;
use super::error::ConverterError;
use crate::library::{extension_of, BookMetadata};

/// Output formats `ebook-convert` is asked to produce.
pub const EBOOK_OUTPUT_FORMATS: &[&str] = &["epub", "mobi", "azw3", "pdf", "txt", "docx", "fb2"];

/// Wraps the `ebook-convert` binary.
pub struct EbookConverter {
    config: ConverterConfig,
}

impl EbookConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds the `ebook-convert` argument list.
    pub fn build_args(input: &Path, output: &Path, metadata: Option<&BookMetadata>) -> Vec<String> {
        let mut args = vec![
            input.to_string_lossy().to_string(),
            output.to_string_lossy().to_string(),
        ];

        if let Some(meta) = metadata {
            if !meta.title.is_empty() {
                args.extend(["--title".to_string(), meta.title.clone()]);
            }
            if !meta.author.is_empty() {
                args.extend(["--authors".to_string(), meta.author.clone()]);
            }
            if let Some(series) = meta.series.as_ref().filter(|s| !s.is_empty()) {
                args.extend(["--series".to_string(), series.clone()]);
                if let Some(idx) = meta.series_index {
                    args.extend(["--series-index".to_string(), idx.to_string()]);
                }
            }
        }

        match extension_of(output).as_deref() {
            Some("mobi") | Some("azw3") => {
                args.extend(["--output-profile".to_string(), "kindle".to_string()]);
            }
            Some("epub") => {
                args.extend(["--epub-version".to_string(), "3".to_string()]);
            }
            Some("pdf") => {
                args.extend([
                    "--pdf-page-numbers".to_string(),
                    "--paper-size".to_string(),
                    "a5".to_string(),
                ]);
            }
            _ => {}
        }

        args
    }

    /// Convert `input` into `output_format`, writing next to `output_dir`.
    /// Returns the path of the produced file.
    pub async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
        output_format: &str,
        metadata: Option<&BookMetadata>,
    ) -> Result<PathBuf, ConverterError> {
        let output_format = output_format.trim_start_matches('.').to_ascii_lowercase();
        if !EBOOK_OUTPUT_FORMATS.contains(&output_format.as_str()) {
            return Err(ConverterError::invalid_input(format!(
                "unsupported output format: {}",
                output_format
            )));
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "book".to_string());
        let output = output_dir.join(format!("{}.{}", stem, output_format));
        self.convert_to(input, &output, metadata).await?;
        Ok(output)
    }

    /// Convert `input` into exactly `output`.
    pub async fn convert_to(
        &self,
        input: &Path,
        output: &Path,
        metadata: Option<&BookMetadata>,
    ) -> Result<u64, ConverterError> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                ConverterError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let args = Self::build_args(input, output, metadata);
        run_tool(
            "ebook-convert",
            &self.config.ebook_convert_path,
            &args,
            self.config.timeout_secs,
        )
        .await?;

        // ebook-convert sometimes exits 0 without writing anything
        let meta = tokio::fs::metadata(output)
            .await
            .map_err(|_| ConverterError::OutputMissing {
                path: output.to_path_buf(),
            })?;

        info!(
            input = %input.display(),
            output = %output.display(),
            size = meta.len(),
            "Ebook converted"
        );
        Ok(meta.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta() -> BookMetadata {
        BookMetadata {
            author: "Brandon Sanderson".to_string(),
            title: "The Final Empire".to_string(),
            series: Some("Mistborn".to_string()),
            series_index: Some(1.0),
        }
    }

    #[test]
    fn test_build_args_with_metadata_and_kindle_profile() {
        let args = EbookConverter::build_args(
            Path::new("/in/book.epub"),
            Path::new("/out/book.azw3"),
            Some(&meta()),
        );
        assert_eq!(args[0], "/in/book.epub");
        assert_eq!(args[1], "/out/book.azw3");
        let joined = args.join(" ");
        assert!(joined.contains("--title The Final Empire"));
        assert!(joined.contains("--authors Brandon Sanderson"));
        assert!(joined.contains("--series Mistborn"));
        assert!(joined.contains("--series-index 1"));
        assert!(joined.contains("--output-profile kindle"));
    }

    #[test]
    fn test_build_args_pdf_flags_without_metadata() {
        let args = EbookConverter::build_args(
            Path::new("a.epub"),
            Path::new("a.pdf"),
            None,
        );
        assert!(args.contains(&"--pdf-page-numbers".to_string()));
        assert!(!args.contains(&"--title".to_string()));
    }

    #[tokio::test]
    async fn test_unsupported_output_format() {
        let tmp = TempDir::new().unwrap();
        let err = EbookConverter::with_defaults()
            .convert(&tmp.path().join("a.epub"), tmp.path(), "exe", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let tmp = TempDir::new().unwrap();
        let err = EbookConverter::with_defaults()
            .convert_to(&tmp.path().join("nope.epub"), &tmp.path().join("o.mobi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.epub");
        std::fs::write(&input, b"epub").unwrap();
        let converter = EbookConverter::new(
            ConverterConfig::default().with_ebook_convert(PathBuf::from("/nonexistent/ebook-convert")),
        );
        let err = converter
            .convert_to(&input, &tmp.path().join("out.mobi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::BinaryNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_without_output_is_failure() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in.epub");
        std::fs::write(&input, b"epub").unwrap();
        let converter = EbookConverter::new(
            ConverterConfig::default().with_ebook_convert(PathBuf::from("true")),
        );
        let err = converter
            .convert_to(&input, &tmp.path().join("out.mobi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::OutputMissing { .. }));
    }
}
