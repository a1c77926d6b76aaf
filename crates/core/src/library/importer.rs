//! Places staged content into the library and records it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::error::ImportError;
use super::file_ops::FileOperator;
use super::path_builder::PathBuilder;
use super::scanner::Scanner;
use super::types::{
    extension_of, ImportOperation, ImportOutcome, ImportRequest, MediaType, PendingImport,
    AUDIO_EXTENSIONS, EBOOK_EXTENSIONS,
};
use crate::converter::{EbookConverter, MediaProbe};
use crate::metrics::{CONVERSIONS_TOTAL, IMPORTED_BYTES, IMPORTS_TOTAL};
use crate::store::{BookStatus, LibraryStore, MediaFile, StoreError};

/// Audio properties gathered after placement.
#[derive(Debug, Default)]
struct ProbedAudio {
    bitrate_kbps: Option<u32>,
    duration_secs: Option<f64>,
}

/// Import pipeline: resolve destination, place files, record a [`MediaFile`].
///
/// Not safe to run concurrently for the same destination; callers
/// serialize imports per book.
pub struct Importer {
    paths: PathBuilder,
    files: FileOperator,
    scanner: Scanner,
    store: Arc<dyn LibraryStore>,
    recycle_dir: PathBuf,
    probe: Option<Arc<dyn MediaProbe>>,
    ebook_converter: Option<EbookConverter>,
    work_dir: PathBuf,
}

impl Importer {
    pub fn new(
        paths: PathBuilder,
        files: FileOperator,
        store: Arc<dyn LibraryStore>,
        recycle_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            paths,
            files,
            scanner: Scanner::new(),
            store,
            recycle_dir: recycle_dir.into(),
            probe: None,
            ebook_converter: None,
            work_dir: std::env::temp_dir().join("librarr-import"),
        }
    }

    /// Probe audio imports for bitrate and duration.
    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Enable `convert_to` on ebook imports. Converted output is staged
    /// under `work_dir` before it is moved into the library.
    pub fn with_ebook_converter(
        mut self,
        converter: EbookConverter,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        self.ebook_converter = Some(converter);
        self.work_dir = work_dir.into();
        self
    }

    pub fn path_builder(&self) -> &PathBuilder {
        &self.paths
    }

    /// List staged candidates under `root`.
    pub async fn pending(&self, root: &Path) -> Result<Vec<PendingImport>, ImportError> {
        self.scanner.scan(root).await
    }

    /// Import one staged file or folder for a book.
    pub async fn import(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let result = self.import_inner(request).await;
        let label = if result.is_ok() { "success" } else { "failed" };
        IMPORTS_TOTAL
            .with_label_values(&[request.media_type.as_str(), label])
            .inc();

        match &result {
            Ok(outcome) => {
                IMPORTED_BYTES.inc_by(outcome.size_bytes);
                info!(
                    book_id = %request.book_id,
                    destination = %outcome.destination.display(),
                    files = outcome.files_imported,
                    "Imported into library"
                );
            }
            Err(e) => {
                error!(
                    book_id = %request.book_id,
                    source = %request.source.display(),
                    error = %e,
                    "Import failed"
                );
            }
        }
        result
    }

    async fn import_inner(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let meta = fs::metadata(&request.source)
            .await
            .map_err(|_| ImportError::SourceNotFound {
                path: request.source.clone(),
            })?;

        let files = match request.operation {
            Some(op) => self.files.with_operation(op),
            None => self.files.clone(),
        };

        let placed = if meta.is_dir() {
            self.place_folder(&files, request).await?
        } else {
            self.place_file(&files, request).await?
        };

        let filename = placed
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let media_file = MediaFile {
            id: uuid::Uuid::new_v4().to_string(),
            book_id: request.book_id.clone(),
            path: placed.destination.clone(),
            filename,
            size_bytes: placed.size_bytes,
            format: placed.format,
            media_type: request.media_type,
            bitrate_kbps: placed.audio.bitrate_kbps,
            duration_secs: placed.audio.duration_secs,
            edition: request.edition.clone(),
            imported_at: Utc::now(),
            deleted_at: None,
            recycled_path: None,
        };
        self.store.insert_media_file(&media_file)?;

        match self
            .store
            .set_book_status(&request.book_id, BookStatus::Downloaded)
        {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                warn!(book_id = %request.book_id, "Imported file for unknown book");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(ImportOutcome {
            media_file_id: media_file.id,
            destination: placed.destination,
            files_imported: placed.files_imported,
            size_bytes: placed.size_bytes,
        })
    }

    async fn place_file(
        &self,
        files: &FileOperator,
        request: &ImportRequest,
    ) -> Result<Placed, ImportError> {
        if let Some(target) = request.convert_to.as_deref() {
            return self.place_converted(request, target).await;
        }

        let ext = extension_of(&request.source).ok_or_else(|| ImportError::NothingToImport {
            path: request.source.clone(),
        })?;
        let destination = self
            .paths
            .file_path(request.media_type, &request.metadata, &ext);

        let size_bytes = files.import_file(&request.source, &destination).await?;
        let audio = if request.media_type == MediaType::Audiobook {
            self.probe_all(std::slice::from_ref(&destination)).await
        } else {
            ProbedAudio::default()
        };

        Ok(Placed {
            destination,
            size_bytes,
            files_imported: 1,
            format: ext,
            audio,
        })
    }

    async fn place_converted(
        &self,
        request: &ImportRequest,
        target: &str,
    ) -> Result<Placed, ImportError> {
        let converter = self.ebook_converter.as_ref().ok_or_else(|| {
            ImportError::Converter(crate::converter::ConverterError::invalid_input(
                "ebook conversion is not configured",
            ))
        })?;

        let ext = target.trim_start_matches('.').to_ascii_lowercase();
        let destination = self
            .paths
            .file_path(request.media_type, &request.metadata, &ext);
        if fs::symlink_metadata(&destination).await.is_ok() {
            return Err(ImportError::DestinationExists { path: destination });
        }

        let scratch = self.work_dir.join(uuid::Uuid::new_v4().to_string());
        let converted = converter
            .convert(&request.source, &scratch, &ext, Some(&request.metadata))
            .await;
        CONVERSIONS_TOTAL
            .with_label_values(&[
                "ebook-convert",
                if converted.is_ok() { "success" } else { "failed" },
            ])
            .inc();

        let placed = match converted {
            Ok(output) => {
                self.files
                    .with_operation(ImportOperation::Move)
                    .import_file(&output, &destination)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        let _ = fs::remove_dir_all(&scratch).await;

        Ok(Placed {
            destination,
            size_bytes: placed?,
            files_imported: 1,
            format: ext,
            audio: ProbedAudio::default(),
        })
    }

    async fn place_folder(
        &self,
        files: &FileOperator,
        request: &ImportRequest,
    ) -> Result<Placed, ImportError> {
        let destination = self.paths.book_dir(request.media_type, &request.metadata);
        let report = files.import_folder(&request.source, &destination).await?;

        if !report.is_complete() {
            return Err(ImportError::PartialFolder {
                imported: report.imported.len(),
                failed: report.failed,
            });
        }

        let leaves: Vec<PathBuf> = report.imported.iter().map(|(p, _)| p.clone()).collect();
        let format = dominant_format(&leaves, request.media_type);
        let audio = if request.media_type == MediaType::Audiobook {
            let audio_leaves: Vec<PathBuf> = leaves
                .iter()
                .filter(|p| {
                    extension_of(p)
                        .map(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            self.probe_all(&audio_leaves).await
        } else {
            ProbedAudio::default()
        };

        Ok(Placed {
            destination,
            size_bytes: report.total_bytes(),
            files_imported: report.imported.len(),
            format,
            audio,
        })
    }

    /// Sum durations and take the first known bitrate. Probe failures are
    /// logged and otherwise ignored.
    async fn probe_all(&self, paths: &[PathBuf]) -> ProbedAudio {
        let Some(probe) = &self.probe else {
            return ProbedAudio::default();
        };

        let mut audio = ProbedAudio::default();
        for path in paths {
            match probe.probe(path).await {
                Ok(info) => {
                    audio.duration_secs = Some(audio.duration_secs.unwrap_or(0.0) + info.duration_secs);
                    if audio.bitrate_kbps.is_none() {
                        audio.bitrate_kbps = info.bitrate_kbps;
                    }
                }
                Err(e) => {
                    debug!(path = %path.display(), probe = probe.name(), error = %e, "Probe failed");
                }
            }
        }
        audio
    }

    /// Soft-delete an imported media file: move it to the recycle bin and
    /// tombstone the record.
    pub async fn remove_media_file(&self, id: &str) -> Result<MediaFile, ImportError> {
        let mut file = self
            .store
            .get_media_file(id)?
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| StoreError::not_found("media file", id))?;

        let recycled = match self.files.soft_delete(&file.path, &self.recycle_dir).await {
            Ok(path) => Some(path),
            Err(ImportError::SourceNotFound { .. }) => {
                warn!(path = %file.path.display(), "Media file already gone from disk");
                None
            }
            Err(e) => return Err(e),
        };

        let deleted_at = Utc::now();
        self.store
            .mark_media_file_deleted(id, deleted_at, recycled.clone())?;

        if self.store.list_media_files(&file.book_id, false)?.is_empty() {
            if let Err(e) = self.store.set_book_status(&file.book_id, BookStatus::Missing) {
                debug!(book_id = %file.book_id, error = %e, "Could not reset book status");
            }
        }

        info!(id = %id, recycled = ?recycled, "Media file moved to recycle bin");
        file.deleted_at = Some(deleted_at);
        file.recycled_path = recycled;
        Ok(file)
    }
}

struct Placed {
    destination: PathBuf,
    size_bytes: u64,
    files_imported: usize,
    format: String,
    audio: ProbedAudio,
}

/// Most common extension among files matching the media type; falls back
/// to the most common extension overall.
fn dominant_format(files: &[PathBuf], media_type: MediaType) -> String {
    let known = match media_type {
        MediaType::Ebook => EBOOK_EXTENSIONS,
        MediaType::Audiobook => AUDIO_EXTENSIONS,
    };

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut fallback: HashMap<String, usize> = HashMap::new();
    for ext in files.iter().filter_map(|p| extension_of(p)) {
        if known.contains(&ext.as_str()) {
            *counts.entry(ext.clone()).or_default() += 1;
        }
        *fallback.entry(ext).or_default() += 1;
    }

    let pick = |map: HashMap<String, usize>| {
        map.into_iter()
            .max_by(|(a_ext, a), (b_ext, b)| a.cmp(b).then_with(|| b_ext.cmp(a_ext)))
            .map(|(ext, _)| ext)
    };
    pick(counts)
        .or_else(|| pick(fallback))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{AudioInfo, ConverterError};
    use crate::library::BookMetadata;
    use crate::store::{Book, MemoryStore};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedProbe;

    #[async_trait]
    impl MediaProbe for FixedProbe {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn probe(&self, path: &Path) -> Result<AudioInfo, ConverterError> {
            Ok(AudioInfo {
                path: path.to_path_buf(),
                duration_secs: 60.0,
                bitrate_kbps: Some(128),
                codec: Some("mp3".to_string()),
                format: "mp3".to_string(),
                chapters: Vec::new(),
            })
        }
    }

    struct Fixture {
        _tmp: TempDir,
        staging: PathBuf,
        library: PathBuf,
        store: Arc<MemoryStore>,
        importer: Importer,
    }

    fn fixture(op: ImportOperation) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("downloads");
        let library = tmp.path().join("library");
        std::fs::create_dir_all(&staging).unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_book(&Book::new("b1", "Dune", "Frank Herbert", MediaType::Ebook))
            .unwrap();
        let importer = Importer::new(
            PathBuilder::new(library.join("ebooks"), library.join("audiobooks")),
            FileOperator::new(op),
            store.clone(),
            tmp.path().join("recycle"),
        )
        .with_probe(Arc::new(FixedProbe));
        Fixture {
            _tmp: tmp,
            staging,
            library,
            store,
            importer,
        }
    }

    fn request(source: PathBuf, media_type: MediaType) -> ImportRequest {
        ImportRequest {
            book_id: "b1".to_string(),
            source,
            media_type,
            metadata: BookMetadata {
                author: "Frank Herbert".to_string(),
                title: "Dune".to_string(),
                series: None,
                series_index: None,
            },
            operation: None,
            edition: None,
            convert_to: None,
        }
    }

    #[tokio::test]
    async fn test_import_single_ebook() {
        let f = fixture(ImportOperation::Copy);
        let source = f.staging.join("Frank Herbert - Dune.epub");
        std::fs::write(&source, b"epub bytes").unwrap();

        let outcome = f
            .importer
            .import(&request(source.clone(), MediaType::Ebook))
            .await
            .unwrap();

        let expected = f.library.join("ebooks/Frank Herbert/Dune/Dune.epub");
        assert_eq!(outcome.destination, expected);
        assert_eq!(outcome.size_bytes, 10);
        assert!(source.exists());

        let file = f.store.get_media_file(&outcome.media_file_id).unwrap().unwrap();
        assert_eq!(file.format, "epub");
        assert_eq!(file.filename, "Dune.epub");
        assert_eq!(file.bitrate_kbps, None);
        assert_eq!(
            f.store.get_book("b1").unwrap().unwrap().status,
            BookStatus::Downloaded
        );
    }

    #[tokio::test]
    async fn test_import_audiobook_folder_is_one_media_file() {
        let f = fixture(ImportOperation::Move);
        let folder = f.staging.join("Dune Audiobook");
        std::fs::create_dir_all(&folder).unwrap();
        for name in ["01 - Intro.mp3", "02 - Chapter One.mp3", "cover.jpg"] {
            std::fs::write(folder.join(name), b"xx").unwrap();
        }

        let outcome = f
            .importer
            .import(&request(folder.clone(), MediaType::Audiobook))
            .await
            .unwrap();

        assert_eq!(outcome.files_imported, 3);
        assert_eq!(outcome.size_bytes, 6);
        assert!(outcome.destination.join("02 - Chapter One.mp3").exists());
        assert!(!folder.exists());

        let files = f.store.list_media_files("b1", false).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].format, "mp3");
        assert_eq!(files[0].media_type, MediaType::Audiobook);
        assert_eq!(files[0].duration_secs, Some(120.0));
        assert_eq!(files[0].bitrate_kbps, Some(128));
    }

    #[tokio::test]
    async fn test_partial_folder_records_nothing() {
        fn refuse_chapter_two(src: &Path, dst: &Path) -> std::io::Result<()> {
            if src.file_name().is_some_and(|n| n == "02 - Chapter One.mp3") {
                std::fs::write(dst, b"")?;
                return Err(std::io::Error::other("link refused"));
            }
            std::fs::hard_link(src, dst)
        }

        let mut f = fixture(ImportOperation::Hardlink);
        f.importer.files =
            FileOperator::new(ImportOperation::Hardlink).with_link_fn(refuse_chapter_two);
        let folder = f.staging.join("Dune Audiobook");
        std::fs::create_dir_all(&folder).unwrap();
        for name in ["01 - Intro.mp3", "02 - Chapter One.mp3", "03 - Chapter Two.mp3"] {
            std::fs::write(folder.join(name), b"xx").unwrap();
        }

        let err = f
            .importer
            .import(&request(folder.clone(), MediaType::Audiobook))
            .await
            .unwrap_err();

        match err {
            ImportError::PartialFolder { imported, failed } => {
                assert_eq!(imported, 2);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].0, folder.join("02 - Chapter One.mp3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let destination = f.library.join("audiobooks/Frank Herbert/Dune");
        assert!(destination.join("01 - Intro.mp3").exists());
        assert!(destination.join("03 - Chapter Two.mp3").exists());
        assert!(folder.join("02 - Chapter One.mp3").exists());
        assert!(f.store.list_media_files("b1", true).unwrap().is_empty());
        assert_eq!(
            f.store.get_book("b1").unwrap().unwrap().status,
            BookStatus::Missing
        );
    }

    #[tokio::test]
    async fn test_collision_leaves_everything_in_place() {
        let f = fixture(ImportOperation::Move);
        let source = f.staging.join("Dune.epub");
        std::fs::write(&source, b"new").unwrap();
        let existing = f.library.join("ebooks/Frank Herbert/Dune/Dune.epub");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"old").unwrap();

        let err = f
            .importer
            .import(&request(source.clone(), MediaType::Ebook))
            .await
            .unwrap_err();

        assert!(err.is_collision());
        assert_eq!(std::fs::read(&source).unwrap(), b"new");
        assert_eq!(std::fs::read(&existing).unwrap(), b"old");
        assert!(f.store.list_media_files("b1", true).unwrap().is_empty());
        assert_eq!(
            f.store.get_book("b1").unwrap().unwrap().status,
            BookStatus::Missing
        );
    }

    #[tokio::test]
    async fn test_missing_source() {
        let f = fixture(ImportOperation::Copy);
        let err = f
            .importer
            .import(&request(f.staging.join("nope.epub"), MediaType::Ebook))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_convert_without_converter_fails() {
        let f = fixture(ImportOperation::Copy);
        let source = f.staging.join("Dune.pdf");
        std::fs::write(&source, b"pdf").unwrap();
        let mut req = request(source, MediaType::Ebook);
        req.convert_to = Some("epub".to_string());

        let err = f.importer.import(&req).await.unwrap_err();
        assert!(matches!(err, ImportError::Converter(_)));
    }

    #[tokio::test]
    async fn test_remove_media_file_recycles_and_tombstones() {
        let f = fixture(ImportOperation::Copy);
        let source = f.staging.join("Dune.epub");
        std::fs::write(&source, b"epub").unwrap();
        let outcome = f
            .importer
            .import(&request(source, MediaType::Ebook))
            .await
            .unwrap();

        let removed = f
            .importer
            .remove_media_file(&outcome.media_file_id)
            .await
            .unwrap();

        assert!(!outcome.destination.exists());
        let recycled = removed.recycled_path.unwrap();
        assert_eq!(std::fs::read(&recycled).unwrap(), b"epub");
        assert!(f.store.list_media_files("b1", false).unwrap().is_empty());
        assert_eq!(
            f.store.get_book("b1").unwrap().unwrap().status,
            BookStatus::Missing
        );

        let again = f.importer.remove_media_file(&outcome.media_file_id).await;
        assert!(matches!(
            again,
            Err(ImportError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_dominant_format() {
        let files = vec![
            PathBuf::from("a/01.mp3"),
            PathBuf::from("a/02.mp3"),
            PathBuf::from("a/03.m4a"),
            PathBuf::from("a/cover.jpg"),
            PathBuf::from("a/notes.txt"),
            PathBuf::from("a/info.txt"),
        ];
        assert_eq!(dominant_format(&files, MediaType::Audiobook), "mp3");
        assert_eq!(dominant_format(&files, MediaType::Ebook), "txt");
        assert_eq!(
            dominant_format(&[PathBuf::from("x.jpg")], MediaType::Ebook),
            "jpg"
        );
    }
}
