//! Move, copy and hardlink staged content into the library.

use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::ImportError;
use super::types::ImportOperation;

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

type LinkFn = fn(&Path, &Path) -> std::io::Result<()>;

/// Result of importing a folder leaf by leaf.
#[derive(Debug, Clone, Default)]
pub struct FolderImportReport {
    /// Destination path and size of every leaf that landed.
    pub imported: Vec<(PathBuf, u64)>,
    /// Source path and error of every leaf that did not.
    pub failed: Vec<(PathBuf, String)>,
}

impl FolderImportReport {
    pub fn total_bytes(&self) -> u64 {
        self.imported.iter().map(|(_, size)| size).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Performs import file operations. Never overwrites an existing destination.
#[derive(Debug, Clone)]
pub struct FileOperator {
    operation: ImportOperation,
    buffer_size: usize,
    link_fn: LinkFn,
}

impl FileOperator {
    pub fn new(operation: ImportOperation) -> Self {
        Self {
            operation,
            buffer_size: DEFAULT_BUFFER_SIZE,
            link_fn: |src, dst| std::fs::hard_link(src, dst),
        }
    }

    /// Sets the buffer size for copies.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(4096);
        self
    }

    /// Replaces the hard-link primitive (used to simulate filesystems
    /// without link support).
    pub fn with_link_fn(mut self, link_fn: LinkFn) -> Self {
        self.link_fn = link_fn;
        self
    }

    pub fn operation(&self) -> ImportOperation {
        self.operation
    }

    /// Returns a copy of this operator using a different operation.
    pub fn with_operation(&self, operation: ImportOperation) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    /// Import a single file. Returns the number of bytes at the destination.
    pub async fn import_file(&self, source: &Path, destination: &Path) -> Result<u64, ImportError> {
        let meta = match fs::metadata(source).await {
            Ok(m) if m.is_file() => m,
            _ => {
                return Err(ImportError::SourceNotFound {
                    path: source.to_path_buf(),
                })
            }
        };

        if fs::symlink_metadata(destination).await.is_ok() {
            return Err(ImportError::DestinationExists {
                path: destination.to_path_buf(),
            });
        }

        ensure_parent_dir(destination).await?;

        match self.operation {
            ImportOperation::Move => {
                if try_atomic_move(source, destination)
                    .await
                    .map_err(|e| ImportError::move_failed(source.into(), destination.into(), e))?
                {
                    debug!(src = %source.display(), dst = %destination.display(), "Renamed file");
                } else {
                    debug!(src = %source.display(), "Cross-device move, copying");
                    self.copy_file(source, destination).await?;
                    fs::remove_file(source).await.map_err(|e| {
                        ImportError::move_failed(source.into(), destination.into(), e)
                    })?;
                }
            }
            ImportOperation::Copy => {
                self.copy_file(source, destination).await?;
            }
            ImportOperation::Hardlink => {
                let link = self.link_fn;
                let (src, dst) = (source.to_path_buf(), destination.to_path_buf());
                let linked = tokio::task::spawn_blocking(move || link(&src, &dst))
                    .await
                    .map_err(|e| ImportError::Io(std::io::Error::other(e)))?;
                if let Err(e) = linked {
                    debug!(
                        src = %source.display(),
                        error = %e,
                        "Hard link failed, falling back to copy"
                    );
                    self.copy_file(source, destination).await?;
                }
            }
        }

        Ok(meta.len())
    }

    /// Import every file under `source` into `destination`, keeping the
    /// relative layout. Leaves are imported independently; failures are
    /// collected in the report rather than aborting the walk.
    pub async fn import_folder(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<FolderImportReport, ImportError> {
        if !fs::metadata(source).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(ImportError::SourceNotFound {
                path: source.to_path_buf(),
            });
        }
        if fs::symlink_metadata(destination).await.is_ok() {
            return Err(ImportError::DestinationExists {
                path: destination.to_path_buf(),
            });
        }

        let files = list_files(source).await?;
        if files.is_empty() {
            return Err(ImportError::NothingToImport {
                path: source.to_path_buf(),
            });
        }

        fs::create_dir_all(destination)
            .await
            .map_err(|e| ImportError::DirectoryCreationFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;

        let mut report = FolderImportReport::default();
        for file in files {
            let relative = match file.strip_prefix(source) {
                Ok(r) => r.to_path_buf(),
                Err(_) => continue,
            };
            let target = destination.join(&relative);
            match self.import_file(&file, &target).await {
                Ok(size) => report.imported.push((target, size)),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Failed to import file");
                    report.failed.push((file, e.to_string()));
                }
            }
        }

        if self.operation == ImportOperation::Move && report.is_complete() {
            if let Err(e) = fs::remove_dir_all(source).await {
                warn!(path = %source.display(), error = %e, "Failed to remove emptied source folder");
            }
        }

        Ok(report)
    }

    /// Move a file or folder into `recycle_dir` under a timestamped,
    /// collision-free name. Returns where it ended up.
    pub async fn soft_delete(&self, path: &Path, recycle_dir: &Path) -> Result<PathBuf, ImportError> {
        let is_dir = match fs::metadata(path).await {
            Ok(m) => m.is_dir(),
            Err(_) => {
                return Err(ImportError::SourceNotFound {
                    path: path.to_path_buf(),
                })
            }
        };

        fs::create_dir_all(recycle_dir)
            .await
            .map_err(|e| ImportError::DirectoryCreationFailed {
                path: recycle_dir.to_path_buf(),
                source: e,
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");

        let mut target = recycle_dir.join(format!("{}_{}", stamp, file_name));
        let mut n = 1;
        while fs::symlink_metadata(&target).await.is_ok() {
            target = recycle_dir.join(format!("{}_{}_{}", stamp, n, file_name));
            n += 1;
        }

        let mover = self.with_operation(ImportOperation::Move);
        if !is_dir {
            mover.import_file(path, &target).await?;
            return Ok(target);
        }

        let renamed = try_atomic_move(path, &target)
            .await
            .map_err(|e| ImportError::move_failed(path.into(), target.clone(), e))?;
        if !renamed {
            let report = mover.import_folder(path, &target).await?;
            if !report.is_complete() {
                return Err(ImportError::PartialFolder {
                    imported: report.imported.len(),
                    failed: report.failed,
                });
            }
        }
        Ok(target)
    }

    /// Move a recycled file back to its original location.
    pub async fn restore(&self, recycled: &Path, original: &Path) -> Result<u64, ImportError> {
        self.with_operation(ImportOperation::Move)
            .import_file(recycled, original)
            .await
    }

    /// Buffered copy that carries over the source permissions.
    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64, ImportError> {
        let source_file = File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImportError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                ImportError::Io(e)
            }
        })?;
        let permissions = source_file.metadata().await?.permissions();

        let dest_file = File::options()
            .write(true)
            .create_new(true)
            .open(destination)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    ImportError::DestinationExists {
                        path: destination.to_path_buf(),
                    }
                } else {
                    ImportError::copy_failed(source.into(), destination.into(), e)
                }
            })?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dest_file);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| ImportError::copy_failed(source.into(), destination.into(), e))?;
            if bytes_read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..bytes_read])
                .await
                .map_err(|e| ImportError::copy_failed(source.into(), destination.into(), e))?;
            total_bytes += bytes_read as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| ImportError::copy_failed(source.into(), destination.into(), e))?;

        fs::set_permissions(destination, permissions)
            .await
            .map_err(|e| ImportError::copy_failed(source.into(), destination.into(), e))?;

        Ok(total_bytes)
    }
}

/// Attempts to move a file atomically (rename). `Ok(false)` means the
/// paths are on different filesystems.
async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(true),
        Err(e) => {
            // EXDEV is 18 on Linux
            if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                Ok(false)
            } else {
                Err(e)
            }
        }
    }
}

async fn ensure_parent_dir(path: &Path) -> Result<(), ImportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ImportError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    Ok(())
}

/// All regular files under `root`, sorted for a stable import order.
async fn list_files(root: &Path) -> Result<Vec<PathBuf>, ImportError> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    })
    .await
    .map_err(|e| ImportError::Io(std::io::Error::other(e)))
}
