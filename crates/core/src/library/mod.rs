//! Library import pipeline.
//!
//! Staged downloads are discovered by the [`Scanner`], given a deterministic
//! destination by the [`PathBuilder`], placed by the [`FileOperator`] and
//! recorded by the [`Importer`]. Imports never overwrite an existing
//! destination.

mod error;
mod file_ops;
mod importer;
mod path_builder;
mod scanner;
mod types;

pub use error::ImportError;
pub use file_ops::{FileOperator, FolderImportReport};
pub use importer::Importer;
pub use path_builder::{format_series_index, sanitize_filename, PathBuilder, MAX_COMPONENT_CHARS};
pub use scanner::{parse_filename, Scanner};
pub use types::{
    extension_of, BookMetadata, ImportOperation, ImportOutcome, ImportRequest, MediaType,
    ParsedName, PendingImport, AUDIO_EXTENSIONS, EBOOK_EXTENSIONS,
};
