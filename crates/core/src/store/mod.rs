//! Persistence for books, downloads and imported media files.

mod memory;
mod sqlite;
mod traits;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{LibraryStore, StoreError};
pub use types::{Book, BookStatus, Download, DownloadStatus, MediaFile};
