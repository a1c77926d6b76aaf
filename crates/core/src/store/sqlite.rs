//! SQLite-backed store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{LibraryStore, StoreError};
use super::types::{Book, BookStatus, Download, DownloadStatus, MediaFile};

/// SQLite-backed implementation of [`LibraryStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                isbn TEXT,
                series TEXT,
                series_index REAL,
                media_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'missing',
                monitored INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS downloads (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL REFERENCES books(id),
                client_name TEXT NOT NULL,
                external_id TEXT NOT NULL,
                media_type TEXT NOT NULL,
                title TEXT NOT NULL,
                download_url TEXT NOT NULL,
                indexer TEXT,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                bytes_downloaded INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                category TEXT,
                error_message TEXT,
                added_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_downloads_book ON downloads(book_id);
            CREATE INDEX IF NOT EXISTS idx_downloads_status ON downloads(status);

            CREATE TABLE IF NOT EXISTS media_files (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL REFERENCES books(id),
                path TEXT NOT NULL,
                filename TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                format TEXT NOT NULL,
                media_type TEXT NOT NULL,
                bitrate_kbps INTEGER,
                duration_secs REAL,
                edition TEXT,
                imported_at TEXT NOT NULL,
                deleted_at TEXT,
                recycled_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_media_files_book ON media_files(book_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_media_files_live_path
                ON media_files(path) WHERE deleted_at IS NULL;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
        let media_type: String = row.get(6)?;
        let status: String = row.get(7)?;
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            isbn: row.get(3)?,
            series: row.get(4)?,
            series_index: row.get::<_, Option<f64>>(5)?.map(|v| v as f32),
            media_type: media_type.parse().unwrap_or_default(),
            status: status.parse().unwrap_or_default(),
            monitored: row.get(8)?,
        })
    }

    fn row_to_download(row: &rusqlite::Row) -> rusqlite::Result<Download> {
        let media_type: String = row.get(4)?;
        let status: String = row.get(10)?;
        let added_at: String = row.get(13)?;
        let completed_at: Option<String> = row.get(14)?;
        Ok(Download {
            id: row.get(0)?,
            book_id: row.get(1)?,
            client_name: row.get(2)?,
            external_id: row.get(3)?,
            media_type: media_type.parse().unwrap_or_default(),
            title: row.get(5)?,
            download_url: row.get(6)?,
            indexer: row.get(7)?,
            size_bytes: row.get::<_, i64>(8)?.max(0) as u64,
            bytes_downloaded: row.get::<_, i64>(9)?.max(0) as u64,
            status: status.parse().unwrap_or(DownloadStatus::Failed),
            category: row.get(11)?,
            error_message: row.get(12)?,
            added_at: parse_timestamp(&added_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
        })
    }

    fn row_to_media_file(row: &rusqlite::Row) -> rusqlite::Result<MediaFile> {
        let path: String = row.get(2)?;
        let media_type: String = row.get(6)?;
        let imported_at: String = row.get(10)?;
        let deleted_at: Option<String> = row.get(11)?;
        let recycled_path: Option<String> = row.get(12)?;
        Ok(MediaFile {
            id: row.get(0)?,
            book_id: row.get(1)?,
            path: PathBuf::from(path),
            filename: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)?.max(0) as u64,
            format: row.get(5)?,
            media_type: media_type.parse().unwrap_or_default(),
            bitrate_kbps: row.get(7)?,
            duration_secs: row.get(8)?,
            edition: row.get(9)?,
            imported_at: parse_timestamp(&imported_at),
            deleted_at: deleted_at.as_deref().map(parse_timestamp),
            recycled_path: recycled_path.map(PathBuf::from),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const DOWNLOAD_COLUMNS: &str = "id, book_id, client_name, external_id, media_type, title, \
     download_url, indexer, size_bytes, bytes_downloaded, status, category, error_message, \
     added_at, completed_at";

const MEDIA_FILE_COLUMNS: &str = "id, book_id, path, filename, size_bytes, format, media_type, \
     bitrate_kbps, duration_secs, edition, imported_at, deleted_at, recycled_path";

impl LibraryStore for SqliteStore {
    fn upsert_book(&self, book: &Book) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO books (id, title, author, isbn, series, series_index, media_type, status, monitored)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                isbn = excluded.isbn,
                series = excluded.series,
                series_index = excluded.series_index,
                media_type = excluded.media_type,
                status = excluded.status,
                monitored = excluded.monitored",
            params![
                book.id,
                book.title,
                book.author,
                book.isbn,
                book.series,
                book.series_index.map(|v| v as f64),
                book.media_type.as_str(),
                book.status.as_str(),
                book.monitored,
            ],
        )?;
        Ok(())
    }

    fn get_book(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let conn = self.lock()?;
        let book = conn
            .query_row(
                "SELECT id, title, author, isbn, series, series_index, media_type, status, monitored
                 FROM books WHERE id = ?",
                params![id],
                Self::row_to_book,
            )
            .optional()?;
        Ok(book)
    }

    fn set_book_status(&self, id: &str, status: BookStatus) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE books SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("book", id));
        }
        Ok(())
    }

    fn insert_download(&self, d: &Download) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO downloads ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                DOWNLOAD_COLUMNS
            ),
            params![
                d.id,
                d.book_id,
                d.client_name,
                d.external_id,
                d.media_type.as_str(),
                d.title,
                d.download_url,
                d.indexer,
                d.size_bytes as i64,
                d.bytes_downloaded as i64,
                d.status.as_str(),
                d.category,
                d.error_message,
                d.added_at.to_rfc3339(),
                d.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::AlreadyExists {
                    entity: "download",
                    id: d.id.clone(),
                }
            }
            other => other.into(),
        })?;
        Ok(())
    }

    fn get_download(&self, id: &str) -> Result<Option<Download>, StoreError> {
        let conn = self.lock()?;
        let download = conn
            .query_row(
                &format!("SELECT {} FROM downloads WHERE id = ?", DOWNLOAD_COLUMNS),
                params![id],
                Self::row_to_download,
            )
            .optional()?;
        Ok(download)
    }

    fn list_downloads(&self, status: Option<DownloadStatus>) -> Result<Vec<Download>, StoreError> {
        let conn = self.lock()?;
        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM downloads WHERE status = ? ORDER BY added_at DESC",
                    DOWNLOAD_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.as_str()], Self::row_to_download)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM downloads ORDER BY added_at DESC",
                    DOWNLOAD_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], Self::row_to_download)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    fn update_download(&self, d: &Download) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE downloads SET client_name = ?, external_id = ?, title = ?, size_bytes = ?,
                bytes_downloaded = ?, status = ?, category = ?, error_message = ?, completed_at = ?
             WHERE id = ?",
            params![
                d.client_name,
                d.external_id,
                d.title,
                d.size_bytes as i64,
                d.bytes_downloaded as i64,
                d.status.as_str(),
                d.category,
                d.error_message,
                d.completed_at.map(|t| t.to_rfc3339()),
                d.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("download", &d.id));
        }
        Ok(())
    }

    fn delete_download(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM downloads WHERE id = ?", params![id])?;
        Ok(changed > 0)
    }

    fn insert_media_file(&self, f: &MediaFile) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO media_files ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                MEDIA_FILE_COLUMNS
            ),
            params![
                f.id,
                f.book_id,
                f.path.to_string_lossy(),
                f.filename,
                f.size_bytes as i64,
                f.format,
                f.media_type.as_str(),
                f.bitrate_kbps,
                f.duration_secs,
                f.edition,
                f.imported_at.to_rfc3339(),
                f.deleted_at.map(|t| t.to_rfc3339()),
                f.recycled_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::AlreadyExists {
                    entity: "media file",
                    id: f.path.display().to_string(),
                }
            }
            other => other.into(),
        })?;
        Ok(())
    }

    fn get_media_file(&self, id: &str) -> Result<Option<MediaFile>, StoreError> {
        let conn = self.lock()?;
        let file = conn
            .query_row(
                &format!("SELECT {} FROM media_files WHERE id = ?", MEDIA_FILE_COLUMNS),
                params![id],
                Self::row_to_media_file,
            )
            .optional()?;
        Ok(file)
    }

    fn list_media_files(
        &self,
        book_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<MediaFile>, StoreError> {
        let conn = self.lock()?;
        let filter = if include_deleted {
            ""
        } else {
            " AND deleted_at IS NULL"
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM media_files WHERE book_id = ?{} ORDER BY imported_at",
            MEDIA_FILE_COLUMNS, filter
        ))?;
        let files = stmt
            .query_map(params![book_id], Self::row_to_media_file)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    fn mark_media_file_deleted(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        recycled_path: Option<PathBuf>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE media_files SET deleted_at = ?, recycled_path = ? WHERE id = ?",
            params![
                deleted_at.to_rfc3339(),
                recycled_path.map(|p| p.to_string_lossy().to_string()),
                id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("media file", id));
        }
        Ok(())
    }
}
