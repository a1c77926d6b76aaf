//! Discovers importable content in the staging directory.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::error::ImportError;
use super::types::{extension_of, MediaType, ParsedName, PendingImport};

static SERIES_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?) - (.+?)\s*#\s*(\d+(?:\.\d+)?) - (.+)$").expect("valid series pattern")
});

static TITLE_AUTHOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*\(([^()]+)\)$").expect("valid title/author pattern"));

/// Guess author, title and series from a file or folder name (without
/// extension).
///
/// Patterns, first match wins:
/// `Author - Title`, `Author - Series #N - Title`, `Title (Author)`,
/// `Author_Title`. Anything else is taken as a bare title.
pub fn parse_filename(name: &str) -> ParsedName {
    let name = name.trim();
    let series = SERIES_PATTERN.captures(name);

    if series.is_none() {
        let parts: Vec<&str> = name.split(" - ").map(str::trim).collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            // "01 - Intro" is a track number, not an author
            if parts[0].chars().all(|c| c.is_ascii_digit()) {
                return title_only(parts[1]);
            }
            return ParsedName {
                author: Some(parts[0].to_string()),
                title: parts[1].to_string(),
                series: None,
                series_index: None,
            };
        }
    }

    if let Some(caps) = series {
        return ParsedName {
            author: Some(caps[1].trim().to_string()),
            title: caps[4].trim().to_string(),
            series: Some(caps[2].trim().to_string()),
            series_index: caps[3].parse().ok(),
        };
    }

    if let Some(caps) = TITLE_AUTHOR_PATTERN.captures(name) {
        let author = caps[2].trim();
        if !author.chars().all(|c| c.is_ascii_digit()) {
            return ParsedName {
                author: Some(author.to_string()),
                title: caps[1].trim().to_string(),
                series: None,
                series_index: None,
            };
        }
    }

    if let Some((author, title)) = name.split_once('_') {
        let (author, title) = (author.trim(), title.trim());
        if !author.is_empty() && !title.is_empty() {
            return ParsedName {
                author: Some(author.replace('_', " ")),
                title: title.replace('_', " "),
                series: None,
                series_index: None,
            };
        }
    }

    title_only(name)
}

fn title_only(name: &str) -> ParsedName {
    ParsedName {
        author: None,
        title: name.to_string(),
        series: None,
        series_index: None,
    }
}

/// Walks a staging root and reports candidates for import.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    /// Minimum number of audio files for a folder to be one audiobook.
    min_audio_files: usize,
}

impl Scanner {
    pub fn new() -> Self {
        Self { min_audio_files: 2 }
    }

    /// Scan the direct children of `root`. Runs on the blocking pool.
    pub async fn scan(&self, root: &Path) -> Result<Vec<PendingImport>, ImportError> {
        let scanner = self.clone();
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || scanner.scan_blocking(&root))
            .await
            .map_err(|e| ImportError::Io(std::io::Error::other(e)))?
    }

    /// Synchronous variant of [`Scanner::scan`].
    pub fn scan_blocking(&self, root: &Path) -> Result<Vec<PendingImport>, ImportError> {
        if !root.is_dir() {
            return Err(ImportError::SourceNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| !is_hidden(p))
            .collect();
        entries.sort();

        let mut pending = Vec::new();
        for entry in entries {
            if entry.is_dir() {
                pending.extend(self.inspect_folder(&entry));
            } else if let Some(item) = inspect_file(&entry) {
                pending.push(item);
            }
        }

        debug!(root = %root.display(), found = pending.len(), "Scanned staging directory");
        Ok(pending)
    }

    /// Classify a single staged path, file or folder.
    pub fn inspect(&self, path: &Path) -> Vec<PendingImport> {
        if path.is_dir() {
            self.inspect_folder(path)
        } else {
            inspect_file(path).into_iter().collect()
        }
    }

    fn inspect_folder(&self, dir: &Path) -> Vec<PendingImport> {
        let mut audio = Vec::new();
        let mut ebooks = Vec::new();

        for entry in WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            match MediaType::from_path(entry.path()) {
                Some(MediaType::Audiobook) => audio.push((entry.into_path(), size)),
                Some(MediaType::Ebook) => ebooks.push((entry.into_path(), size)),
                None => {}
            }
        }

        let dir_name = file_name(dir);
        let folder_guess = parse_filename(&dir_name);

        if audio.len() >= self.min_audio_files.max(2) {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for (path, _) in &audio {
                if let Some(ext) = extension_of(path) {
                    *counts.entry(ext).or_default() += 1;
                }
            }
            let format = counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
                .map(|(ext, _)| ext)
                .unwrap_or_default();

            return vec![PendingImport {
                path: dir.to_path_buf(),
                name: dir_name,
                size_bytes: audio.iter().map(|(_, s)| s).sum(),
                format,
                media_type: MediaType::Audiobook,
                is_folder: true,
                author: folder_guess.author,
                title: folder_guess.title,
                series: folder_guess.series,
                series_index: folder_guess.series_index,
            }];
        }

        ebooks.sort();
        let mut items: Vec<PendingImport> = ebooks
            .into_iter()
            .chain(audio)
            .filter_map(|(path, _)| inspect_file(&path))
            .collect();

        // Files named only by title inherit the folder's author guess
        for item in &mut items {
            if item.author.is_none() {
                item.author = folder_guess.author.clone();
                if item.series.is_none() {
                    item.series = folder_guess.series.clone();
                    item.series_index = folder_guess.series_index;
                }
            }
        }
        items
    }
}

fn inspect_file(path: &Path) -> Option<PendingImport> {
    let media_type = MediaType::from_path(path)?;
    let format = extension_of(path)?;
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).ok()?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parsed = parse_filename(&stem);

    Some(PendingImport {
        path: path.to_path_buf(),
        name: file_name(path),
        size_bytes,
        format,
        media_type,
        is_folder: false,
        author: parsed.author,
        title: parsed.title,
        series: parsed.series,
        series_index: parsed.series_index,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}
