//! Deterministic library paths.
//!
//! Layout:
//!
//! ```text
//! root/Author/Title/Title.ext
//! root/Author/Series/NN - Title/NN - Title.ext
//! root/Author/Title/                       (audiobook bundles)
//! ```

use std::path::{Path, PathBuf};

use super::types::{BookMetadata, MediaType};

/// Longest component produced by [`sanitize_filename`], in characters.
pub const MAX_COMPONENT_CHARS: usize = 200;

const HOSTILE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a string safe to use as a single path component.
///
/// Hostile characters and control characters become `_`, whitespace runs
/// collapse to one space, surrounding whitespace and trailing dots are
/// trimmed and the result is capped at [`MAX_COMPONENT_CHARS`]. Empty
/// results become `Unknown`. Applying it twice gives the same string.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if HOSTILE_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = trim_component(&collapsed);

    let truncated: String = trimmed.chars().take(MAX_COMPONENT_CHARS).collect();
    let result = trim_component(&truncated);

    if result.is_empty() {
        "Unknown".to_string()
    } else {
        result.to_string()
    }
}

fn trim_component(s: &str) -> &str {
    s.trim_start()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Format a series position as a zero-padded prefix ("01", "02.5").
pub fn format_series_index(index: f32) -> String {
    if index.fract() == 0.0 && index >= 0.0 {
        format!("{:02}", index as u32)
    } else {
        format!("{:04.1}", index)
    }
}

/// Builds destination paths under the ebook and audiobook library roots.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    ebook_root: PathBuf,
    audiobook_root: PathBuf,
}

impl PathBuilder {
    pub fn new(ebook_root: impl Into<PathBuf>, audiobook_root: impl Into<PathBuf>) -> Self {
        Self {
            ebook_root: ebook_root.into(),
            audiobook_root: audiobook_root.into(),
        }
    }

    pub fn root_for(&self, media_type: MediaType) -> &Path {
        match media_type {
            MediaType::Ebook => &self.ebook_root,
            MediaType::Audiobook => &self.audiobook_root,
        }
    }

    /// Base name shared by the book directory and its file.
    pub fn file_stem(meta: &BookMetadata) -> String {
        let title = sanitize_filename(&meta.title);
        match (meta.series.as_deref(), meta.series_index) {
            (Some(series), Some(idx)) if !series.trim().is_empty() => {
                sanitize_filename(&format!("{} - {}", format_series_index(idx), title))
            }
            _ => title,
        }
    }

    /// Directory that holds a book's files.
    pub fn book_dir(&self, media_type: MediaType, meta: &BookMetadata) -> PathBuf {
        let mut path = self.root_for(media_type).to_path_buf();
        let author = if meta.author.trim().is_empty() {
            "Unknown Author"
        } else {
            meta.author.as_str()
        };
        path.push(sanitize_filename(author));
        if let Some(series) = meta.series.as_deref().filter(|s| !s.trim().is_empty()) {
            path.push(sanitize_filename(series));
        }
        path.push(Self::file_stem(meta));
        path
    }

    /// Destination for a single file with the given extension.
    pub fn file_path(&self, media_type: MediaType, meta: &BookMetadata, ext: &str) -> PathBuf {
        let stem = Self::file_stem(meta);
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        let name = if ext.is_empty() {
            stem
        } else {
            format!("{}.{}", stem, ext)
        };
        self.book_dir(media_type, meta).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(author: &str, title: &str) -> BookMetadata {
        BookMetadata {
            author: author.to_string(),
            title: title.to_string(),
            series: None,
            series_index: None,
        }
    }

    #[test]
    fn test_sanitize_replaces_hostile_chars() {
        let s = sanitize_filename(r#"What/If? A: "Test" <1|2> \ *"#);
        for c in HOSTILE_CHARS {
            assert!(!s.contains(*c), "{} still contains {}", s, c);
        }
        assert_eq!(s, "What_If_ A_ _Test_ _1_2_ _ _");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_and_trims() {
        assert_eq!(sanitize_filename("  The   Hobbit ...  "), "The Hobbit");
        assert_eq!(sanitize_filename("a\tb"), "a_b");
    }

    #[test]
    fn test_sanitize_empty_becomes_unknown() {
        assert_eq!(sanitize_filename(""), "Unknown");
        assert_eq!(sanitize_filename(" .. "), "Unknown");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let s = sanitize_filename(&long);
        assert_eq!(s.chars().count(), MAX_COMPONENT_CHARS);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "Plain Title",
            "  spaced    out  ",
            "dots...",
            "a/b\\c:d*e?f\"g<h>i|j",
            "tab\there\nnewline",
            "",
            "...",
            "ends with space and dot . ",
            &format!("{}. x", "y".repeat(199)),
            &"z".repeat(400),
            "日本語のタイトル: 副題",
        ];
        for input in inputs {
            let once = sanitize_filename(input);
            let twice = sanitize_filename(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
            for c in HOSTILE_CHARS {
                assert!(!once.contains(*c));
            }
        }
    }

    #[test]
    fn test_format_series_index() {
        assert_eq!(format_series_index(1.0), "01");
        assert_eq!(format_series_index(12.0), "12");
        assert_eq!(format_series_index(2.5), "02.5");
    }

    #[test]
    fn test_standalone_book_path() {
        let builder = PathBuilder::new("/books", "/audiobooks");
        let path = builder.file_path(MediaType::Ebook, &meta("Frank Herbert", "Dune"), "EPUB");
        assert_eq!(path, PathBuf::from("/books/Frank Herbert/Dune/Dune.epub"));
    }

    #[test]
    fn test_series_book_path() {
        let builder = PathBuilder::new("/books", "/audiobooks");
        let m = BookMetadata {
            author: "Brandon Sanderson".to_string(),
            title: "The Well of Ascension".to_string(),
            series: Some("Mistborn".to_string()),
            series_index: Some(2.0),
        };
        let path = builder.file_path(MediaType::Ebook, &m, "epub");
        assert_eq!(
            path,
            PathBuf::from(
                "/books/Brandon Sanderson/Mistborn/02 - The Well of Ascension/02 - The Well of Ascension.epub"
            )
        );
    }

    #[test]
    fn test_audiobook_bundle_dir() {
        let builder = PathBuilder::new("/books", "/audiobooks");
        let dir = builder.book_dir(MediaType::Audiobook, &meta("Andy Weir", "Project Hail Mary"));
        assert_eq!(
            dir,
            PathBuf::from("/audiobooks/Andy Weir/Project Hail Mary")
        );
    }

    #[test]
    fn test_missing_author_and_hostile_title() {
        let builder = PathBuilder::new("/books", "/audiobooks");
        let path = builder.file_path(MediaType::Ebook, &meta("", "AC/DC: A Bio"), "pdf");
        assert_eq!(
            path,
            PathBuf::from("/books/Unknown Author/AC_DC_ A Bio/AC_DC_ A Bio.pdf")
        );
    }
}
