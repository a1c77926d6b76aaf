//! Testing utilities and mock implementations.
//!
//! This module provides mocks for the indexer and download-client traits
//! so the acquisition pipeline can be exercised without real services.
//!
//! # Example
//!
//! ```rust,ignore
//! use librarr_core::testing::{fixtures, MockDownloadClient, MockIndexer};
//!
//! let indexer = MockIndexer::new("mock", 1)
//!     .with_results(vec![fixtures::search_result("mock", "Dune", "EPUB")]);
//! let client = MockDownloadClient::new("qbit", DownloadClientKind::QBittorrent);
//!
//! // Hand them to an Acquirer...
//! ```

mod mock_download_client;
mod mock_indexer;

pub use mock_download_client::{MockDownloadClient, RecordedAdd};
pub use mock_indexer::MockIndexer;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::Protocol;
    use crate::indexer::SearchResult;
    use crate::library::{MediaType, AUDIO_EXTENSIONS};
    use crate::store::Book;

    /// A torrent result with plausible size and seeders for `format`.
    pub fn search_result(indexer: &str, title: &str, format: &str) -> SearchResult {
        let hash = format!("{:040x}", fingerprint(&[indexer, title, format]));
        let mut result = SearchResult::new(
            indexer,
            title,
            format!("magnet:?xt=urn:btih:{}", hash),
            Protocol::Torrent,
        );
        result.format = Some(format.to_uppercase());
        result.seeders = 10;
        result.leechers = 1;
        result.size_bytes = if is_audio(format) {
            300 * 1024 * 1024
        } else {
            2 * 1024 * 1024
        };
        result
    }

    /// A usenet result for `format`.
    pub fn usenet_result(indexer: &str, title: &str, format: &str) -> SearchResult {
        let mut result = search_result(indexer, title, format);
        result.protocol = Protocol::Usenet;
        result.download_url = format!(
            "https://{}.example/getnzb/{:x}.nzb",
            indexer,
            fingerprint(&[title, format])
        );
        result.seeders = 0;
        result.leechers = 0;
        result
    }

    /// An audiobook result with a known bitrate.
    pub fn audiobook_result(indexer: &str, title: &str, format: &str, bitrate_kbps: u32) -> SearchResult {
        let mut result = search_result(indexer, title, format);
        result.bitrate_kbps = Some(bitrate_kbps);
        result
    }

    pub fn ebook(id: &str, title: &str, author: &str) -> Book {
        Book::new(id, title, author, MediaType::Ebook)
    }

    pub fn audiobook(id: &str, title: &str, author: &str) -> Book {
        Book::new(id, title, author, MediaType::Audiobook)
    }

    fn is_audio(format: &str) -> bool {
        AUDIO_EXTENSIONS.contains(&format.to_lowercase().as_str())
    }

    /// Stable small hash so fixtures get distinct, repeatable URLs.
    fn fingerprint(parts: &[&str]) -> u64 {
        parts
            .iter()
            .flat_map(|p| p.bytes().chain(std::iter::once(0)))
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
            })
    }
}
