//! Indexer abstraction and concurrent multi-source search.
//!
//! Each backend implements the [`Indexer`] trait; [`create_indexer`] maps a
//! config entry to its adapter and [`IndexerManager`] fans queries out to
//! every enabled one.

mod manager;
mod newznab;
mod scrape;
mod tracker;
mod types;

use std::sync::Arc;

use crate::config::{IndexerConfig, IndexerKind};

pub use manager::IndexerManager;
pub use newznab::{parse_feed, NewznabIndexer};
pub use scrape::{parse_results_page, ScrapeIndexer};
pub use tracker::TrackerIndexer;
pub use types::*;

/// Build the adapter for a config entry.
pub fn create_indexer(config: &IndexerConfig) -> Result<Arc<dyn Indexer>, IndexerError> {
    if config.url.trim().is_empty() {
        return Err(IndexerError::InvalidConfig(format!(
            "indexer '{}' has no url",
            config.name
        )));
    }

    let indexer: Arc<dyn Indexer> = match config.kind {
        IndexerKind::Newznab => Arc::new(NewznabIndexer::new(config.clone())),
        IndexerKind::Tracker => Arc::new(TrackerIndexer::new(config.clone())?),
        IndexerKind::Scrape => Arc::new(ScrapeIndexer::new(config.clone())),
    };
    Ok(indexer)
}
