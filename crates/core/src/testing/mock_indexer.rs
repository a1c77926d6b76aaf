//! Mock indexer for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::IndexerKind;
use crate::indexer::{Indexer, IndexerError, SearchQuery, SearchResult};

use super::fixtures;

/// Mock implementation of the Indexer trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable search results
/// - Record queries for assertions
/// - Simulate failures and slow responses
///
/// # Example
///
/// ```rust,ignore
/// use librarr_core::testing::MockIndexer;
///
/// let indexer = MockIndexer::new("mock", 1)
///     .with_results(vec![MockIndexer::result("mock", "Dune", "EPUB")]);
///
/// let results = indexer.search(&query).await?;
/// assert_eq!(indexer.search_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockIndexer {
    name: String,
    priority: u32,
    results: Arc<RwLock<Vec<SearchResult>>>,
    /// If set, every search fails with this message.
    error: Arc<RwLock<Option<String>>>,
    delay: Option<Duration>,
    searches: Arc<RwLock<Vec<SearchQuery>>>,
}

impl MockIndexer {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            results: Arc::new(RwLock::new(Vec::new())),
            error: Arc::new(RwLock::new(None)),
            delay: None,
            searches: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Results returned by every search.
    pub fn with_results(mut self, results: Vec<SearchResult>) -> Self {
        self.results = Arc::new(RwLock::new(results));
        self
    }

    /// Fail every search with an API error carrying `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Arc::new(RwLock::new(Some(message.into())));
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A plausible torrent result from `indexer`.
    pub fn result(indexer: &str, title: &str, format: &str) -> SearchResult {
        fixtures::search_result(indexer, title, format)
    }

    pub async fn set_results(&self, results: Vec<SearchResult>) {
        *self.results.write().await = results;
    }

    pub async fn set_error(&self, message: Option<String>) {
        *self.error.write().await = message;
    }

    /// Queries received so far.
    pub async fn recorded_searches(&self) -> Vec<SearchQuery> {
        self.searches.read().await.clone()
    }

    pub async fn search_count(&self) -> usize {
        self.searches.read().await.len()
    }
}

#[async_trait]
impl Indexer for MockIndexer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexerKind {
        IndexerKind::Newznab
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn test(&self) -> Result<(), IndexerError> {
        match self.error.read().await.as_ref() {
            Some(message) => Err(IndexerError::ConnectionFailed(message.clone())),
            None => Ok(()),
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexerError> {
        self.searches.write().await.push(query.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.error.read().await.as_ref() {
            return Err(IndexerError::ApiError(message.clone()));
        }
        Ok(self.results.read().await.clone())
    }
}
