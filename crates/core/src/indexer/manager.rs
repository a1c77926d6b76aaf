//! Concurrent fan-out across all enabled indexers.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::create_indexer;
use super::types::{Indexer, IndexerError, SearchOutcome, SearchQuery, SearchResult};
use crate::config::IndexerConfig;
use crate::metrics::{INDEXER_SEARCHES, SEARCH_DURATION, SEARCH_RESULTS};

/// Holds the enabled indexers in priority order and fans searches out to
/// all of them.
///
/// A failing or slow indexer never fails the aggregate search; only when
/// every indexer fails does the caller see an error.
pub struct IndexerManager {
    indexers: Vec<Arc<dyn Indexer>>,
}

impl IndexerManager {
    /// Sorts by priority; ties keep their configured order.
    pub fn new(mut indexers: Vec<Arc<dyn Indexer>>) -> Self {
        indexers.sort_by_key(|i| i.priority());
        Self { indexers }
    }

    /// Build adapters for every enabled config entry.
    pub fn from_configs(configs: &[IndexerConfig]) -> Result<Self, IndexerError> {
        let indexers = configs
            .iter()
            .filter(|c| c.enabled)
            .map(create_indexer)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(indexers))
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }

    pub fn indexer_names(&self) -> Vec<String> {
        self.indexers.iter().map(|i| i.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Indexer>> {
        self.indexers.iter().find(|i| i.name() == name).cloned()
    }

    /// Check one indexer by name.
    pub async fn test_indexer(&self, name: &str) -> Result<(), IndexerError> {
        let indexer = self
            .get(name)
            .ok_or_else(|| IndexerError::NotFound(name.to_string()))?;
        indexer.test().await
    }

    /// Search every indexer concurrently, each bounded by `deadline`.
    ///
    /// Results come back concatenated in priority order. Indexers that
    /// error or overrun contribute nothing and are listed in
    /// `indexer_errors`.
    pub async fn search_all(
        &self,
        query: &SearchQuery,
        deadline: Duration,
    ) -> Result<SearchOutcome, IndexerError> {
        if self.indexers.is_empty() {
            return Err(IndexerError::NoIndexers);
        }

        let start = Instant::now();
        let futures = self.indexers.iter().map(|indexer| {
            let indexer = Arc::clone(indexer);
            async move {
                let outcome = tokio::time::timeout(deadline, indexer.search(query)).await;
                (indexer, outcome)
            }
        });
        let completed = join_all(futures).await;

        let mut results: Vec<SearchResult> = Vec::new();
        let mut indexer_errors: HashMap<String, String> = HashMap::new();
        for (indexer, outcome) in completed {
            let name = indexer.name();
            match outcome {
                Ok(Ok(found)) => {
                    INDEXER_SEARCHES.with_label_values(&[name, "success"]).inc();
                    debug!(indexer = %name, results = found.len(), "Indexer search complete");
                    results.extend(found.into_iter().filter(|r| !r.download_url.is_empty()));
                }
                Ok(Err(e)) => {
                    INDEXER_SEARCHES.with_label_values(&[name, "error"]).inc();
                    warn!(indexer = %name, error = %e, "Indexer search failed");
                    indexer_errors.insert(name.to_string(), e.to_string());
                }
                Err(_) => {
                    INDEXER_SEARCHES.with_label_values(&[name, "timeout"]).inc();
                    warn!(
                        indexer = %name,
                        timeout_ms = deadline.as_millis() as u64,
                        "Indexer search timed out"
                    );
                    indexer_errors.insert(name.to_string(), IndexerError::Timeout.to_string());
                }
            }
        }

        let elapsed = start.elapsed();
        SEARCH_DURATION
            .with_label_values(&[])
            .observe(elapsed.as_secs_f64());

        if indexer_errors.len() == self.indexers.len() {
            return Err(IndexerError::AllFailed(indexer_errors));
        }

        SEARCH_RESULTS
            .with_label_values(&[])
            .observe(results.len() as f64);
        info!(
            query = %query.terms(),
            results = results.len(),
            failed = indexer_errors.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Search complete"
        );

        Ok(SearchOutcome {
            query: query.clone(),
            results,
            duration_ms: elapsed.as_millis() as u64,
            indexer_errors,
        })
    }
}
