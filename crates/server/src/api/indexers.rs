//! Indexer API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use librarr_core::config::SanitizedIndexerConfig;
use librarr_core::indexer::create_indexer;
use librarr_core::{IndexerError, MediaType, QualityProfile, SearchQuery, SearchResult};

use super::handlers::{acquire_error, bad_request, indexer_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub book_id: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: SearchQuery,
    pub results: Vec<SearchResult>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub indexer_errors: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct IndexersResponse {
    pub indexers: Vec<SanitizedIndexerConfig>,
}

#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub success: bool,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/indexers
pub async fn list_indexers(State(state): State<Arc<AppState>>) -> Json<IndexersResponse> {
    Json(IndexersResponse {
        indexers: state.sanitized_config().indexers,
    })
}

/// GET /api/v1/indexers/search?book_id=… or ?q=…&media_type=…
///
/// Fan out to every indexer and return the results ranked under the
/// matching quality profile.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let acquirer = state.acquirer();

    let outcome = match (params.book_id, params.q) {
        (Some(book_id), _) if !book_id.trim().is_empty() => acquirer
            .search_for_book(&book_id)
            .await
            .map_err(acquire_error)?,
        (_, Some(q)) if !q.trim().is_empty() => {
            let media_type = params.media_type.unwrap_or_default();
            let query = SearchQuery::free_text(q.trim(), media_type);
            let mut outcome = acquirer
                .indexers()
                .search_all(&query, acquirer.settings().search_timeout)
                .await
                .map_err(indexer_error)?;
            let profile =
                QualityProfile::for_media_type(&acquirer.settings().quality_profiles, media_type);
            outcome.results = profile.rank(outcome.results);
            outcome
        }
        _ => return Err(bad_request("Either book_id or q is required")),
    };

    info!(
        query = %outcome.query.terms(),
        results = outcome.results.len(),
        "Search served"
    );
    Ok(Json(SearchResponse {
        query: outcome.query,
        results: outcome.results,
        duration_ms: outcome.duration_ms,
        indexer_errors: outcome.indexer_errors,
    }))
}

/// POST /api/v1/indexers/{name}/test
///
/// Disabled indexers are absent from the search set but can still be
/// checked; they are built from their config entry for the test.
pub async fn test_indexer(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let indexer = match state.acquirer().indexers().get(&name) {
        Some(indexer) => indexer,
        None => {
            let config = state
                .config()
                .indexers
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| indexer_error(IndexerError::NotFound(name.clone())))?;
            debug!(indexer = %name, "Testing indexer from config");
            create_indexer(config).map_err(indexer_error)?
        }
    };

    let response = match indexer.test().await {
        Ok(()) => TestResponse {
            success: true,
            message: format!("Indexer '{}' is reachable", name),
        },
        Err(e) => {
            warn!(indexer = %name, error = %e, "Indexer test failed");
            TestResponse {
                success: false,
                message: e.to_string(),
            }
        }
    };
    Ok(Json(response))
}
