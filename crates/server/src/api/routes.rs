use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{books, clients, downloads, handlers, import, indexers, middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Indexers
        .route("/indexers", get(indexers::list_indexers))
        .route("/indexers/search", get(indexers::search))
        .route("/indexers/{name}/test", post(indexers::test_indexer))
        // Download clients
        .route("/download-clients", get(clients::list_clients))
        .route("/download-clients/{name}/test", post(clients::test_client))
        // Downloads
        .route(
            "/downloads",
            get(downloads::list_downloads).post(downloads::create_download),
        )
        .route(
            "/downloads/{id}",
            get(downloads::get_download).delete(downloads::cancel_download),
        )
        .route("/downloads/{id}/complete", post(downloads::complete_download))
        .route("/downloads/{id}/fail", post(downloads::fail_download))
        // Catalog entries
        .route("/catalog-entries/{id}/search", post(books::search_and_acquire))
        // Import
        .route("/import/pending", get(import::list_pending))
        .route("/import/manual", post(import::manual_import))
        .route("/media-files/{id}", delete(import::delete_media_file))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .layer(axum_middleware::from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
