//! Download client API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::{debug, warn};

use librarr_core::config::SanitizedDownloadClientConfig;
use librarr_core::download_client::create_download_client;

use super::handlers::{bad_request, not_found, ApiError};
use super::indexers::TestResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DownloadClientsResponse {
    pub download_clients: Vec<SanitizedDownloadClientConfig>,
}

/// GET /api/v1/download-clients
pub async fn list_clients(State(state): State<Arc<AppState>>) -> Json<DownloadClientsResponse> {
    Json(DownloadClientsResponse {
        download_clients: state.sanitized_config().download_clients,
    })
}

/// POST /api/v1/download-clients/{name}/test
///
/// Connectivity and credential check; a failing client is still a 200
/// with `success: false`. Disabled clients are built from their config
/// entry for the check.
pub async fn test_client(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let client = match state.acquirer().client(&name) {
        Some(client) => client,
        None => {
            let config = state
                .config()
                .download_clients
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| not_found(format!("Download client not found: {}", name)))?;
            debug!(client = %name, "Testing download client from config");
            create_download_client(config).map_err(|e| bad_request(e.to_string()))?
        }
    };

    let response = match client.test().await {
        Ok(version) => TestResponse {
            success: true,
            message: format!("Connected to {} {}", client.kind(), version),
        },
        Err(e) => {
            warn!(client = %name, error = %e, "Download client test failed");
            TestResponse {
                success: false,
                message: e.to_string(),
            }
        }
    };
    Ok(Json(response))
}
