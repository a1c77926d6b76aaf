//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock indexers and download clients injected, enabling end-to-end
//! testing without external infrastructure.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use librarr_core::{
    testing::{MockDownloadClient, MockIndexer},
    AcquireSettings, Acquirer, Config, DownloadClient, DownloadClientKind, FileOperator,
    ImportOperation, Importer, Indexer, IndexerManager, LibraryStore, PathBuilder, SqliteStore,
};

/// Re-export fixtures for test convenience
pub use librarr_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// Provides an in-process server over a temporary SQLite store and
/// library, with fully controllable mocks for:
/// - Indexers (MockIndexer)
/// - Download clients (MockDownloadClient)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_search() {
///     let fixture = TestFixture::new().await;
///     fixture.indexer.set_results(vec![fixtures::search_result("mock", "Dune", "EPUB")]).await;
///
///     let response = fixture.get("/api/v1/indexers/search?book_id=dune").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock indexer - configure search results
    pub indexer: MockIndexer,
    /// Mock torrent client
    pub torrent_client: MockDownloadClient,
    /// Mock usenet client
    pub usenet_client: MockDownloadClient,
    pub store: Arc<SqliteStore>,
    /// Where staged downloads are placed
    pub staging_dir: PathBuf,
    pub ebook_library: PathBuf,
    pub audiobook_library: PathBuf,
    /// Temporary directory for the database and library
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Start with no indexers configured
    pub no_indexers: bool,
    /// Start with no download clients configured
    pub no_clients: bool,
    /// Add disabled, unreachable indexer and client entries to the config
    pub disabled_entries: bool,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let staging_dir = temp_dir.path().join("downloads");
        let ebook_library = temp_dir.path().join("ebooks");
        let audiobook_library = temp_dir.path().join("audiobooks");
        std::fs::create_dir_all(&staging_dir).expect("Failed to create staging dir");

        let mut config = Config::default();
        config.database.path = temp_dir.path().join("test.db");
        config.paths.downloads_dir = staging_dir.clone();
        config.paths.ebook_library = ebook_library.clone();
        config.paths.audiobook_library = audiobook_library.clone();
        config.paths.recycle_bin = Some(temp_dir.path().join("recycle"));
        if test_config.disabled_entries {
            config.indexers.push(
                serde_json::from_value(json!({
                    "name": "offline",
                    "kind": "newznab",
                    "url": "http://127.0.0.1:9/api",
                    "api_key": "key",
                    "enabled": false,
                    "timeout_secs": 2
                }))
                .expect("Failed to build indexer config"),
            );
            config.download_clients.push(
                serde_json::from_value(json!({
                    "name": "spare",
                    "kind": "transmission",
                    "url": "http://127.0.0.1:9",
                    "enabled": false,
                    "timeout_secs": 2
                }))
                .expect("Failed to build download client config"),
            );
        }

        let store = Arc::new(
            SqliteStore::new(&config.database.path).expect("Failed to create store"),
        );
        store
            .upsert_book(&fixtures::ebook("dune", "Dune", "Frank Herbert"))
            .unwrap();
        store
            .upsert_book(&fixtures::audiobook("hobbit", "The Hobbit", "J.R.R. Tolkien"))
            .unwrap();

        let indexer = MockIndexer::new("mock", 1);
        let torrent_client = MockDownloadClient::new("qbit", DownloadClientKind::QBittorrent);
        let usenet_client =
            MockDownloadClient::new("sab", DownloadClientKind::Sabnzbd).with_priority(2);

        let indexers: Vec<Arc<dyn Indexer>> = if test_config.no_indexers {
            Vec::new()
        } else {
            vec![Arc::new(indexer.clone())]
        };
        let clients: Vec<Arc<dyn DownloadClient>> = if test_config.no_clients {
            Vec::new()
        } else {
            vec![
                Arc::new(torrent_client.clone()),
                Arc::new(usenet_client.clone()),
            ]
        };

        let importer = Importer::new(
            PathBuilder::new(&ebook_library, &audiobook_library),
            FileOperator::new(ImportOperation::Copy),
            store.clone(),
            config.paths.recycle_bin_dir(),
        );

        let acquirer = Acquirer::new(
            store.clone() as Arc<dyn LibraryStore>,
            Arc::new(IndexerManager::new(indexers)),
            clients,
            Arc::new(importer),
            AcquireSettings {
                quality_profiles: Vec::new(),
                search_timeout: Duration::from_secs(2),
            },
        );

        let state = Arc::new(librarr_server::state::AppState::new(
            config,
            Arc::new(acquirer),
        ));
        let router = librarr_server::api::create_router(state);

        Self {
            router,
            indexer,
            torrent_client,
            usenet_client,
            store,
            staging_dir,
            ebook_library,
            audiobook_library,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
