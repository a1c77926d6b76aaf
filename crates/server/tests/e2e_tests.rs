//! End-to-end tests with mocked external dependencies.
//!
//! These tests run the full HTTP stack in-process with mock indexers and
//! download clients over a real SQLite store and a temporary library.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use librarr_core::{DownloadClientError, LibraryStore};

use common::{fixtures, TestConfig, TestFixture};

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert!(response.body["paths"]["downloads_dir"].is_string());
    assert_eq!(response.body["import"]["operation"], "hardlink");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("librarr_http_requests_total"));
    assert!(body.contains("librarr_download_clients_configured"));
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_search_by_book_ranks_results() {
    let fixture = TestFixture::new().await;
    fixture
        .indexer
        .set_results(vec![
            fixtures::search_result("mock", "Frank Herbert - Dune", "PDF"),
            fixtures::search_result("mock", "Frank Herbert - Dune", "EPUB"),
        ])
        .await;

    let response = fixture.get("/api/v1/indexers/search?book_id=dune").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["results"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["results"][0]["format"], "EPUB");
    assert_eq!(response.body["query"]["book_id"], "dune");

    let searches = fixture.indexer.recorded_searches().await;
    assert_eq!(searches[0].author.as_deref(), Some("Frank Herbert"));
}

#[tokio::test]
async fn test_free_text_search() {
    let fixture = TestFixture::new().await;
    fixture
        .indexer
        .set_results(vec![fixtures::audiobook_result("mock", "Dune", "M4B", 128)])
        .await;

    let response = fixture
        .get("/api/v1/indexers/search?q=Dune&media_type=audiobook")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["results"][0]["format"], "M4B");
    assert_eq!(response.body["query"]["media_type"], "audiobook");
}

#[tokio::test]
async fn test_search_errors() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/indexers/search").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());

    let response = fixture.get("/api/v1/indexers/search?book_id=nope").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let empty = TestFixture::with_config(TestConfig {
        no_indexers: true,
        ..Default::default()
    })
    .await;
    let response = empty.get("/api/v1/indexers/search?book_id=dune").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_indexer_test_endpoint() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/indexers/mock/test").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["success"], true);

    fixture.indexer.set_error(Some("down".to_string())).await;
    let response = fixture.post_empty("/api/v1/indexers/mock/test").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["success"], false);

    let response = fixture.post_empty("/api/v1/indexers/ghost/test").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disabled_indexer_can_be_tested() {
    let fixture = TestFixture::with_config(TestConfig {
        disabled_entries: true,
        ..Default::default()
    })
    .await;

    let response = fixture.post_empty("/api/v1/indexers/offline/test").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["success"], false);

    // Still not part of searches
    fixture
        .indexer
        .set_results(vec![fixtures::search_result("mock", "Dune", "EPUB")])
        .await;
    let response = fixture.get("/api/v1/indexers/search?q=dune").await;
    assert_status!(response, StatusCode::OK);
    assert!(response.body.get("indexer_errors").is_none());
}

// =============================================================================
// Download clients
// =============================================================================

#[tokio::test]
async fn test_download_client_test_endpoint() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/download-clients/qbit/test").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .contains("qbittorrent"));

    fixture
        .torrent_client
        .fail_next(DownloadClientError::AuthFailed("bad password".to_string()))
        .await;
    let response = fixture.post_empty("/api/v1/download-clients/qbit/test").await;
    assert_eq!(response.body["success"], false);

    let response = fixture.post_empty("/api/v1/download-clients/ghost/test").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disabled_download_client_can_be_tested() {
    let fixture = TestFixture::with_config(TestConfig {
        disabled_entries: true,
        ..Default::default()
    })
    .await;

    let response = fixture.post_empty("/api/v1/download-clients/spare/test").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["success"], false);
    assert!(fixture.torrent_client.added_downloads().await.is_empty());
}

// =============================================================================
// Acquisition
// =============================================================================

#[tokio::test]
async fn test_catalog_entry_search_dispatches_best() {
    let fixture = TestFixture::new().await;
    fixture
        .indexer
        .set_results(vec![
            fixtures::search_result("mock", "Frank Herbert - Dune", "PDF"),
            fixtures::search_result("mock", "Frank Herbert - Dune", "EPUB"),
        ])
        .await;

    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["result"]["format"], "EPUB");
    assert_eq!(response.body["download"]["status"], "downloading");
    assert_eq!(response.body["download"]["client_name"], "qbit");
    assert_eq!(fixture.torrent_client.added_downloads().await.len(), 1);

    let book = fixture.store.get_book("dune").unwrap().unwrap();
    assert_eq!(book.status.to_string(), "downloading");
}

#[tokio::test]
async fn test_catalog_entry_search_failures() {
    let fixture = TestFixture::new().await;

    // Nothing found
    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    let book = fixture.store.get_book("dune").unwrap().unwrap();
    assert_eq!(book.status.to_string(), "missing");

    // Unknown entry
    let response = fixture.post_empty("/api/v1/catalog-entries/ghost/search").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    // Client rejects
    fixture
        .indexer
        .set_results(vec![fixtures::search_result("mock", "Dune", "EPUB")])
        .await;
    fixture
        .torrent_client
        .fail_next(DownloadClientError::Rejected("disk full".to_string()))
        .await;
    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    assert_status!(response, StatusCode::BAD_GATEWAY);
    let downloads = fixture.get("/api/v1/downloads").await;
    assert_eq!(downloads.body["count"], 0);

    // No clients configured
    let unconfigured = TestFixture::with_config(TestConfig {
        no_clients: true,
        ..Default::default()
    })
    .await;
    let response = unconfigured
        .post_empty("/api/v1/catalog-entries/dune/search")
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_download_and_lifecycle() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/downloads", json!({ "book_id": "dune" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    let response = fixture
        .post(
            "/api/v1/downloads",
            json!({
                "book_id": "dune",
                "download_url": "https://indexer.example/getnzb/abc.nzb",
                "title": "Frank Herbert - Dune (EPUB)",
                "format": "epub"
            }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.body["client_name"], "sab");
    let id = response.body["id"].as_str().unwrap().to_string();

    let response = fixture.get(&format!("/api/v1/downloads/{}", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "downloading");

    let response = fixture.get("/api/v1/downloads?status=downloading").await;
    assert_eq!(response.body["count"], 1);
    let response = fixture.get("/api/v1/downloads?status=bogus").await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    // Complete with the staged file
    let staged = fixture.staging_dir.join("Dune.epub");
    std::fs::write(&staged, b"epub").unwrap();
    let response = fixture
        .post(
            &format!("/api/v1/downloads/{}/complete", id),
            json!({ "path": staged }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["download"]["status"], "downloaded");
    assert!(fixture
        .ebook_library
        .join("Frank Herbert/Dune/Dune.epub")
        .exists());

    // Already downloaded
    let response = fixture
        .post(
            &format!("/api/v1/downloads/{}/complete", id),
            json!({ "path": staged }),
        )
        .await;
    assert_status!(response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_import_failure_on_complete() {
    let fixture = TestFixture::new().await;
    fixture
        .indexer
        .set_results(vec![fixtures::search_result("mock", "Dune", "EPUB")])
        .await;
    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    let id = response.body["download"]["id"].as_str().unwrap().to_string();

    let response = fixture
        .post(
            &format!("/api/v1/downloads/{}/complete", id),
            json!({ "path": fixture.staging_dir.join("missing.epub") }),
        )
        .await;
    assert_status!(response, StatusCode::INTERNAL_SERVER_ERROR);

    let response = fixture.get(&format!("/api/v1/downloads/{}", id)).await;
    assert_eq!(response.body["status"], "completed");
    assert!(response.body["error_message"].is_string());
}

#[tokio::test]
async fn test_fail_and_cancel_download() {
    let fixture = TestFixture::new().await;
    fixture
        .indexer
        .set_results(vec![fixtures::search_result("mock", "Dune", "EPUB")])
        .await;

    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    let id = response.body["download"]["id"].as_str().unwrap().to_string();

    let response = fixture
        .post(
            &format!("/api/v1/downloads/{}/fail", id),
            json!({ "message": "stalled" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "failed");
    assert_eq!(response.body["error_message"], "stalled");

    let response = fixture
        .delete(&format!("/api/v1/downloads/{}?delete_data=true", id))
        .await;
    assert_status!(response, StatusCode::NO_CONTENT);
    let removed = fixture.torrent_client.removed_downloads().await;
    assert_eq!(removed.len(), 1);
    assert!(removed[0].1);

    let response = fixture.get(&format!("/api/v1/downloads/{}", id)).await;
    assert_status!(response, StatusCode::NOT_FOUND);
    let response = fixture
        .post(
            "/api/v1/downloads/ghost/fail",
            json!({ "message": "x" }),
        )
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Import
// =============================================================================

#[tokio::test]
async fn test_pending_and_manual_import() {
    let fixture = TestFixture::new().await;

    let folder = fixture.staging_dir.join("J.R.R. Tolkien - The Hobbit");
    std::fs::create_dir_all(&folder).unwrap();
    for name in ["01 - Intro.mp3", "02 - Chapter One.mp3", "03 - Chapter Two.mp3"] {
        std::fs::write(folder.join(name), b"audio").unwrap();
    }

    let response = fixture.get("/api/v1/import/pending").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["count"], 1);
    assert_eq!(response.body["pending"][0]["media_type"], "audiobook");
    assert_eq!(response.body["pending"][0]["is_folder"], true);

    let response = fixture
        .post(
            "/api/v1/import/manual",
            json!({ "path": folder, "book_id": "hobbit" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["files_imported"], 3);
    let media_file_id = response.body["media_file_id"].as_str().unwrap().to_string();
    let destination = fixture.audiobook_library.join("J.R.R. Tolkien/The Hobbit");
    assert!(destination.join("02 - Chapter One.mp3").exists());

    // Same import again collides
    let response = fixture
        .post(
            "/api/v1/import/manual",
            json!({ "path": folder, "book_id": "hobbit" }),
        )
        .await;
    assert_status!(response, StatusCode::CONFLICT);

    let response = fixture
        .post(
            "/api/v1/import/manual",
            json!({ "path": folder, "book_id": "ghost" }),
        )
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);

    // Soft delete
    let response = fixture
        .delete(&format!("/api/v1/media-files/{}", media_file_id))
        .await;
    assert_status!(response, StatusCode::NO_CONTENT);
    assert!(!destination.exists());

    let response = fixture
        .delete(&format!("/api/v1/media-files/{}", media_file_id))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pending_with_missing_staging_dir() {
    let fixture = TestFixture::new().await;
    std::fs::remove_dir_all(&fixture.staging_dir).unwrap();

    let response = fixture.get("/api/v1/import/pending").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["count"], 0);
}

#[tokio::test]
async fn test_manual_import_outside_staging_is_rejected() {
    let fixture = TestFixture::new().await;

    let elsewhere = fixture.temp_dir.path().join("not-staging");
    std::fs::create_dir_all(&elsewhere).unwrap();
    let secret = elsewhere.join("secret.epub");
    std::fs::write(&secret, b"private").unwrap();

    let response = fixture
        .post(
            "/api/v1/import/manual",
            json!({ "path": secret, "book_id": "dune", "operation": "move" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(secret.exists());
    assert!(!fixture.ebook_library.join("Frank Herbert").exists());

    // Escaping through the staging directory is the same path
    let escaped = fixture.staging_dir.join("../not-staging/secret.epub");
    let response = fixture
        .post(
            "/api/v1/import/manual",
            json!({ "path": escaped, "book_id": "dune", "operation": "move" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(secret.exists());

    let response = fixture
        .post(
            "/api/v1/import/manual",
            json!({ "path": fixture.staging_dir, "book_id": "dune" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_import_relative_to_staging() {
    let fixture = TestFixture::new().await;
    std::fs::write(fixture.staging_dir.join("Dune.epub"), b"epub").unwrap();

    let response = fixture
        .post(
            "/api/v1/import/manual",
            json!({ "path": "Dune.epub", "book_id": "dune" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert!(fixture
        .ebook_library
        .join("Frank Herbert/Dune/Dune.epub")
        .exists());
}

#[tokio::test]
async fn test_complete_download_outside_staging_is_rejected() {
    let fixture = TestFixture::new().await;
    fixture
        .indexer
        .set_results(vec![fixtures::search_result("mock", "Dune", "EPUB")])
        .await;
    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    let id = response.body["download"]["id"].as_str().unwrap().to_string();

    let elsewhere = fixture.temp_dir.path().join("not-staging");
    std::fs::create_dir_all(&elsewhere).unwrap();
    let secret = elsewhere.join("secret.epub");
    std::fs::write(&secret, b"private").unwrap();

    let response = fixture
        .post(
            &format!("/api/v1/downloads/{}/complete", id),
            json!({ "path": secret }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(secret.exists());

    // Rejected before any state change
    let response = fixture.get(&format!("/api/v1/downloads/{}", id)).await;
    assert_eq!(response.body["status"], "downloading");
}

#[tokio::test]
async fn test_search_while_downloading_conflicts() {
    let fixture = TestFixture::new().await;
    fixture
        .indexer
        .set_results(vec![fixtures::search_result("mock", "Dune", "EPUB")])
        .await;
    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    assert_status!(response, StatusCode::OK);

    // A download is already in flight
    let response = fixture.post_empty("/api/v1/catalog-entries/dune/search").await;
    assert_status!(response, StatusCode::CONFLICT);
    assert_eq!(fixture.torrent_client.added_downloads().await.len(), 1);
}
