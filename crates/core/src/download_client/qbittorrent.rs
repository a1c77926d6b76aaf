//! qBittorrent Web API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{
    extract_hash_from_magnet, snippet, AddDownloadRequest, DownloadClient, DownloadClientError,
};
use crate::config::{DownloadClientConfig, DownloadClientKind};

/// qBittorrent client.
///
/// Authenticates with a form login; the SID cookie lives in the HTTP
/// client's cookie jar. A 403 on any later call means the session expired
/// and triggers exactly one re-login.
pub struct QBittorrentClient {
    client: Client,
    config: DownloadClientConfig,
    authenticated: RwLock<bool>,
}

impl QBittorrentClient {
    pub fn new(config: DownloadClientConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()
            .unwrap_or_default();

        Self {
            client,
            config,
            authenticated: RwLock::new(false),
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url(), endpoint)
    }

    async fn login(&self) -> Result<(), DownloadClientError> {
        let params = [
            ("username", self.config.username.as_deref().unwrap_or_default()),
            ("password", self.config.password.as_deref().unwrap_or_default()),
        ];

        let response = self
            .client
            .post(self.url("/api/v2/auth/login"))
            // required by CSRF protection
            .header(reqwest::header::REFERER, self.base_url())
            .form(&params)
            .send()
            .await
            .map_err(DownloadClientError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::FORBIDDEN || body.contains("Fails.") {
            *self.authenticated.write().await = false;
            return Err(DownloadClientError::AuthFailed(format!(
                "{}: invalid credentials",
                self.config.name
            )));
        }
        if status.is_success() && body.contains("Ok.") {
            debug!(client = %self.config.name, "qBittorrent login successful");
            *self.authenticated.write().await = true;
            return Ok(());
        }
        Err(DownloadClientError::AuthFailed(format!(
            "{}: unexpected login response (HTTP {}): {}",
            self.config.name,
            status,
            snippet(&body)
        )))
    }

    async fn ensure_authenticated(&self) -> Result<(), DownloadClientError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, re-logging in once on 403.
    async fn call<F>(&self, build: F) -> Result<String, DownloadClientError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let mut response = build(&self.client)
            .send()
            .await
            .map_err(DownloadClientError::from_reqwest)?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!(client = %self.config.name, "qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            response = build(&self.client)
                .send()
                .await
                .map_err(DownloadClientError::from_reqwest)?;
        }

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(DownloadClientError::AuthFailed(format!(
                "{}: forbidden after re-login",
                self.config.name
            )));
        }
        if !status.is_success() {
            return Err(DownloadClientError::ApiError(format!(
                "{}: HTTP {}",
                self.config.name, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| DownloadClientError::ApiError(format!("Failed to read response: {}", e)))
    }

    /// Newest torrent in our category; used when a .torrent URL was added
    /// and the hash is not known up front.
    async fn newest_hash(&self, category: Option<&str>) -> Result<String, DownloadClientError> {
        let mut endpoint = "/api/v2/torrents/info?sort=added_on&reverse=true&limit=1".to_string();
        if let Some(category) = category {
            endpoint.push_str(&format!("&category={}", urlencoding::encode(category)));
        }
        let url = self.url(&endpoint);
        let body = self.call(|c| c.get(&url)).await?;

        let torrents: Vec<QBTorrent> = serde_json::from_str(&body).map_err(|e| {
            DownloadClientError::Protocol(format!("Failed to parse torrent list: {}", e))
        })?;
        torrents
            .into_iter()
            .next()
            .map(|t| t.hash.to_lowercase())
            .ok_or_else(|| {
                DownloadClientError::Protocol(format!(
                    "{}: torrent accepted but not listed",
                    self.config.name
                ))
            })
    }
}

#[derive(Debug, Deserialize)]
struct QBTorrent {
    hash: String,
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> DownloadClientKind {
        DownloadClientKind::QBittorrent
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<String, DownloadClientError> {
        let url = self.url("/api/v2/app/version");
        let version = self.call(|c| c.get(&url)).await?;
        Ok(version.trim().to_string())
    }

    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError> {
        let category = request
            .category
            .as_deref()
            .or(self.config.category.as_deref());

        let url = self.url("/api/v2/torrents/add");
        let body = self
            .call(|c| {
                let mut form = multipart::Form::new().text("urls", request.url.clone());
                if let Some(category) = category {
                    form = form.text("category", category.to_string());
                }
                c.post(&url).multipart(form)
            })
            .await?;

        if body.contains("Fails.") {
            return Err(DownloadClientError::Rejected(format!(
                "{}: torrent rejected",
                self.config.name
            )));
        }

        let id = match extract_hash_from_magnet(&request.url) {
            Some(hash) => hash,
            None => self.newest_hash(category).await?,
        };
        debug!(client = %self.config.name, id = %id, "Torrent added");
        Ok(id)
    }

    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError> {
        let url = self.url("/api/v2/torrents/delete");
        let hash = id.to_lowercase();
        let delete = if delete_data { "true" } else { "false" };
        self.call(|c| {
            c.post(&url)
                .form(&[("hashes", hash.as_str()), ("deleteFiles", delete)])
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download_client::test_support::{client_config, serve};
    use crate::config::Protocol;
    use axum::{
        extract::State,
        http::StatusCode as AxumStatus,
        response::IntoResponse,
        routing::{get, post},
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        logins: AtomicUsize,
        version_calls: AtomicUsize,
        added: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    fn router(state: Arc<Recorded>, password: &'static str) -> Router {
        Router::new()
            .route(
                "/api/v2/auth/login",
                post(move |State(s): State<Arc<Recorded>>, body: String| async move {
                    s.logins.fetch_add(1, Ordering::SeqCst);
                    if body.contains(&format!("password={}", password)) {
                        ([("set-cookie", "SID=abc; path=/")], "Ok.").into_response()
                    } else {
                        "Fails.".into_response()
                    }
                }),
            )
            .route(
                "/api/v2/app/version",
                get(|State(s): State<Arc<Recorded>>| async move {
                    // First call simulates an expired session
                    if s.version_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::FORBIDDEN, "Forbidden")
                    } else {
                        (AxumStatus::OK, "v4.6.2")
                    }
                }),
            )
            .route(
                "/api/v2/torrents/add",
                post(|State(s): State<Arc<Recorded>>, body: String| async move {
                    s.added.lock().unwrap().push(body);
                    "Ok."
                }),
            )
            .route(
                "/api/v2/torrents/info",
                get(|| async { r#"[{"hash":"FEEDBEEF"}]"# }),
            )
            .route(
                "/api/v2/torrents/delete",
                post(|State(s): State<Arc<Recorded>>, body: String| async move {
                    s.deleted.lock().unwrap().push(body);
                    ""
                }),
            )
            .with_state(state)
    }

    fn config(url: String, password: &str) -> DownloadClientConfig {
        let mut config = client_config("qbit", DownloadClientKind::QBittorrent, url);
        config.username = Some("admin".to_string());
        config.password = Some(password.to_string());
        config.category = Some("books".to_string());
        config
    }

    #[tokio::test]
    async fn test_relogin_on_expired_session() {
        let state = Arc::new(Recorded::default());
        let url = serve(router(state.clone(), "secret")).await;
        let client = QBittorrentClient::new(config(url, "secret"));

        let version = client.test().await.unwrap();
        assert_eq!(version, "v4.6.2");
        assert_eq!(state.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let state = Arc::new(Recorded::default());
        let url = serve(router(state, "secret")).await;
        let client = QBittorrentClient::new(config(url, "wrong"));

        assert!(matches!(
            client.test().await,
            Err(DownloadClientError::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_add_magnet_returns_hash() {
        let state = Arc::new(Recorded::default());
        let url = serve(router(state.clone(), "secret")).await;
        let client = QBittorrentClient::new(config(url, "secret"));

        let request = AddDownloadRequest::new(
            "magnet:?xt=urn:btih:ABCDEF0123&dn=Dune",
            "Dune",
            Protocol::Torrent,
        );
        let id = client.add_download(&request).await.unwrap();
        assert_eq!(id, "abcdef0123");

        let added = state.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert!(added[0].contains("magnet:?xt=urn:btih:ABCDEF0123"));
        assert!(added[0].contains("books"));
    }

    #[tokio::test]
    async fn test_add_torrent_url_looks_up_hash() {
        let state = Arc::new(Recorded::default());
        let url = serve(router(state, "secret")).await;
        let client = QBittorrentClient::new(config(url, "secret"));

        let request = AddDownloadRequest::new(
            "https://tracker.example/dl/1.torrent",
            "Dune",
            Protocol::Torrent,
        );
        assert_eq!(client.add_download(&request).await.unwrap(), "feedbeef");
    }

    #[tokio::test]
    async fn test_remove_download() {
        let state = Arc::new(Recorded::default());
        let url = serve(router(state.clone(), "secret")).await;
        let client = QBittorrentClient::new(config(url, "secret"));

        client.remove_download("ABC", true).await.unwrap();
        let deleted = state.deleted.lock().unwrap();
        assert!(deleted[0].contains("hashes=abc"));
        assert!(deleted[0].contains("deleteFiles=true"));
    }
}
