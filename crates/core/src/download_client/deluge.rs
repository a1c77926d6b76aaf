//! Deluge Web UI JSON-RPC client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{
    extract_hash_from_magnet, snippet, AddDownloadRequest, DownloadClient, DownloadClientError,
};
use crate::config::{DownloadClientConfig, DownloadClientKind};

/// Error code Deluge uses for an unauthenticated session.
const NOT_AUTHENTICATED: i64 = 1;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

/// Deluge client speaking to the web UI's `/json` endpoint.
///
/// The web UI authenticates with `auth.login` (session cookie) and must
/// be connected to a daemon before torrent calls work.
pub struct DelugeClient {
    client: Client,
    config: DownloadClientConfig,
    authenticated: RwLock<bool>,
    next_id: AtomicU64,
}

impl DelugeClient {
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
            next_id: AtomicU64::new(1),
        }
    }

    fn json_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        if base.ends_with("/json") {
            base.to_string()
        } else {
            format!("{}/json", base)
        }
    }

    /// One raw JSON-RPC round trip.
    async fn call_raw(&self, method: &str, params: Value) -> Result<RpcResponse, DownloadClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "method": method, "params": params, "id": id });

        let response = self
            .client
            .post(self.json_url())
            .json(&body)
            .send()
            .await
            .map_err(DownloadClientError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DownloadClientError::AuthFailed(format!(
                "{}: HTTP {}",
                self.config.name, status
            )));
        }
        if !status.is_success() {
            return Err(DownloadClientError::ApiError(format!(
                "{}: HTTP {}",
                self.config.name, status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DownloadClientError::ApiError(format!("Failed to read response: {}", e)))?;
        serde_json::from_str(&text).map_err(|e| {
            DownloadClientError::Protocol(format!("{}: {} ({})", self.config.name, e, snippet(&text)))
        })
    }

    async fn login(&self) -> Result<(), DownloadClientError> {
        let password = self.config.password.clone().unwrap_or_default();
        let response = self.call_raw("auth.login", json!([password])).await?;

        if let Some(error) = response.error {
            return Err(DownloadClientError::ApiError(format!(
                "{}: auth.login: {}",
                self.config.name, error.message
            )));
        }
        // {result: false, error: null} is how the web UI reports a bad password
        if response.result != Value::Bool(true) {
            *self.authenticated.write().await = false;
            return Err(DownloadClientError::AuthFailed(format!(
                "{}: invalid password",
                self.config.name
            )));
        }

        *self.authenticated.write().await = true;
        debug!(client = %self.config.name, "Deluge login successful");
        self.ensure_connected().await
    }

    /// Connect the web UI to the first known daemon if it is not connected.
    async fn ensure_connected(&self) -> Result<(), DownloadClientError> {
        let connected = self.call_raw("web.connected", json!([])).await?;
        if connected.result == Value::Bool(true) {
            return Ok(());
        }

        let hosts = self.call_raw("web.get_hosts", json!([])).await?;
        let host_id = hosts
            .result
            .as_array()
            .and_then(|hosts| hosts.first())
            .and_then(|host| host.get(0))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DownloadClientError::ApiError(format!(
                    "{}: web UI has no daemon configured",
                    self.config.name
                ))
            })?
            .to_string();

        debug!(client = %self.config.name, host = %host_id, "Connecting Deluge web UI to daemon");
        let response = self.call_raw("web.connect", json!([host_id])).await?;
        match response.error {
            Some(error) => Err(DownloadClientError::ConnectionFailed(format!(
                "{}: {}",
                self.config.name, error.message
            ))),
            None => Ok(()),
        }
    }

    /// Authenticated call; logs in first and again once if the session lapsed.
    async fn call(&self, method: &str, params: Value) -> Result<Value, DownloadClientError> {
        if !*self.authenticated.read().await {
            self.login().await?;
        }

        let mut response = self.call_raw(method, params.clone()).await?;
        if matches!(&response.error, Some(e) if e.code == NOT_AUTHENTICATED) {
            warn!(client = %self.config.name, "Deluge session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            response = self.call_raw(method, params).await?;
        }

        match response.error {
            Some(error) if error.code == NOT_AUTHENTICATED => Err(DownloadClientError::AuthFailed(
                format!("{}: {}", self.config.name, error.message),
            )),
            Some(error) => Err(DownloadClientError::ApiError(format!(
                "{}: {}: {}",
                self.config.name, method, error.message
            ))),
            None => Ok(response.result),
        }
    }
}

#[async_trait]
impl DownloadClient for DelugeClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> DownloadClientKind {
        DownloadClientKind::Deluge
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<String, DownloadClientError> {
        let version = self.call("daemon.info", json!([])).await?;
        Ok(version.as_str().unwrap_or("unknown").to_string())
    }

    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError> {
        let method = if request.is_magnet() {
            "core.add_torrent_magnet"
        } else {
            "core.add_torrent_url"
        };
        let result = self.call(method, json!([request.url, {}])).await?;

        let hash = match result.as_str() {
            Some(hash) => hash.to_lowercase(),
            // null means the daemon already has it
            None => extract_hash_from_magnet(&request.url).ok_or_else(|| {
                DownloadClientError::Rejected(format!(
                    "{}: torrent not added (duplicate or invalid)",
                    self.config.name
                ))
            })?,
        };

        if let Some(label) = request.category.as_ref().or(self.config.category.as_ref()) {
            if let Err(e) = self.call("label.set_torrent", json!([hash, label])).await {
                warn!(client = %self.config.name, error = %e, "Failed to label torrent");
            }
        }
        Ok(hash)
    }

    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError> {
        let removed = self
            .call("core.remove_torrent", json!([id.to_lowercase(), delete_data]))
            .await?;
        if removed == Value::Bool(false) {
            return Err(DownloadClientError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::download_client::test_support::{client_config, serve};
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Daemon {
        methods: Mutex<Vec<String>>,
    }

    async fn handler(State(daemon): State<Arc<Daemon>>, Json(body): Json<Value>) -> Json<Value> {
        let method = body["method"].as_str().unwrap_or_default().to_string();
        daemon.methods.lock().unwrap().push(method.clone());
        let id = body["id"].clone();
        let result = match method.as_str() {
            "auth.login" => json!(body["params"][0] == "deluge"),
            "web.connected" => json!(false),
            "web.get_hosts" => json!([["host-1", "127.0.0.1", 58846, "Online"]]),
            "web.connect" => json!(null),
            "daemon.info" => json!("2.1.1"),
            "core.add_torrent_magnet" => json!("ABCDEF"),
            "core.add_torrent_url" => json!(null),
            "label.set_torrent" => json!(null),
            "core.remove_torrent" => json!(true),
            _ => {
                return Json(json!({"result": null, "error": {"message": "Unknown method", "code": 2}, "id": id}))
            }
        };
        Json(json!({"result": result, "error": null, "id": id}))
    }

    async fn client(password: &str) -> (DelugeClient, Arc<Daemon>) {
        let daemon = Arc::new(Daemon::default());
        let url = serve(
            Router::new()
                .route("/json", post(handler))
                .with_state(daemon.clone()),
        )
        .await;
        let mut config = client_config("deluge", DownloadClientKind::Deluge, url);
        config.password = Some(password.to_string());
        config.category = Some("books".to_string());
        (DelugeClient::new(config), daemon)
    }

    #[tokio::test]
    async fn test_login_false_without_error_is_auth_failure() {
        let (client, _) = client("wrong").await;
        assert!(matches!(
            client.test().await,
            Err(DownloadClientError::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_connects_to_daemon_and_reports_version() {
        let (client, daemon) = client("deluge").await;
        assert_eq!(client.test().await.unwrap(), "2.1.1");
        let methods = daemon.methods.lock().unwrap().clone();
        assert_eq!(
            methods,
            vec!["auth.login", "web.connected", "web.get_hosts", "web.connect", "daemon.info"]
        );
    }

    #[tokio::test]
    async fn test_add_magnet_sets_label() {
        let (client, daemon) = client("deluge").await;
        let request = AddDownloadRequest::new("magnet:?xt=urn:btih:abcdef", "Dune", Protocol::Torrent);
        assert_eq!(client.add_download(&request).await.unwrap(), "abcdef");
        assert!(daemon
            .methods
            .lock()
            .unwrap()
            .contains(&"label.set_torrent".to_string()));
        client.remove_download("abcdef", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_url_add_returning_null_is_rejected() {
        let (client, _) = client("deluge").await;
        let request = AddDownloadRequest::new("https://x/1.torrent", "Dune", Protocol::Torrent);
        assert!(matches!(
            client.add_download(&request).await,
            Err(DownloadClientError::Rejected(_))
        ));
    }
}
