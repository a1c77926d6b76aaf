//! Transmission RPC client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{snippet, AddDownloadRequest, DownloadClient, DownloadClientError};
use crate::config::{DownloadClientConfig, DownloadClientKind};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Transmission client.
///
/// Every RPC must carry the current session id. The server hands one out
/// by answering 409 with the id in a header; the call is then repeated
/// once with it.
pub struct TransmissionClient {
    client: Client,
    config: DownloadClientConfig,
    session_id: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

impl TransmissionClient {
    pub fn new(config: DownloadClientConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            config,
            session_id: RwLock::new(None),
        }
    }

    fn rpc_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        if base.ends_with("/rpc") {
            base.to_string()
        } else {
            format!("{}/transmission/rpc", base)
        }
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, DownloadClientError> {
        let mut request = self.client.post(self.rpc_url()).json(body);
        if let Some(id) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, id);
        }
        if let Some(user) = self.config.username.as_deref() {
            request = request.basic_auth(user, self.config.password.as_deref());
        }
        request.send().await.map_err(DownloadClientError::from_reqwest)
    }

    async fn rpc(&self, method: &str, arguments: Value) -> Result<Value, DownloadClientError> {
        let body = json!({ "method": method, "arguments": arguments });

        let mut response = self.post(&body).await?;
        if response.status() == StatusCode::CONFLICT {
            let id = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    DownloadClientError::Protocol(format!(
                        "{}: 409 without {}",
                        self.config.name, SESSION_HEADER
                    ))
                })?;
            debug!(client = %self.config.name, "Refreshed Transmission session id");
            *self.session_id.write().await = Some(id);
            response = self.post(&body).await?;
        }

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
        let parsed: RpcResponse = serde_json::from_str(&text).map_err(|e| {
            DownloadClientError::Protocol(format!("{}: {} ({})", self.config.name, e, snippet(&text)))
        })?;

        if parsed.result != "success" {
            return Err(DownloadClientError::Rejected(format!(
                "{}: {}",
                self.config.name, parsed.result
            )));
        }
        Ok(parsed.arguments)
    }
}

#[async_trait]
impl DownloadClient for TransmissionClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> DownloadClientKind {
        DownloadClientKind::Transmission
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<String, DownloadClientError> {
        let arguments = self.rpc("session-get", json!({ "fields": ["version"] })).await?;
        Ok(arguments
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError> {
        let mut arguments = json!({ "filename": request.url, "paused": false });
        if let Some(category) = request.category.as_ref().or(self.config.category.as_ref()) {
            arguments["labels"] = json!([category]);
        }

        let response = self.rpc("torrent-add", arguments).await?;
        let torrent = response
            .get("torrent-added")
            .or_else(|| response.get("torrent-duplicate"))
            .ok_or_else(|| {
                DownloadClientError::Protocol(format!(
                    "{}: torrent-add returned no torrent",
                    self.config.name
                ))
            })?;

        torrent
            .get("hashString")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .or_else(|| torrent.get("id").and_then(Value::as_i64).map(|id| id.to_string()))
            .ok_or_else(|| {
                DownloadClientError::Protocol(format!("{}: torrent has no id", self.config.name))
            })
    }

    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError> {
        let target = match id.parse::<i64>() {
            Ok(numeric) => json!(numeric),
            Err(_) => json!(id),
        };
        self.rpc(
            "torrent-remove",
            json!({ "ids": [target], "delete-local-data": delete_data }),
        )
        .await?;
        Ok(())
    }
}
