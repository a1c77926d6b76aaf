//! NZBGet JSON-RPC client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::types::{snippet, AddDownloadRequest, DownloadClient, DownloadClientError};
use crate::config::{DownloadClientConfig, DownloadClientKind};

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
}

pub struct NzbgetClient {
    client: Client,
    config: DownloadClientConfig,
}

impl NzbgetClient {
    pub fn new(config: DownloadClientConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn rpc_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        if base.ends_with("/jsonrpc") {
            base.to_string()
        } else {
            format!("{}/jsonrpc", base)
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, DownloadClientError> {
        let mut request = self
            .client
            .post(self.rpc_url())
            .json(&json!({ "method": method, "params": params }));
        if let Some(user) = self.config.username.as_deref() {
            request = request.basic_auth(user, self.config.password.as_deref());
        }
        let response = request.send().await.map_err(DownloadClientError::from_reqwest)?;

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

        match parsed.error {
            Some(error) => Err(DownloadClientError::ApiError(format!(
                "{}: {}: {}",
                self.config.name, method, error.message
            ))),
            None => Ok(parsed.result),
        }
    }

    /// Run an editqueue command against one NZB id.
    async fn edit(&self, command: &str, id: i64) -> Result<bool, DownloadClientError> {
        let result = self.rpc("editqueue", json!([command, "", [id]])).await?;
        Ok(result.as_bool().unwrap_or(false))
    }
}

/// NZB file name for the append call.
fn nzb_filename(title: &str) -> String {
    if title.to_lowercase().ends_with(".nzb") {
        title.to_string()
    } else {
        format!("{}.nzb", title)
    }
}

#[async_trait]
impl DownloadClient for NzbgetClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> DownloadClientKind {
        DownloadClientKind::Nzbget
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<String, DownloadClientError> {
        let version = self.rpc("version", json!([])).await?;
        Ok(version.as_str().unwrap_or("unknown").to_string())
    }

    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError> {
        let category = request
            .category
            .as_deref()
            .or(self.config.category.as_deref())
            .unwrap_or_default();

        // NZBFilename, Content (URL), Category, Priority, AddToTop, AddPaused,
        // DupeKey, DupeScore, DupeMode, PPParameters
        let params = json!([
            nzb_filename(&request.title),
            request.url,
            category,
            0,
            false,
            false,
            "",
            0,
            "SCORE",
            []
        ]);
        let result = self.rpc("append", params).await?;
        let id = result.as_i64().unwrap_or(0);
        if id <= 0 {
            return Err(DownloadClientError::Rejected(format!(
                "{}: append returned {}",
                self.config.name, result
            )));
        }
        debug!(client = %self.config.name, id, "NZB queued");
        Ok(id.to_string())
    }

    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError> {
        let nzb_id: i64 = id
            .parse()
            .map_err(|_| DownloadClientError::NotFound(id.to_string()))?;

        let (queue_cmd, history_cmd) = if delete_data {
            ("GroupFinalDelete", "HistoryFinalDelete")
        } else {
            ("GroupDelete", "HistoryDelete")
        };
        if self.edit(queue_cmd, nzb_id).await? || self.edit(history_cmd, nzb_id).await? {
            Ok(())
        } else {
            Err(DownloadClientError::NotFound(id.to_string()))
        }
    }
}
