//! SABnzbd API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::types::{snippet, AddDownloadRequest, DownloadClient, DownloadClientError};
use crate::config::{DownloadClientConfig, DownloadClientKind};

/// SABnzbd client. Every call is a GET on `/api` carrying the API key.
pub struct SabnzbdClient {
    client: Client,
    config: DownloadClientConfig,
}

impl SabnzbdClient {
    pub fn new(config: DownloadClientConfig) -> Result<Self, DownloadClientError> {
        if config.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(DownloadClientError::InvalidConfig(format!(
                "{}: sabnzbd requires an api_key",
                config.name
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Ok(Self { client, config })
    }

    fn api_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        format!("{}/api", base)
    }

    async fn api(&self, params: &[(&str, &str)]) -> Result<Value, DownloadClientError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let response = self
            .client
            .get(self.api_url())
            .query(params)
            .query(&[("apikey", api_key), ("output", "json")])
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
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            DownloadClientError::Protocol(format!("{}: {} ({})", self.config.name, e, snippet(&text)))
        })?;

        if value.get("status") == Some(&Value::Bool(false)) {
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            if error.to_lowercase().contains("api key") {
                return Err(DownloadClientError::AuthFailed(format!(
                    "{}: {}",
                    self.config.name, error
                )));
            }
            return Err(DownloadClientError::ApiError(format!(
                "{}: {}",
                self.config.name, error
            )));
        }
        Ok(value)
    }
}

#[async_trait]
impl DownloadClient for SabnzbdClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> DownloadClientKind {
        DownloadClientKind::Sabnzbd
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<String, DownloadClientError> {
        // mode=version does not check the key, so confirm it with a queue read
        self.api(&[("mode", "queue"), ("limit", "1")]).await?;
        let value = self.api(&[("mode", "version")]).await?;
        Ok(value
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError> {
        let mut params = vec![
            ("mode", "addurl"),
            ("name", request.url.as_str()),
            ("nzbname", request.title.as_str()),
        ];
        if let Some(category) = request.category.as_ref().or(self.config.category.as_ref()) {
            params.push(("cat", category.as_str()));
        }

        let value = self.api(&params).await?;
        let id = value
            .get("nzo_ids")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                DownloadClientError::Rejected(format!("{}: no nzo id returned", self.config.name))
            })?;
        debug!(client = %self.config.name, id = %id, "NZB queued");
        Ok(id)
    }

    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError> {
        let del_files = if delete_data { "1" } else { "0" };
        // The job may still be queued or already in history
        self.api(&[("mode", "queue"), ("name", "delete"), ("value", id), ("del_files", del_files)])
            .await?;
        self.api(&[("mode", "history"), ("name", "delete"), ("value", id), ("del_files", del_files)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::download_client::test_support::{client_config, serve};
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn handler(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        if q.get("apikey").map(String::as_str) != Some("sabkey") {
            return Json(json!({"status": false, "error": "API Key Incorrect"}));
        }
        let reply = match q.get("mode").map(String::as_str) {
            Some("version") => json!({"version": "4.2.1"}),
            Some("queue") if q.contains_key("name") => json!({"status": true, "nzo_ids": []}),
            Some("queue") => json!({"queue": {"slots": []}}),
            Some("history") => json!({"status": true}),
            Some("addurl") if q.get("cat").map(String::as_str) == Some("books") => {
                json!({"status": true, "nzo_ids": ["SABnzbd_nzo_abc"]})
            }
            Some("addurl") => json!({"status": true, "nzo_ids": []}),
            _ => json!({"status": false, "error": "not implemented"}),
        };
        Json(reply)
    }

    async fn client(key: &str) -> SabnzbdClient {
        let url = serve(Router::new().route("/api", get(handler))).await;
        let mut config = client_config("sab", DownloadClientKind::Sabnzbd, url);
        config.api_key = Some(key.to_string());
        config.category = Some("books".to_string());
        SabnzbdClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_version() {
        assert_eq!(client("sabkey").await.test().await.unwrap(), "4.2.1");
    }

    #[tokio::test]
    async fn test_bad_api_key() {
        assert!(matches!(
            client("nope").await.test().await,
            Err(DownloadClientError::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_add_returns_nzo_id() {
        let client = client("sabkey").await;
        let request = AddDownloadRequest::new("https://indexer/get/1.nzb", "Dune", Protocol::Usenet);
        assert_eq!(client.add_download(&request).await.unwrap(), "SABnzbd_nzo_abc");
        client.remove_download("SABnzbd_nzo_abc", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_without_id_is_rejected() {
        let client = client("sabkey").await;
        let request = AddDownloadRequest::new("https://indexer/get/1.nzb", "Dune", Protocol::Usenet)
            .with_category("other");
        assert!(matches!(
            client.add_download(&request).await,
            Err(DownloadClientError::Rejected(_))
        ));
    }

    #[test]
    fn test_requires_api_key() {
        let config = client_config("sab", DownloadClientKind::Sabnzbd, "http://x".to_string());
        assert!(matches!(
            SabnzbdClient::new(config),
            Err(DownloadClientError::InvalidConfig(_))
        ));
    }
}
