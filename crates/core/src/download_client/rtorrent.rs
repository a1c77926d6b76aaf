//! rTorrent XML-RPC client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::types::{
    extract_hash_from_magnet, snippet, AddDownloadRequest, DownloadClient, DownloadClientError,
};
use super::xmlrpc::{encode_call, parse_response, ResponseError, XmlRpcValue};
use crate::config::{DownloadClientConfig, DownloadClientKind};

/// Prefix of the ids handed out for torrents added by URL, whose hash is
/// only known once rTorrent has fetched the file.
const TAG_PREFIX: &str = "librarr-";

/// rTorrent client. `url` is the full XML-RPC endpoint (usually `/RPC2`).
///
/// Magnets are identified by their info hash. Torrents added by URL carry
/// a generated tag in `d.custom2` and are identified by that tag until
/// resolved against the download list.
pub struct RtorrentClient {
    client: Client,
    config: DownloadClientConfig,
}

impl RtorrentClient {
    pub fn new(config: DownloadClientConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn call(&self, method: &str, params: &[XmlRpcValue]) -> Result<XmlRpcValue, DownloadClientError> {
        let mut request = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(encode_call(method, params));
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

        let body = response
            .text()
            .await
            .map_err(|e| DownloadClientError::ApiError(format!("Failed to read response: {}", e)))?;
        parse_response(&body).map_err(|e| match e {
            ResponseError::Fault { code, message } => DownloadClientError::ApiError(format!(
                "{}: {} fault {}: {}",
                self.config.name, method, code, message
            )),
            ResponseError::Malformed(reason) => DownloadClientError::Protocol(format!(
                "{}: {} ({})",
                self.config.name,
                reason,
                snippet(&body)
            )),
        })
    }

    /// Find the hash of the torrent carrying `tag` in `d.custom2`.
    async fn resolve_tag(&self, tag: &str) -> Result<String, DownloadClientError> {
        let rows = self
            .call(
                "d.multicall2",
                &["".into(), "main".into(), "d.hash=".into(), "d.custom2=".into()],
            )
            .await?;

        rows.as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(|row| {
                let fields = row.as_array()?;
                let hash = fields.first()?.as_str()?;
                let custom = fields.get(1)?.as_str()?;
                (custom == tag).then(|| hash.to_lowercase())
            })
            .next()
            .ok_or_else(|| DownloadClientError::NotFound(tag.to_string()))
    }
}

#[async_trait]
impl DownloadClient for RtorrentClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> DownloadClientKind {
        DownloadClientKind::Rtorrent
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<String, DownloadClientError> {
        let version = self.call("system.client_version", &[]).await?;
        version.as_str().map(str::to_string).ok_or_else(|| {
            DownloadClientError::Protocol(format!("{}: version is not a string", self.config.name))
        })
    }

    async fn add_download(&self, request: &AddDownloadRequest) -> Result<String, DownloadClientError> {
        let id = match extract_hash_from_magnet(&request.url) {
            Some(hash) => hash,
            None => format!("{}{}", TAG_PREFIX, uuid::Uuid::new_v4().simple()),
        };

        let mut params: Vec<XmlRpcValue> = vec!["".into(), request.url.as_str().into()];
        if let Some(label) = request.category.as_ref().or(self.config.category.as_ref()) {
            params.push(format!("d.custom1.set={}", label).into());
        }
        if id.starts_with(TAG_PREFIX) {
            params.push(format!("d.custom2.set={}", id).into());
        }

        let result = self.call("load.start", &params).await?;
        if result.as_i64().is_some_and(|code| code != 0) {
            return Err(DownloadClientError::Rejected(format!(
                "{}: load.start returned {}",
                self.config.name,
                result.as_i64().unwrap_or_default()
            )));
        }
        debug!(client = %self.config.name, id = %id, "Torrent loaded");
        Ok(id)
    }

    async fn remove_download(&self, id: &str, delete_data: bool) -> Result<(), DownloadClientError> {
        let hash = if id.starts_with(TAG_PREFIX) {
            self.resolve_tag(id).await?
        } else {
            id.to_lowercase()
        };
        let target: XmlRpcValue = hash.to_uppercase().into();

        if delete_data {
            // ruTorrent's erasedata convention: custom5=1 removes files on erase
            self.call("d.custom5.set", &[target.clone(), "1".into()]).await?;
        }
        self.call("d.erase", &[target]).await?;
        Ok(())
    }
}
