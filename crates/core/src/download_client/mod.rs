//! Download client abstraction.
//!
//! This module provides a `DownloadClient` trait over six backends with
//! incompatible wire protocols: qBittorrent, Transmission, Deluge and
//! rTorrent for torrents, SABnzbd and NZBGet for usenet.

mod deluge;
mod nzbget;
mod qbittorrent;
mod rtorrent;
mod sabnzbd;
mod transmission;
mod types;
mod xmlrpc;

use std::sync::Arc;

use crate::config::{DownloadClientConfig, DownloadClientKind};

pub use deluge::DelugeClient;
pub use nzbget::NzbgetClient;
pub use qbittorrent::QBittorrentClient;
pub use rtorrent::RtorrentClient;
pub use sabnzbd::SabnzbdClient;
pub use transmission::TransmissionClient;
pub use types::*;

/// Build the adapter for a config entry.
pub fn create_download_client(
    config: &DownloadClientConfig,
) -> Result<Arc<dyn DownloadClient>, DownloadClientError> {
    if config.url.trim().is_empty() {
        return Err(DownloadClientError::InvalidConfig(format!(
            "download client '{}' has no url",
            config.name
        )));
    }

    let client: Arc<dyn DownloadClient> = match config.kind {
        DownloadClientKind::QBittorrent => Arc::new(QBittorrentClient::new(config.clone())),
        DownloadClientKind::Transmission => Arc::new(TransmissionClient::new(config.clone())),
        DownloadClientKind::Deluge => Arc::new(DelugeClient::new(config.clone())),
        DownloadClientKind::Sabnzbd => Arc::new(SabnzbdClient::new(config.clone())?),
        DownloadClientKind::Nzbget => Arc::new(NzbgetClient::new(config.clone())),
        DownloadClientKind::Rtorrent => Arc::new(RtorrentClient::new(config.clone())),
    };
    Ok(client)
}

/// Build adapters for every enabled config entry, lowest priority first.
pub fn create_download_clients(
    configs: &[DownloadClientConfig],
) -> Result<Vec<Arc<dyn DownloadClient>>, DownloadClientError> {
    let mut clients = configs
        .iter()
        .filter(|c| c.enabled)
        .map(create_download_client)
        .collect::<Result<Vec<_>, _>>()?;
    clients.sort_by_key(|c| c.priority());
    Ok(clients)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{DownloadClientConfig, DownloadClientKind};
    use axum::Router;

    pub fn client_config(name: &str, kind: DownloadClientKind, url: String) -> DownloadClientConfig {
        DownloadClientConfig {
            name: name.to_string(),
            kind,
            url,
            username: None,
            password: None,
            api_key: None,
            category: None,
            priority: 1,
            enabled: true,
            timeout_secs: 5,
        }
    }

    /// Serve `router` on an ephemeral port; returns its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
