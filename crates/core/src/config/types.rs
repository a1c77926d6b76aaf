use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::converter::ConverterConfig;
use crate::library::ImportOperation;
use crate::quality::QualityProfile;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub indexers: Vec<IndexerConfig>,
    #[serde(default)]
    pub download_clients: Vec<DownloadClientConfig>,
    #[serde(default)]
    pub quality_profiles: Vec<QualityProfile>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8787
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("librarr.db")
}

/// Filesystem locations used by the import pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Where download clients drop completed transfers.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    /// Root of the organized ebook library.
    #[serde(default = "default_ebook_library")]
    pub ebook_library: PathBuf,
    /// Root of the organized audiobook library.
    #[serde(default = "default_audiobook_library")]
    pub audiobook_library: PathBuf,
    /// Soft-deleted media files are moved here. Defaults to `.recycle`
    /// next to the ebook library when unset.
    #[serde(default)]
    pub recycle_bin: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            ebook_library: default_ebook_library(),
            audiobook_library: default_audiobook_library(),
            recycle_bin: None,
        }
    }
}

impl PathsConfig {
    pub fn recycle_bin_dir(&self) -> PathBuf {
        self.recycle_bin
            .clone()
            .unwrap_or_else(|| self.ebook_library.join(".recycle"))
    }
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("/downloads")
}

fn default_ebook_library() -> PathBuf {
    PathBuf::from("/books")
}

fn default_audiobook_library() -> PathBuf {
    PathBuf::from("/audiobooks")
}

/// Search fan-out settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Deadline applied to every indexer in a fan-out search.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// Import pipeline settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub operation: ImportOperation,
}

fn default_timeout() -> u64 {
    30
}

fn default_priority() -> u32 {
    25
}

fn default_true() -> bool {
    true
}

/// Kind of search source an indexer entry points at.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndexerKind {
    /// Newznab/Torznab style API with an API key.
    Newznab,
    /// Private tracker JSON API authenticated with a session cookie.
    Tracker,
    /// Public HTML search page.
    Scrape,
}

impl fmt::Display for IndexerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexerKind::Newznab => write!(f, "newznab"),
            IndexerKind::Tracker => write!(f, "tracker"),
            IndexerKind::Scrape => write!(f, "scrape"),
        }
    }
}

impl FromStr for IndexerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "newznab" | "torznab" => Ok(IndexerKind::Newznab),
            "tracker" | "cookie" => Ok(IndexerKind::Tracker),
            "scrape" => Ok(IndexerKind::Scrape),
            _ => Err(format!("Unknown indexer kind: {}", s)),
        }
    }
}

/// One configured search source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Unique name, used in logs and API paths.
    pub name: String,
    pub kind: IndexerKind,
    /// Base URL (e.g., "https://indexer.example/api").
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Session cookie for tracker indexers.
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Lower value is searched and ranked first.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Only keep VIP releases (tracker indexers).
    #[serde(default)]
    pub vip_only: bool,
    /// Only keep freeleech releases (tracker indexers).
    #[serde(default)]
    pub freeleech_only: bool,
    /// Newznab category ids, empty means the book defaults.
    #[serde(default)]
    pub categories: Vec<u32>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Transfer protocol a download client speaks.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Torrent,
    Usenet,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Torrent => "torrent",
            Protocol::Usenet => "usenet",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six supported download-client backends.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DownloadClientKind {
    #[serde(rename = "qbittorrent")]
    QBittorrent,
    Transmission,
    Deluge,
    Sabnzbd,
    Nzbget,
    Rtorrent,
}

impl DownloadClientKind {
    pub fn protocol(&self) -> Protocol {
        match self {
            DownloadClientKind::Sabnzbd | DownloadClientKind::Nzbget => Protocol::Usenet,
            _ => Protocol::Torrent,
        }
    }
}

impl fmt::Display for DownloadClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadClientKind::QBittorrent => "qbittorrent",
            DownloadClientKind::Transmission => "transmission",
            DownloadClientKind::Deluge => "deluge",
            DownloadClientKind::Sabnzbd => "sabnzbd",
            DownloadClientKind::Nzbget => "nzbget",
            DownloadClientKind::Rtorrent => "rtorrent",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DownloadClientKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qbittorrent" | "qbit" => Ok(DownloadClientKind::QBittorrent),
            "transmission" => Ok(DownloadClientKind::Transmission),
            "deluge" => Ok(DownloadClientKind::Deluge),
            "sabnzbd" | "sab" => Ok(DownloadClientKind::Sabnzbd),
            "nzbget" => Ok(DownloadClientKind::Nzbget),
            "rtorrent" => Ok(DownloadClientKind::Rtorrent),
            _ => Err(format!("Unknown download client kind: {}", s)),
        }
    }
}

/// One configured download client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadClientConfig {
    pub name: String,
    pub kind: DownloadClientKind,
    /// Base URL; for rtorrent the full XML-RPC endpoint.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Category / label applied to new downloads.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub paths: PathsConfig,
    pub search: SearchConfig,
    pub import: ImportConfig,
    pub converter: ConverterConfig,
    pub indexers: Vec<SanitizedIndexerConfig>,
    pub download_clients: Vec<SanitizedDownloadClientConfig>,
    pub quality_profiles: Vec<QualityProfile>,
}

/// Indexer config with API key and cookie hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIndexerConfig {
    pub name: String,
    pub kind: IndexerKind,
    pub url: String,
    pub priority: u32,
    pub enabled: bool,
    pub vip_only: bool,
    pub freeleech_only: bool,
    pub api_key_configured: bool,
    pub cookie_configured: bool,
}

/// Download client config with credentials hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDownloadClientConfig {
    pub name: String,
    pub kind: DownloadClientKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub priority: u32,
    pub enabled: bool,
    pub credentials_configured: bool,
}

impl From<&IndexerConfig> for SanitizedIndexerConfig {
    fn from(c: &IndexerConfig) -> Self {
        Self {
            name: c.name.clone(),
            kind: c.kind,
            url: c.url.clone(),
            priority: c.priority,
            enabled: c.enabled,
            vip_only: c.vip_only,
            freeleech_only: c.freeleech_only,
            api_key_configured: c.api_key.as_deref().is_some_and(|k| !k.is_empty()),
            cookie_configured: c.cookie.as_deref().is_some_and(|k| !k.is_empty()),
        }
    }
}

impl From<&DownloadClientConfig> for SanitizedDownloadClientConfig {
    fn from(c: &DownloadClientConfig) -> Self {
        Self {
            name: c.name.clone(),
            kind: c.kind,
            url: c.url.clone(),
            category: c.category.clone(),
            priority: c.priority,
            enabled: c.enabled,
            credentials_configured: c.password.is_some() || c.api_key.is_some(),
        }
    }
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            paths: config.paths.clone(),
            search: config.search.clone(),
            import: config.import.clone(),
            converter: config.converter.clone(),
            indexers: config.indexers.iter().map(Into::into).collect(),
            download_clients: config.download_clients.iter().map(Into::into).collect(),
            quality_profiles: config.quality_profiles.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MediaType;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.search.timeout_secs, 30);
        assert_eq!(config.import.operation, ImportOperation::Hardlink);
        assert!(config.indexers.is_empty());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[paths]
downloads_dir = "/data/downloads"
ebook_library = "/data/books"
audiobook_library = "/data/audiobooks"

[import]
operation = "copy"

[[indexers]]
name = "nzbgeek"
kind = "newznab"
url = "https://api.nzbgeek.info"
api_key = "secret"
priority = 1

[[indexers]]
name = "mam"
kind = "tracker"
url = "https://www.myanonamouse.net"
cookie = "mam_id=abc"
freeleech_only = true

[[download_clients]]
name = "qbit"
kind = "qbittorrent"
url = "http://localhost:8080"
username = "admin"
password = "adminadmin"
category = "books"

[[quality_profiles]]
name = "Audiobook"
media_type = "audiobook"
formats = ["m4b", "mp3"]
min_bitrate_kbps = 64
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.import.operation, ImportOperation::Copy);
        assert_eq!(config.indexers.len(), 2);
        assert_eq!(config.indexers[0].kind, IndexerKind::Newznab);
        assert_eq!(config.indexers[0].priority, 1);
        assert!(config.indexers[1].enabled);
        assert!(config.indexers[1].freeleech_only);
        assert_eq!(config.indexers[1].priority, 25);
        assert_eq!(
            config.download_clients[0].kind,
            DownloadClientKind::QBittorrent
        );
        assert_eq!(config.quality_profiles[0].media_type, MediaType::Audiobook);
        assert_eq!(config.quality_profiles[0].min_bitrate_kbps, Some(64));
    }

    #[test]
    fn test_download_client_kind_protocol() {
        assert_eq!(DownloadClientKind::Sabnzbd.protocol(), Protocol::Usenet);
        assert_eq!(DownloadClientKind::Nzbget.protocol(), Protocol::Usenet);
        assert_eq!(DownloadClientKind::Deluge.protocol(), Protocol::Torrent);
        assert_eq!(DownloadClientKind::Rtorrent.protocol(), Protocol::Torrent);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            "QBit".parse::<DownloadClientKind>().unwrap(),
            DownloadClientKind::QBittorrent
        );
        assert_eq!(
            "torznab".parse::<IndexerKind>().unwrap(),
            IndexerKind::Newznab
        );
        assert!("utorrent".parse::<DownloadClientKind>().is_err());
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let config: Config = toml::from_str(
            r#"
[[indexers]]
name = "geek"
kind = "newznab"
url = "https://example.com"
api_key = "super-secret"

[[download_clients]]
name = "sab"
kind = "sabnzbd"
url = "http://localhost:8085"
api_key = "also-secret"
"#,
        )
        .unwrap();

        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("also-secret"));
        assert!(sanitized.indexers[0].api_key_configured);
        assert!(sanitized.download_clients[0].credentials_configured);
    }
}
