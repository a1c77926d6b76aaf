//! Private tracker with a cookie-authenticated JSON search API.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{parse_size, Indexer, IndexerError, SearchQuery, SearchResult};
use crate::config::{IndexerConfig, IndexerKind, Protocol};
use crate::library::MediaType;

const DEFAULT_USER_AGENT: &str = "librarr/0.1";
const SEARCH_PATH: &str = "/tor/js/loadSearchJSONbasic.php";
const PROFILE_PATH: &str = "/jsonLoad.php";
/// Main category ids on the tracker.
const AUDIOBOOK_CATEGORY: u32 = 13;
const EBOOK_CATEGORY: u32 = 14;

/// Search response envelope.
#[derive(Debug, Deserialize)]
struct TrackerResponse {
    #[serde(default)]
    data: Vec<TrackerItem>,
    #[serde(default)]
    error: Option<String>,
}

/// One torrent row. Flags and sizes arrive as strings or numbers
/// depending on the field, so they are kept as raw JSON values.
#[derive(Debug, Deserialize)]
struct TrackerItem {
    id: Value,
    title: String,
    #[serde(default)]
    size: Value,
    #[serde(default)]
    seeders: Value,
    #[serde(default)]
    leechers: Value,
    #[serde(default)]
    vip: Value,
    #[serde(default)]
    free: Value,
    #[serde(default)]
    personal_freeleech: Value,
    #[serde(default)]
    lang_code: Option<String>,
    #[serde(default)]
    filetype: Option<String>,
    #[serde(default)]
    added: Option<String>,
    /// Download token; falls back to the id.
    #[serde(default)]
    dl: Option<String>,
}

pub struct TrackerIndexer {
    client: Client,
    config: IndexerConfig,
}

impl TrackerIndexer {
    pub fn new(config: IndexerConfig) -> Result<Self, IndexerError> {
        if config.cookie.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(IndexerError::InvalidConfig(format!(
                "tracker indexer '{}' needs a session cookie",
                config.name
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(COOKIE, self.config.cookie.as_deref().unwrap_or_default())
            .header(
                USER_AGENT,
                self.config
                    .user_agent
                    .as_deref()
                    .unwrap_or(DEFAULT_USER_AGENT),
            )
    }

    fn search_body(&self, query: &SearchQuery) -> Value {
        let search_type = if self.config.vip_only {
            "VIP"
        } else if self.config.freeleech_only {
            "fl"
        } else {
            "all"
        };
        let category = match query.media_type {
            MediaType::Ebook => EBOOK_CATEGORY,
            MediaType::Audiobook => AUDIOBOOK_CATEGORY,
        };
        json!({
            "tor": {
                "text": query.terms(),
                "srchIn": ["title", "author"],
                "searchType": search_type,
                "main_cat": [category],
                "sortType": "seedersDesc",
            },
            "perpage": 50,
        })
    }

    /// Read the body, treating auth statuses and HTML login pages as an
    /// expired session.
    async fn read_json(&self, response: reqwest::Response) -> Result<String, IndexerError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IndexerError::AuthFailed(format!(
                "{}: session rejected (HTTP {})",
                self.config.name, status
            )));
        }
        if !status.is_success() {
            return Err(IndexerError::ApiError(format!(
                "{}: HTTP {}",
                self.config.name, status
            )));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        let body = response
            .text()
            .await
            .map_err(|e| IndexerError::ApiError(format!("Failed to read response: {}", e)))?;

        if is_html || body.trim_start().starts_with('<') {
            return Err(IndexerError::AuthFailed(format!(
                "{}: session expired, got a login page",
                self.config.name
            )));
        }
        Ok(body)
    }

    fn to_result(&self, item: TrackerItem) -> SearchResult {
        let token = item
            .dl
            .clone()
            .unwrap_or_else(|| value_to_string(&item.id));
        let download_url = format!("{}/tor/download.php/{}", self.base_url(), token);

        let mut result = SearchResult::new(
            &self.config.name,
            item.title,
            download_url,
            Protocol::Torrent,
        );
        if let Some(ft) = item
            .filetype
            .as_deref()
            .and_then(|f| f.split([' ', ',']).find(|t| !t.is_empty()))
        {
            result.format = Some(ft.to_ascii_uppercase());
        }
        result.size_bytes = match &item.size {
            Value::Number(n) => n.as_u64().unwrap_or(0),
            Value::String(s) => parse_size(s).unwrap_or(0),
            _ => 0,
        };
        result.seeders = value_to_u32(&item.seeders);
        result.leechers = value_to_u32(&item.leechers);
        result.vip = flag(&item.vip);
        result.freeleech = flag(&item.free) || flag(&item.personal_freeleech) || result.vip;
        result.language = item.lang_code;
        result.publish_date = item.added.as_deref().and_then(parse_added);
        result
    }
}

#[async_trait]
impl Indexer for TrackerIndexer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> IndexerKind {
        IndexerKind::Tracker
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<(), IndexerError> {
        let url = format!("{}{}", self.base_url(), PROFILE_PATH);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(IndexerError::from_reqwest)?;
        let body = self.read_json(response).await?;
        let profile: Value = serde_json::from_str(&body)
            .map_err(|e| IndexerError::ParseError(format!("profile response: {}", e)))?;

        match profile.get("username").and_then(Value::as_str) {
            Some(user) => {
                info!(indexer = %self.config.name, user = %user, "Tracker session valid");
                Ok(())
            }
            None => Err(IndexerError::AuthFailed(format!(
                "{}: profile has no username",
                self.config.name
            ))),
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexerError> {
        let url = format!("{}{}", self.base_url(), SEARCH_PATH);
        debug!(indexer = %self.config.name, query = %query.terms(), "Searching tracker");

        let response = self
            .request(self.client.post(&url).json(&self.search_body(query)))
            .send()
            .await
            .map_err(IndexerError::from_reqwest)?;
        let body = self.read_json(response).await?;

        let parsed: TrackerResponse = serde_json::from_str(&body)
            .map_err(|e| IndexerError::ParseError(format!("search response: {}", e)))?;

        if parsed.data.is_empty() {
            return match parsed.error {
                // The tracker reports an empty result set as an error string
                Some(err) if err.starts_with("Nothing returned") => Ok(Vec::new()),
                Some(err) => Err(IndexerError::ApiError(err)),
                None => Ok(Vec::new()),
            };
        }

        let total = parsed.data.len();
        let results: Vec<SearchResult> = parsed
            .data
            .into_iter()
            .map(|item| self.to_result(item))
            .filter(|r| !self.config.vip_only || r.vip)
            .filter(|r| !self.config.freeleech_only || r.freeleech)
            .collect();

        if results.len() < total {
            warn!(
                indexer = %self.config.name,
                dropped = total - results.len(),
                "Dropped results not matching VIP/freeleech filters"
            );
        }
        Ok(results)
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_u32(v: &Value) -> u32 {
    match v {
        Value::Number(n) => n.as_u64().unwrap_or(0).min(u32::MAX as u64) as u32,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Truthy flag: `true`, non-zero numbers, or "1"/"true"/"yes".
fn flag(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

fn parse_added(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, response::IntoResponse, routing::{get, post}, Json, Router};

    fn config(url: &str) -> IndexerConfig {
        IndexerConfig {
            name: "tracker".to_string(),
            kind: IndexerKind::Tracker,
            url: url.to_string(),
            api_key: None,
            cookie: Some("session=good".to_string()),
            user_agent: Some("test-agent".to_string()),
            priority: 1,
            enabled: true,
            vip_only: false,
            freeleech_only: false,
            categories: Vec::new(),
            timeout_secs: 5,
        }
    }

    fn sample_rows() -> Value {
        json!({
            "data": [
                {
                    "id": 101,
                    "title": "Dune",
                    "size": "2.5 MiB",
                    "seeders": "40",
                    "leechers": 2,
                    "vip": 1,
                    "free": 0,
                    "lang_code": "ENG",
                    "filetype": "epub",
                    "added": "2024-03-01 12:00:00",
                    "dl": "abc123"
                },
                {
                    "id": 102,
                    "title": "Dune (scan)",
                    "size": 1048576,
                    "seeders": 3,
                    "leechers": 0,
                    "vip": "0",
                    "free": true,
                    "filetype": "pdf"
                }
            ]
        })
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("cookie").and_then(|v| v.to_str().ok()) == Some("session=good")
            && headers.get("user-agent").and_then(|v| v.to_str().ok()) == Some("test-agent")
    }

    fn app() -> Router {
        Router::new()
            .route(
                SEARCH_PATH,
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    if !authorized(&headers) {
                        return axum::response::Html("<html>login</html>").into_response();
                    }
                    if body["tor"]["text"] == "nothing" {
                        return Json(json!({"error": "Nothing returned, out of 0"})).into_response();
                    }
                    Json(sample_rows()).into_response()
                }),
            )
            .route(
                PROFILE_PATH,
                get(|headers: HeaderMap| async move {
                    if authorized(&headers) {
                        Json(json!({"username": "reader"})).into_response()
                    } else {
                        axum::http::StatusCode::FORBIDDEN.into_response()
                    }
                }),
            )
    }

    #[tokio::test]
    async fn test_search_maps_flags() {
        let base = spawn(app()).await;
        let indexer = TrackerIndexer::new(config(&base)).unwrap();
        indexer.test().await.unwrap();

        let results = indexer
            .search(&SearchQuery::free_text("Dune", MediaType::Ebook))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        let vip = &results[0];
        assert_eq!(vip.format.as_deref(), Some("EPUB"));
        assert_eq!(vip.size_bytes, 2_621_440);
        assert_eq!(vip.seeders, 40);
        assert!(vip.vip);
        assert!(vip.freeleech);
        assert_eq!(vip.language.as_deref(), Some("ENG"));
        assert!(vip.download_url.ends_with("/tor/download.php/abc123"));
        assert!(vip.publish_date.is_some());

        let free = &results[1];
        assert!(!free.vip);
        assert!(free.freeleech);
        assert!(free.download_url.ends_with("/tor/download.php/102"));
    }

    #[tokio::test]
    async fn test_vip_only_filter() {
        let base = spawn(app()).await;
        let mut cfg = config(&base);
        cfg.vip_only = true;
        let results = TrackerIndexer::new(cfg)
            .unwrap()
            .search(&SearchQuery::free_text("Dune", MediaType::Ebook))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].vip);
    }

    #[tokio::test]
    async fn test_nothing_returned_is_empty() {
        let base = spawn(app()).await;
        let results = TrackerIndexer::new(config(&base))
            .unwrap()
            .search(&SearchQuery::free_text("nothing", MediaType::Ebook))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session() {
        let base = spawn(app()).await;
        let mut cfg = config(&base);
        cfg.cookie = Some("session=stale".to_string());
        let indexer = TrackerIndexer::new(cfg).unwrap();

        let err = indexer
            .search(&SearchQuery::free_text("Dune", MediaType::Ebook))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::AuthFailed(_)));
        assert!(matches!(
            indexer.test().await.unwrap_err(),
            IndexerError::AuthFailed(_)
        ));
    }

    #[test]
    fn test_missing_cookie_rejected() {
        let mut cfg = config("http://localhost");
        cfg.cookie = None;
        assert!(matches!(
            TrackerIndexer::new(cfg),
            Err(IndexerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_flag_values() {
        assert!(flag(&json!(true)));
        assert!(flag(&json!(1)));
        assert!(flag(&json!("yes")));
        assert!(!flag(&json!("0")));
        assert!(!flag(&Value::Null));
    }
}
