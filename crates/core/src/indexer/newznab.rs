//! Newznab / Torznab indexer.
//!
//! API key in the query string, RSS results with `newznab:attr` or
//! `torznab:attr` extension elements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::types::{Indexer, IndexerError, SearchQuery, SearchResult};
use crate::config::{IndexerConfig, IndexerKind, Protocol};
use crate::library::MediaType;

/// Newznab "Books > Ebook".
const EBOOK_CATEGORY: u32 = 7020;
/// Newznab "Audio > Audiobook".
const AUDIOBOOK_CATEGORY: u32 = 3030;

pub struct NewznabIndexer {
    client: Client,
    config: IndexerConfig,
}

impl NewznabIndexer {
    pub fn new(config: IndexerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn build_api_url(&self, params: &[(&str, String)]) -> String {
        let base = self.config.url.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        let mut url = format!(
            "{}/api?apikey={}",
            base,
            urlencoding::encode(self.config.api_key.as_deref().unwrap_or_default())
        );
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url
    }

    fn categories_for(&self, media_type: MediaType) -> String {
        if !self.config.categories.is_empty() {
            return self
                .config
                .categories
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",");
        }
        match media_type {
            MediaType::Ebook => EBOOK_CATEGORY.to_string(),
            MediaType::Audiobook => AUDIOBOOK_CATEGORY.to_string(),
        }
    }

    fn search_params(&self, query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![("cat", self.categories_for(query.media_type))];
        match (query.media_type, query.author.as_deref()) {
            (MediaType::Ebook, Some(author)) if !author.trim().is_empty() => {
                params.push(("t", "book".to_string()));
                params.push(("title", query.title.clone()));
                params.push(("author", author.to_string()));
            }
            _ => {
                params.push(("t", "search".to_string()));
                params.push(("q", query.terms()));
            }
        }
        params.push(("extended", "1".to_string()));
        params
    }

    async fn fetch(&self, url: &str) -> Result<String, IndexerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(IndexerError::from_reqwest)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IndexerError::AuthFailed(format!(
                "{}: HTTP {}",
                self.config.name, status
            )));
        }
        if !status.is_success() {
            return Err(IndexerError::ApiError(format!(
                "{}: HTTP {}",
                self.config.name, status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| IndexerError::ApiError(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl Indexer for NewznabIndexer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> IndexerKind {
        IndexerKind::Newznab
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<(), IndexerError> {
        let url = self.build_api_url(&[("t", "caps".to_string())]);
        let body = self.fetch(&url).await?;
        check_error_element(&body)?;

        if body.contains("<caps") {
            info!(indexer = %self.config.name, "Newznab connection test successful");
            Ok(())
        } else {
            Err(IndexerError::ParseError(
                "caps response has no <caps> element".to_string(),
            ))
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexerError> {
        let url = self.build_api_url(&self.search_params(query));
        debug!(indexer = %self.config.name, query = %query.terms(), "Searching Newznab indexer");

        let body = self.fetch(&url).await?;
        let results = parse_feed(&self.config.name, &body)?;

        debug!(
            indexer = %self.config.name,
            results = results.len(),
            "Newznab search complete"
        );
        Ok(results)
    }
}

/// Fields collected for one `<item>` while streaming the feed.
#[derive(Default)]
struct ItemBuilder {
    title: Option<String>,
    link: Option<String>,
    enclosure_url: Option<String>,
    enclosure_type: Option<String>,
    size: Option<u64>,
    pub_date: Option<DateTime<Utc>>,
    seeders: Option<u32>,
    peers: Option<u32>,
    magnet: Option<String>,
    bitrate: Option<u32>,
    language: Option<String>,
    download_factor: Option<f64>,
    torznab: bool,
}

impl ItemBuilder {
    fn read_enclosure(&mut self, e: &BytesStart) {
        for attr in e.attributes().flatten() {
            let value = String::from_utf8_lossy(&attr.value).to_string();
            match attr.key.as_ref() {
                b"url" => self.enclosure_url = Some(value),
                b"type" => self.enclosure_type = Some(value),
                b"length" => {
                    if self.size.is_none() {
                        self.size = value.parse().ok();
                    }
                }
                _ => {}
            }
        }
    }

    fn read_attr(&mut self, e: &BytesStart, torznab: bool) {
        let mut name = String::new();
        let mut value = String::new();
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"name" => name = String::from_utf8_lossy(&attr.value).to_string(),
                b"value" => value = String::from_utf8_lossy(&attr.value).to_string(),
                _ => {}
            }
        }
        self.torznab |= torznab;

        match name.as_str() {
            "size" => self.size = value.parse().ok().or(self.size),
            "seeders" => self.seeders = value.parse().ok(),
            "peers" => self.peers = value.parse().ok(),
            "magneturl" => self.magnet = Some(value),
            "bitrate" | "audio_bitrate" => {
                self.bitrate = value
                    .trim_end_matches(|c: char| !c.is_ascii_digit())
                    .parse()
                    .ok()
            }
            "language" => self.language = Some(value),
            "downloadvolumefactor" => self.download_factor = value.parse().ok(),
            _ => {}
        }
    }

    fn build(self, indexer: &str) -> Option<SearchResult> {
        let title = self.title?;
        let is_torrent = self.torznab
            || self.magnet.is_some()
            || self
                .enclosure_type
                .as_deref()
                .is_some_and(|t| t.contains("bittorrent"));

        let download_url = self.magnet.or(self.enclosure_url).or(self.link)?;
        let protocol = if is_torrent {
            Protocol::Torrent
        } else {
            Protocol::Usenet
        };

        let mut result = SearchResult::new(indexer, title, download_url, protocol);
        result.size_bytes = self.size.unwrap_or(0);
        result.seeders = self.seeders.unwrap_or(0);
        result.leechers = self
            .peers
            .map(|p| p.saturating_sub(result.seeders))
            .unwrap_or(0);
        result.bitrate_kbps = self.bitrate;
        result.language = self.language;
        result.freeleech = self.download_factor == Some(0.0);
        result.publish_date = self.pub_date;
        Some(result)
    }
}

/// Turn an `<error code=".." description=".."/>` body into an error.
fn check_error_element(body: &str) -> Result<(), IndexerError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"error" => {
                return Err(error_from_element(e));
            }
            Ok(Event::Eof) | Err(_) => return Ok(()),
            _ => {}
        }
    }
}

fn error_from_element(e: &BytesStart) -> IndexerError {
    let mut code = 0u32;
    let mut description = String::from("Unknown API error");
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"code" => code = String::from_utf8_lossy(&attr.value).parse().unwrap_or(0),
            b"description" => description = String::from_utf8_lossy(&attr.value).to_string(),
            _ => {}
        }
    }
    // 100-199 are account and credential errors
    if (100..200).contains(&code) {
        IndexerError::AuthFailed(description)
    } else {
        IndexerError::ApiError(format!("{} (code {})", description, code))
    }
}

/// Parse an RSS search response into results. Items without a download
/// link are dropped.
pub fn parse_feed(indexer: &str, xml: &str) -> Result<Vec<SearchResult>, IndexerError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut results = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match (tag.as_str(), current.as_mut()) {
                    ("error", None) => return Err(error_from_element(e)),
                    ("item", _) => current = Some(ItemBuilder::default()),
                    ("newznab:attr", Some(item)) => item.read_attr(e, false),
                    ("torznab:attr", Some(item)) => item.read_attr(e, true),
                    ("enclosure", Some(item)) => item.read_enclosure(e),
                    _ => {}
                }
                current_tag = tag;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(item) = current.as_mut() {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match current_tag.as_str() {
                        "title" => item.title = Some(text),
                        "link" => item.link = Some(text),
                        "size" => item.size = text.parse().ok().or(item.size),
                        "pubDate" => item.pub_date = parse_rfc822_date(&text),
                        _ => {}
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(item) = current.as_mut() {
                    if current_tag == "title" {
                        item.title = Some(String::from_utf8_lossy(e).to_string());
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        if let Some(result) = item.build(indexer) {
                            results.push(result);
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(IndexerError::ParseError(format!("XML parse error: {}", e))),
            _ => {}
        }
    }

    Ok(results)
}

fn parse_rfc822_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
  <channel>
    <title>example</title>
    <item>
      <title>Frank Herbert - Dune [EPUB]</title>
      <link>https://idx.example/getnzb/abc.nzb</link>
      <pubDate>Tue, 01 Oct 2024 10:00:00 +0000</pubDate>
      <enclosure url="https://idx.example/getnzb/abc.nzb" length="1048576" type="application/x-nzb"/>
      <newznab:attr name="size" value="2097152"/>
      <newznab:attr name="language" value="English"/>
    </item>
    <item>
      <title>No link here</title>
    </item>
  </channel>
</rss>"#;

    const TORZNAB_FEED: &str = r#"<rss><channel>
    <item>
      <title>Dune Audiobook M4B</title>
      <enclosure url="https://t.example/dl/1.torrent" type="application/x-bittorrent"/>
      <torznab:attr name="seeders" value="12"/>
      <torznab:attr name="peers" value="15"/>
      <torznab:attr name="magneturl" value="magnet:?xt=urn:btih:ABCDEF"/>
      <torznab:attr name="downloadvolumefactor" value="0"/>
    </item>
    </channel></rss>"#;

    fn config(url: &str) -> IndexerConfig {
        IndexerConfig {
            name: "nzb".to_string(),
            kind: IndexerKind::Newznab,
            url: url.to_string(),
            api_key: Some("secret".to_string()),
            cookie: None,
            user_agent: None,
            priority: 1,
            enabled: true,
            vip_only: false,
            freeleech_only: false,
            categories: Vec::new(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_parse_newznab_feed() {
        let results = parse_feed("nzb", FEED).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.format.as_deref(), Some("EPUB"));
        assert_eq!(r.size_bytes, 2_097_152);
        assert_eq!(r.protocol, Protocol::Usenet);
        assert_eq!(r.language.as_deref(), Some("English"));
        assert!(r.publish_date.is_some());
        assert_eq!(r.download_url, "https://idx.example/getnzb/abc.nzb");
    }

    #[test]
    fn test_parse_torznab_feed() {
        let results = parse_feed("t", TORZNAB_FEED).unwrap();
        let r = &results[0];
        assert_eq!(r.protocol, Protocol::Torrent);
        assert_eq!(r.download_url, "magnet:?xt=urn:btih:ABCDEF");
        assert_eq!(r.seeders, 12);
        assert_eq!(r.leechers, 3);
        assert!(r.freeleech);
        assert_eq!(r.format.as_deref(), Some("M4B"));
    }

    #[test]
    fn test_error_element() {
        let err = parse_feed(
            "nzb",
            r#"<?xml version="1.0"?><error code="100" description="Incorrect user credentials"/>"#,
        )
        .unwrap_err();
        assert!(matches!(err, IndexerError::AuthFailed(_)));

        let err = parse_feed("nzb", r#"<error code="300" description="No such function"/>"#)
            .unwrap_err();
        assert!(matches!(err, IndexerError::ApiError(_)));
    }

    #[test]
    fn test_search_params() {
        let indexer = NewznabIndexer::new(config("http://localhost/api"));
        let mut query = SearchQuery::free_text("Dune", MediaType::Ebook);
        query.author = Some("Frank Herbert".to_string());
        let url = indexer.build_api_url(&indexer.search_params(&query));
        assert!(url.starts_with("http://localhost/api?apikey=secret"));
        assert!(url.contains("&t=book"));
        assert!(url.contains("&author=Frank%20Herbert"));
        assert!(url.contains("&cat=7020"));

        let query = SearchQuery::free_text("Dune", MediaType::Audiobook);
        let url = indexer.build_api_url(&indexer.search_params(&query));
        assert!(url.contains("&t=search&q=Dune"));
        assert!(url.contains("&cat=3030"));
    }

    #[tokio::test]
    async fn test_search_against_mock_server() {
        let app = Router::new().route(
            "/api",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("apikey").map(String::as_str) != Some("secret") {
                    return r#"<error code="100" description="Incorrect user credentials"/>"#
                        .to_string();
                }
                match params.get("t").map(String::as_str) {
                    Some("caps") => "<caps><server/></caps>".to_string(),
                    _ => FEED.to_string(),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let indexer = NewznabIndexer::new(config(&format!("http://{}", addr)));
        indexer.test().await.unwrap();
        let results = indexer
            .search(&SearchQuery::free_text("Dune", MediaType::Ebook))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].indexer, "nzb");

        let mut bad = config(&format!("http://{}", addr));
        bad.api_key = Some("wrong".to_string());
        let err = NewznabIndexer::new(bad).test().await.unwrap_err();
        assert!(matches!(err, IndexerError::AuthFailed(_)));
    }
}
