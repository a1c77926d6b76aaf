//! Unauthenticated HTML search page.
//!
//! Expects a results table where each row carries a title link and a
//! magnet or .torrent link. Size, seeders, leechers and language are read
//! from cells by class when present, otherwise by content.

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

use super::types::{parse_size, Indexer, IndexerError, SearchQuery, SearchResult};
use crate::config::{IndexerConfig, IndexerKind, Protocol};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) librarr/0.1";

pub struct ScrapeIndexer {
    client: Client,
    config: IndexerConfig,
}

impl ScrapeIndexer {
    pub fn new(config: IndexerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn search_url(&self, query: &SearchQuery) -> String {
        format!(
            "{}/search?q={}",
            self.base_url(),
            urlencoding::encode(&query.terms())
        )
    }

    async fn fetch(&self, url: &str) -> Result<String, IndexerError> {
        let response = self
            .client
            .get(url)
            .header(
                USER_AGENT,
                self.config
                    .user_agent
                    .as_deref()
                    .unwrap_or(DEFAULT_USER_AGENT),
            )
            .send()
            .await
            .map_err(IndexerError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(IndexerError::ApiError(format!(
                "{}: HTTP {}",
                self.config.name,
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| IndexerError::ApiError(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl Indexer for ScrapeIndexer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> IndexerKind {
        IndexerKind::Scrape
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn test(&self) -> Result<(), IndexerError> {
        let body = self.fetch(self.base_url()).await?;
        if body.to_ascii_lowercase().contains("<html") {
            Ok(())
        } else {
            Err(IndexerError::ParseError(
                "front page is not an HTML document".to_string(),
            ))
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, IndexerError> {
        let url = self.search_url(query);
        debug!(indexer = %self.config.name, url = %url, "Scraping search page");
        let body = self.fetch(&url).await?;
        parse_results_page(&self.config.name, self.base_url(), &body)
    }
}

fn selector(css: &str) -> Result<Selector, IndexerError> {
    Selector::parse(css)
        .map_err(|e| IndexerError::ParseError(format!("bad selector {}: {:?}", css, e)))
}

fn cell_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Make a relative link absolute against `base`.
fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("magnet:") || href.starts_with("http://") || href.starts_with("https://")
    {
        href.to_string()
    } else {
        format!("{}/{}", base, href.trim_start_matches('/'))
    }
}

/// Extract results from a search page. Rows without a download link are
/// skipped.
pub fn parse_results_page(
    indexer: &str,
    base_url: &str,
    html: &str,
) -> Result<Vec<SearchResult>, IndexerError> {
    let document = Html::parse_document(html);

    let row_sel = selector("table tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a[href]")?;
    let title_sel = selector("a.title, td.title a, td.name a")?;
    let size_sel = selector("td.size")?;
    let seeders_sel = selector("td.seeders, td.seeds")?;
    let leechers_sel = selector("td.leechers, td.leeches")?;
    let lang_sel = selector("td.language, td.lang, [data-language]")?;

    let mut results = Vec::new();
    for row in document.select(&row_sel) {
        let links: Vec<ElementRef> = row.select(&link_sel).collect();
        let download = links.iter().find_map(|a| {
            let href = a.value().attr("href")?;
            (href.starts_with("magnet:") || href.ends_with(".torrent")).then_some(href)
        });
        let Some(download) = download else {
            continue;
        };

        let title = row
            .select(&title_sel)
            .next()
            .map(cell_text)
            .or_else(|| {
                links
                    .iter()
                    .filter(|a| {
                        a.value()
                            .attr("href")
                            .is_some_and(|h| !h.starts_with("magnet:") && !h.ends_with(".torrent"))
                    })
                    .map(|a| cell_text(*a))
                    .find(|t| !t.is_empty())
            });
        let Some(title) = title.filter(|t| !t.is_empty()) else {
            continue;
        };

        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        let mut result = SearchResult::new(
            indexer,
            title,
            absolutize(base_url, download),
            Protocol::Torrent,
        );

        result.size_bytes = row
            .select(&size_sel)
            .next()
            .and_then(|c| parse_size(&cell_text(c)))
            .or_else(|| {
                cells
                    .iter()
                    .map(|c| cell_text(*c))
                    .filter(|t| t.chars().any(|ch| ch.is_ascii_alphabetic()))
                    .find_map(|t| parse_size(&t))
            })
            .unwrap_or(0);

        let number = |el: Option<ElementRef>| {
            el.map(cell_text)
                .and_then(|t| t.replace(',', "").parse::<u32>().ok())
        };
        result.seeders = number(row.select(&seeders_sel).next()).unwrap_or(0);
        result.leechers = number(row.select(&leechers_sel).next()).unwrap_or(0);

        result.language = row.select(&lang_sel).next().and_then(|el| {
            el.value()
                .attr("data-language")
                .map(str::to_string)
                .or_else(|| Some(cell_text(el)))
                .filter(|l| !l.is_empty())
        });

        results.push(result);
    }

    Ok(results)
}
