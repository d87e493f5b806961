//! Web search backends.
//!
//! The orchestrator treats search as best effort: a failed or empty search
//! yields an empty context and the query proceeds.

use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SearchConfig;
use crate::error::UpstreamError;

/// One web result fed into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Page title
    pub title: String,
    /// Target URL
    pub url: String,
    /// Short excerpt
    pub snippet: String,
}

/// A web search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Return up to `limit` results for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, UpstreamError>;
}

/// Scrapes the DuckDuckGo HTML endpoint.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
}

const USER_AGENT: &str = concat!("veritas/", env!("CARGO_PKG_VERSION"));

impl DuckDuckGoSearch {
    /// Build a client from configuration.
    pub fn new(config: &SearchConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, UpstreamError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?;
        let html = response.text().await?;
        let results = parse_results(&html, limit);
        debug!(query_len = query.len(), results = results.len(), "Web search complete");
        Ok(results)
    }
}

struct Selectors {
    body: Selector,
    title: Selector,
    snippet: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        body: Selector::parse(".result__body").expect("body selector is valid"),
        title: Selector::parse("a.result__a").expect("title selector is valid"),
        snippet: Selector::parse(".result__snippet").expect("snippet selector is valid"),
    })
}

/// Extract results from a DuckDuckGo HTML page, keeping at most `limit`.
///
/// Each `.result__body` element contributes one result when it has a
/// titled `a.result__a` link; elements without one are skipped.
pub fn parse_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let sel = selectors();
    let document = Html::parse_document(html);
    document
        .select(&sel.body)
        .filter_map(|body| {
            let link = body.select(&sel.title).next()?;
            let href = link.value().attr("href")?;
            let title = text_of(link);
            if title.is_empty() {
                return None;
            }
            let snippet = body
                .select(&sel.snippet)
                .next()
                .map(text_of)
                .unwrap_or_default();
            Some(SearchResult {
                title,
                url: resolve_href(href),
                snippet,
            })
        })
        .take(limit)
        .collect()
}

/// Text content of an element with whitespace collapsed.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// DuckDuckGo wraps targets in a redirect carrying the real URL in `uddg`.
fn resolve_href(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    match Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}
