//! Brave Search web search provider.
//!
//! [`BraveSearch`] implements [`SearchProvider`] over the Brave web search
//! REST API. "No results" is an empty list, never an error; transport, auth
//! and payload failures surface as [`SearchlightError::Search`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use searchlight_shared::{Result, SearchConfig, SearchProvider, SearchResult, SearchlightError};

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("searchlight/", env!("CARGO_PKG_VERSION"));

/// Title used when the engine omits one.
const UNTITLED: &str = "No Title";

/// Longest snippet shown by [`format_results_for_display`].
const DISPLAY_SNIPPET_MAX: usize = 150;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Connection and query settings for [`BraveSearch`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub freshness: String,
    pub country: String,
    pub search_lang: String,
}

impl SearchOptions {
    /// Build options from the `[search]` config section and a resolved key.
    pub fn from_config(config: &SearchConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            freshness: config.freshness.clone(),
            country: config.country.clone(),
            search_lang: config.search_lang.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<BraveResult> for SearchResult {
    fn from(r: BraveResult) -> Self {
        Self {
            title: r
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            url: r.url.unwrap_or_default(),
            snippet: r.description.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Brave web search client.
#[derive(Debug, Clone)]
pub struct BraveSearch {
    client: Client,
    options: SearchOptions,
}

impl BraveSearch {
    pub fn new(options: SearchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| SearchlightError::Search(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, options })
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    #[instrument(skip_all, fields(query = %query, max_results))]
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let count = max_results.to_string();
        let response = self
            .client
            .get(&self.options.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.options.api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("result_filter", "web"),
                ("freshness", self.options.freshness.as_str()),
                ("country", self.options.country.as_str()),
                ("search_lang", self.options.search_lang.as_str()),
                ("text_decorations", "false"),
            ])
            .send()
            .await
            .map_err(|e| SearchlightError::Search(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchlightError::Search(format!("HTTP {status}")));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| SearchlightError::Search(format!("malformed response: {e}")))?;

        let Some(web) = body.web else {
            warn!("no web results section in response");
            return Ok(Vec::new());
        };

        let results: Vec<SearchResult> = web
            .results
            .into_iter()
            .take(max_results)
            .map(SearchResult::from)
            .collect();

        debug!(urls = ?extract_urls(&results), "search result urls");
        info!(found = results.len(), "search complete");
        Ok(results)
    }

    fn name(&self) -> &str {
        "brave"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Non-empty URLs of `results`, in order.
pub fn extract_urls(results: &[SearchResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.url.is_empty())
        .map(|r| r.url.clone())
        .collect()
}

/// Numbered markdown list of results for terminal display.
pub fn format_results_for_display(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No search results found.".to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let snippet = if r.snippet.is_empty() {
                "No description available".to_string()
            } else {
                shorten(&r.snippet, DISPLAY_SNIPPET_MAX)
            };
            format!("**{}. [{}]({})**\n{}", i + 1, r.title, r.url, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut `text` to at most `max` characters, marking the cut with "...".
fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
