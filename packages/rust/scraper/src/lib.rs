//! Single-page fetcher and text extractor.
//!
//! [`WebScraper`] implements [`ScrapeProvider`]: it fetches one URL, checks
//! that the response is HTML, and extracts title, visible text and metadata.
//! Every failure is reported inside the returned [`ScrapeResult`]; `fetch`
//! never errors as a call.

pub mod extract;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, instrument, warn};
use url::Url;

use searchlight_shared::{
    Result, ScrapeConfig, ScrapeError, ScrapeProvider, ScrapeResult, SearchlightError,
};

pub use extract::{ExtractedPage, UNTITLED, clean_content, extract_page};

/// Redirects followed per fetch.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Browser-like user agent; some sites refuse obvious bots.
    pub user_agent: String,
    /// Maximum characters of cleaned text kept per page.
    pub max_content_length: usize,
}

impl From<&ScrapeConfig> for ScrapeOptions {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_content_length: config.max_content_length,
        }
    }
}

// ---------------------------------------------------------------------------
// WebScraper
// ---------------------------------------------------------------------------

/// HTTP page scraper with an SSRF guard.
pub struct WebScraper {
    client: Client,
    options: ScrapeOptions,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl WebScraper {
    pub fn new(options: ScrapeOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| {
                SearchlightError::Scrape(ScrapeError::HttpError(format!(
                    "failed to build HTTP client: {e}"
                )))
            })?;

        Ok(Self {
            client,
            options,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    async fn fetch_html(&self, url: &Url, timeout: Duration) -> std::result::Result<String, ScrapeError> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpError(format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("text/html") {
            return Err(ScrapeError::NonHtmlContent(content_type));
        }

        response.text().await.map_err(transport_error)
    }
}

#[async_trait]
impl ScrapeProvider for WebScraper {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str, timeout: Duration) -> ScrapeResult {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "invalid URL");
                return ScrapeResult::failed(url, ScrapeError::HttpError(format!("invalid URL: {e}")));
            }
        };

        if !self.allow_localhost && is_ssrf_target(&parsed) {
            warn!("refusing to fetch private or non-http target");
            return ScrapeResult::failed(url, ScrapeError::Blocked(url.to_string()));
        }

        let body = match self.fetch_html(&parsed, timeout).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "scrape failed");
                return ScrapeResult::failed(url, e);
            }
        };

        let page = extract_page(&body, &parsed, self.options.max_content_length);
        info!(chars = page.content.chars().count(), title = %page.title, "scraped page");

        ScrapeResult {
            url: url.to_string(),
            title: page.title,
            content: page.content,
            metadata: page.metadata,
            success: true,
            error: None,
        }
    }

    fn name(&self) -> &str {
        "web"
    }
}

fn transport_error(e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout
    } else {
        ScrapeError::HttpError(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// SSRF guard
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
