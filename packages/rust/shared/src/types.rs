//! Core domain types shared by providers, the index, and the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

/// A fixed-length embedding vector.
pub type Embedding = Vec<f32>;

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Target URL.
    pub url: String,
    /// Short description supplied by the search engine.
    #[serde(default)]
    pub snippet: String,
}

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

/// Metadata extracted from a page's `<meta>` tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

/// Outcome of fetching one URL. Failures are recorded, not raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// The URL that was requested.
    pub url: String,
    /// Page title (empty on failure).
    pub title: String,
    /// Cleaned visible text (empty on failure).
    pub content: String,
    /// Page metadata.
    #[serde(default)]
    pub metadata: PageMetadata,
    /// Whether the fetch produced usable HTML.
    pub success: bool,
    /// Failure cause when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScrapeError>,
}

impl ScrapeResult {
    /// Build a failed result for `url`.
    pub fn failed(url: impl Into<String>, error: ScrapeError) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            content: String::new(),
            metadata: PageMetadata::default(),
            success: false,
            error: Some(error),
        }
    }

    /// Successful and carrying non-blank text.
    pub fn has_content(&self) -> bool {
        self.success && !self.content.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Documents and sources
// ---------------------------------------------------------------------------

/// Metadata stored alongside each document in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A citable source shown with an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

impl From<&DocumentMetadata> for Source {
    fn from(meta: &DocumentMetadata) -> Self {
        Self {
            title: meta.title.clone(),
            url: meta.url.clone(),
            snippet: meta.snippet.clone().unwrap_or_default(),
        }
    }
}
