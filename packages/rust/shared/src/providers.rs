//! External service contracts consumed by the pipeline.
//!
//! Concrete implementations live in the `searchlight-search`, `searchlight-scraper`
//! and `searchlight-llm` crates; tests substitute in-process doubles.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Embedding, ScrapeResult, SearchResult};

/// Web search.
///
/// Returns an empty list when nothing matched; errors are reserved for
/// transport and auth failures.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;

    /// Human-readable provider name for tracing and stats.
    fn name(&self) -> &str;
}

/// Single-page fetch and text extraction.
///
/// Never fails as a call: per-URL failures are encoded in the returned
/// [`ScrapeResult`] (`success = false`, `error = Some(..)`).
#[async_trait]
pub trait ScrapeProvider: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> ScrapeResult;

    fn name(&self) -> &str;
}

/// Batch text embedding. Output order matches input order; empty in, empty out.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    fn name(&self) -> &str;
}

/// Chat-style text generation.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}
