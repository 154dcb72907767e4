//! Error types for searchlight.
//!
//! Library crates use [`SearchlightError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Failure kinds for a single page fetch.
///
/// These never abort a run; they are recorded on the page's scrape result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScrapeError {
    /// The request did not complete within its timeout.
    #[error("Timeout")]
    Timeout,

    /// Transport failure or non-success HTTP status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The response was not an HTML document.
    #[error("Non-HTML content: {0}")]
    NonHtmlContent(String),

    /// The URL targets a private or local resource and was refused.
    #[error("blocked URL: {0}")]
    Blocked(String),
}

/// Top-level error type for all searchlight operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchlightError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, malformed payload, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Transport or auth failure while calling the search provider.
    #[error("search error: {0}")]
    Search(String),

    /// Page fetch failure.
    #[error("scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    /// Embedding provider failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A vector's length differs from the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `add()` was called with lists of different lengths.
    #[error("length mismatch: {texts} texts, {vectors} vectors, {metadata} metadata entries")]
    LengthMismatch {
        texts: usize,
        vectors: usize,
        metadata: usize,
    },

    /// Generation provider failure.
    #[error("generation error: {0}")]
    Generation(String),

    /// Citation/response formatting failure.
    #[error("formatting error: {0}")]
    Formatting(String),

    /// Saved index artifacts are missing, corrupt, or disagree with each other.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Unexpected fault surfaced to the caller of a pipeline run.
    #[error("{0}")]
    TopLevel(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SearchlightError>;

impl SearchlightError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any error for the top-level run boundary.
    pub fn top_level(err: &SearchlightError) -> Self {
        match err {
            Self::TopLevel(msg) => Self::TopLevel(msg.clone()),
            other => Self::TopLevel(other.to_string()),
        }
    }
}
