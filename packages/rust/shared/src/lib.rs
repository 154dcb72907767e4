//! Shared types, error model, configuration and provider contracts for searchlight.
//!
//! This crate is the foundation depended on by all other searchlight crates.
//! It provides:
//! - [`SearchlightError`]: the unified error type
//! - Domain types ([`SearchResult`], [`ScrapeResult`], [`DocumentMetadata`], [`Source`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - Provider traits ([`SearchProvider`], [`ScrapeProvider`], [`EmbeddingProvider`], [`GenerationProvider`])

pub mod config;
pub mod error;
pub mod providers;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, IndexConfig, LlmConfig, MemoryConfig, PipelineConfig, ScrapeConfig, SearchConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, read_api_key,
    validate_api_keys,
};
pub use error::{Result, ScrapeError, SearchlightError};
pub use providers::{EmbeddingProvider, GenerationProvider, ScrapeProvider, SearchProvider};
pub use types::{DocumentMetadata, Embedding, PageMetadata, ScrapeResult, SearchResult, Source};
