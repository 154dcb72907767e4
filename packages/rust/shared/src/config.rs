//! Application configuration for searchlight.
//!
//! User config lives at `~/.searchlight/searchlight.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchlightError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "searchlight.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".searchlight";

// ---------------------------------------------------------------------------
// Config structs (matching searchlight.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Page fetching settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Embedding + generation model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Vector index and retrieval settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// Conversation memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the Brave API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Web search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Maximum number of search results to request.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Freshness filter (`pd`, `pw`, `pm`, `py`); empty disables it.
    #[serde(default = "default_freshness")]
    pub freshness: String,

    /// Country code for result localisation.
    #[serde(default = "default_country")]
    pub country: String,

    /// Result language.
    #[serde(default = "default_search_lang")]
    pub search_lang: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout(),
            freshness: default_freshness(),
            country: default_country(),
            search_lang: default_search_lang(),
        }
    }
}

fn default_search_key_env() -> String {
    "BRAVE_SEARCH_API_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://api.search.brave.com/res/v1/web/search".into()
}
fn default_max_results() -> usize {
    5
}
fn default_search_timeout() -> u64 {
    10
}
fn default_freshness() -> String {
    "pw".into()
}
fn default_country() -> String {
    "us".into()
}
fn default_search_lang() -> String {
    "en".into()
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,

    /// Pause between consecutive page fetches, in ms.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Maximum characters of cleaned text kept per page.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// User-Agent header sent with page requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            delay_ms: default_delay_ms(),
            max_content_length: default_max_content_length(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_scrape_timeout() -> u64 {
    10
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_max_content_length() -> usize {
    2000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/126.0.0.0 Safari/537.36"
        .into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the Mistral API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// API base URL (without trailing slash).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat completion model.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_key_env() -> String {
    "MISTRAL_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.mistral.ai/v1".into()
}
fn default_chat_model() -> String {
    "mistral-large-latest".into()
}
fn default_embedding_model() -> String {
    "mistral-embed".into()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding dimension the index accepts.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Number of chunks retrieved as context.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum L2 distance for retrieved chunks; `0` disables the cutoff.
    #[serde(default)]
    pub similarity_threshold: f32,

    /// Chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Maximum number of sources shown with an answer.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            top_k: default_top_k(),
            similarity_threshold: 0.0,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_sources: default_max_sources(),
        }
    }
}

fn default_dimension() -> usize {
    1024
}
fn default_top_k() -> usize {
    5
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_max_sources() -> usize {
    5
}

/// `[memory]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of conversation turns kept.
    #[serde(default = "default_memory_limit")]
    pub limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            limit: default_memory_limit(),
        }
    }
}

fn default_memory_limit() -> usize {
    3
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Search results requested per query.
    pub max_search_results: usize,
    /// Per-page fetch timeout.
    pub scrape_timeout: Duration,
    /// Pause between consecutive page fetches.
    pub scrape_delay: Duration,
    /// Index dimension.
    pub dimension: usize,
    /// Chunks retrieved as context.
    pub top_k: usize,
    /// Distance cutoff for retrieval (`0` = none).
    pub similarity_threshold: f32,
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Chunk overlap in characters.
    pub chunk_overlap: usize,
    /// Sources kept for display.
    pub max_sources: usize,
    /// Conversation turns remembered.
    pub memory_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_search_results: config.search.max_results,
            scrape_timeout: Duration::from_secs(config.scrape.timeout_secs),
            scrape_delay: Duration::from_millis(config.scrape.delay_ms),
            dimension: config.index.dimension,
            top_k: config.index.top_k,
            similarity_threshold: config.index.similarity_threshold,
            chunk_size: config.index.chunk_size,
            chunk_overlap: config.index.chunk_overlap,
            max_sources: config.index.max_sources,
            memory_limit: config.memory.limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.searchlight/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SearchlightError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.searchlight/searchlight.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SearchlightError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SearchlightError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SearchlightError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SearchlightError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SearchlightError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key named by `var_name` from the environment.
pub fn read_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SearchlightError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that both provider API key env vars are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    read_api_key(&config.search.api_key_env)?;
    read_api_key(&config.llm.api_key_env)?;
    Ok(())
}
