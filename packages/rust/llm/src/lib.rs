//! Mistral AI embedding and chat-completion provider.
//!
//! [`MistralClient`] implements both [`EmbeddingProvider`] and
//! [`GenerationProvider`] against the Mistral REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use searchlight_shared::{
    Embedding, EmbeddingProvider, GenerationProvider, LlmConfig, Result, SearchlightError,
};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("searchlight/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body quoted in error messages.
const ERROR_BODY_MAX: usize = 300;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Expected embedding length; reported by [`MistralClient::model_info`].
    pub dimension: usize,
}

impl LlmOptions {
    /// Build options from the `[llm]` config section, the index dimension and a resolved key.
    pub fn from_config(config: &LlmConfig, dimension: usize, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            dimension,
        }
    }
}

/// Models in use, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimension: usize,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MistralClient {
    client: Client,
    options: LlmOptions,
}

impl MistralClient {
    pub fn new(options: LlmOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| SearchlightError::Generation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, options })
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            embedding_model: self.options.embedding_model.clone(),
            chat_model: self.options.chat_model.clone(),
            embedding_dimension: self.options.dimension,
        }
    }

    /// POST `body` to `{base_url}/{endpoint}` and return the raw response text.
    async fn post(&self, endpoint: &str, body: &serde_json::Value) -> std::result::Result<String, String> {
        let url = format!("{}/{endpoint}", self.options.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.options.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{url}: {e}"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("{url}: failed to read body: {e}"))?;

        if !status.is_success() {
            let excerpt: String = text.chars().take(ERROR_BODY_MAX).collect();
            return Err(format!("{url}: HTTP {status}: {excerpt}"));
        }
        Ok(text)
    }
}

#[async_trait]
impl EmbeddingProvider for MistralClient {
    #[instrument(skip_all, fields(texts = texts.len(), model = %self.options.embedding_model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.options.embedding_model,
            "input": texts,
        });
        let raw = self.post("embeddings", &body).await.map_err(SearchlightError::Embedding)?;
        let mut parsed: EmbeddingResponse = serde_json::from_str(&raw)
            .map_err(|e| SearchlightError::Embedding(format!("malformed response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(SearchlightError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        let vectors: Vec<Embedding> = parsed.data.into_iter().map(|d| d.embedding).collect();

        info!(count = vectors.len(), "created embeddings");
        Ok(vectors)
    }

    fn name(&self) -> &str {
        "mistral"
    }
}

#[async_trait]
impl GenerationProvider for MistralClient {
    #[instrument(skip_all, fields(model = %self.options.chat_model))]
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.options.chat_model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "max_tokens": self.options.max_tokens,
            "temperature": self.options.temperature,
        });
        debug!(prompt_chars = user_prompt.len(), "requesting chat completion");

        let raw = self
            .post("chat/completions", &body)
            .await
            .map_err(SearchlightError::Generation)?;
        let parsed: ChatResponse = serde_json::from_str(&raw)
            .map_err(|e| SearchlightError::Generation(format!("malformed response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SearchlightError::Generation("response contained no choices".into()))?;

        info!(chars = content.len(), "generated response");
        Ok(content)
    }

    fn name(&self) -> &str {
        "mistral"
    }
}
