//! Query pipeline: search → scrape → embed → retrieve → generate → format.
//!
//! [`Orchestrator`] owns the vector index and conversation memory and drives
//! one [`RunState`] through the stages in [`crate::state::TRANSITIONS`].
//! Each stage turns its own failure into a degraded state so later stages
//! still run; only contract violations (index dimension/length mismatches)
//! escape a stage, and [`Orchestrator::run`] converts those into an apology.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use searchlight_index::{IndexStats, VectorIndex};
use searchlight_shared::{
    DocumentMetadata, EmbeddingProvider, GenerationProvider, PipelineConfig, Result,
    ScrapeProvider, ScrapeResult, SearchProvider, SearchlightError, Source,
};

use crate::chunker::chunk_text;
use crate::citations::{CitationFormatter, ResponseFormatter, SNIPPET_MAX, clean_snippet};
use crate::memory::{ConversationMemory, MemoryUsage};
use crate::prompt::{SYSTEM_PROMPT, build_user_prompt};
use crate::state::{RunState, Stage, StageOutcome, next_stage};

/// Shown when formatting fails and there is no raw response to fall back to.
pub const FORMAT_FAILED: &str = "Response formatting failed";

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// External services the pipeline calls.
#[derive(Clone)]
pub struct Providers {
    pub search: Arc<dyn SearchProvider>,
    pub scrape: Arc<dyn ScrapeProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts.
    fn stage(&self, stage: Stage);
    /// Called after each page fetch.
    fn page_scraped(&self, url: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, state: &RunState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn page_scraped(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _state: &RunState) {}
}

/// Provider names, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderNames {
    pub search: String,
    pub scrape: String,
    pub embedding: String,
    pub generation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorStats {
    pub index: IndexStats,
    pub memory: MemoryUsage,
    pub providers: ProviderNames,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    config: PipelineConfig,
    providers: Providers,
    formatter: Arc<dyn ResponseFormatter>,
    /// Held for the whole of a run, which serializes runs.
    index: Mutex<VectorIndex>,
    memory: Mutex<ConversationMemory>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, providers: Providers) -> Self {
        let index = VectorIndex::new(config.dimension);
        let memory = ConversationMemory::new(config.memory_limit);
        Self {
            config,
            providers,
            formatter: Arc::new(CitationFormatter),
            index: Mutex::new(index),
            memory: Mutex::new(memory),
        }
    }

    /// Replace the response formatter used by the format stage.
    pub fn with_formatter(mut self, formatter: Arc<dyn ResponseFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer `query`. Never fails: faults end up in `RunState::error`.
    pub async fn run(&self, query: &str) -> RunState {
        self.run_with_progress(query, &SilentProgress).await
    }

    #[instrument(skip_all, fields(query = %query))]
    pub async fn run_with_progress(&self, query: &str, progress: &dyn ProgressReporter) -> RunState {
        let start = Instant::now();
        let initial = RunState::new(query);
        let run_id = initial.run_id;

        let mut index = self.index.lock().await;
        index.clear();

        let state = match self.drive(initial, &mut index, progress).await {
            Ok(state) => state,
            Err(e) => {
                let fault = SearchlightError::top_level(&e).to_string();
                warn!(error = %fault, "run aborted by unexpected fault");
                RunState {
                    run_id,
                    formatted_response: format!("I apologize, but I encountered an error: {fault}"),
                    error: Some(fault),
                    ..RunState::new(query)
                }
            }
        };

        info!(
            run_id = %state.run_id,
            stages = state.stages.len(),
            sources = state.sources.len(),
            failed = state.error.is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "run complete"
        );
        progress.done(&state);
        state
    }

    async fn drive(
        &self,
        initial: RunState,
        index: &mut VectorIndex,
        progress: &dyn ProgressReporter,
    ) -> Result<RunState> {
        let mut stage = Stage::Search;
        let mut state = initial;

        while stage != Stage::Done {
            progress.stage(stage);
            let outcome = match stage {
                Stage::Search => self.search(state).await,
                Stage::Scrape => self.scrape(state, progress).await,
                Stage::Embed => self.embed(state, index).await?,
                Stage::Retrieve => self.retrieve(state, index).await?,
                Stage::Generate => self.generate(state).await,
                Stage::Format => self.format(state),
                Stage::Done => break,
            };

            if let StageOutcome::Degraded { error, .. } = &outcome {
                warn!(%stage, %error, "stage degraded");
            }
            state = outcome.into_state(stage);
            stage = next_stage(stage, &state);
            debug!(next = %stage, "stage transition");
        }

        Ok(state)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn search(&self, state: RunState) -> StageOutcome {
        match self
            .providers
            .search
            .search(&state.query, self.config.max_search_results)
            .await
        {
            Ok(search_results) => {
                info!(results = search_results.len(), "search stage complete");
                StageOutcome::Advanced(RunState {
                    search_results,
                    ..state
                })
            }
            Err(e) => StageOutcome::Degraded {
                state: RunState {
                    search_results: Vec::new(),
                    ..state
                },
                error: format!("Search failed: {e}"),
            },
        }
    }

    async fn scrape(&self, state: RunState, progress: &dyn ProgressReporter) -> StageOutcome {
        let urls: Vec<&str> = state
            .search_results
            .iter()
            .map(|r| r.url.as_str())
            .filter(|u| !u.is_empty())
            .collect();

        let mut scrape_results: Vec<ScrapeResult> = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            if i > 0 && !self.config.scrape_delay.is_zero() {
                tokio::time::sleep(self.config.scrape_delay).await;
            }
            let result = self.providers.scrape.fetch(url, self.config.scrape_timeout).await;
            debug!(url, success = result.success, "scraped");
            progress.page_scraped(url, i + 1, urls.len());
            scrape_results.push(result);
        }

        let ok = scrape_results.iter().filter(|r| r.success).count();
        info!(ok, total = scrape_results.len(), "scrape stage complete");
        StageOutcome::Advanced(RunState {
            scrape_results,
            ..state
        })
    }

    /// Chunk and embed successful pages, then fill the index and the source list.
    async fn embed(&self, state: RunState, index: &mut VectorIndex) -> Result<StageOutcome> {
        let pages: Vec<&ScrapeResult> = state.scrape_results.iter().filter(|r| r.has_content()).collect();

        if pages.is_empty() {
            info!("no usable pages to embed");
            self.memory.lock().await.set_current_sources(Vec::new());
            return Ok(StageOutcome::Advanced(RunState {
                embeddings: Vec::new(),
                sources: Vec::new(),
                ..state
            }));
        }

        let search_snippets: HashMap<&str, &str> = state
            .search_results
            .iter()
            .map(|r| (r.url.as_str(), r.snippet.as_str()))
            .collect();

        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        let mut page_meta = Vec::with_capacity(pages.len());

        for page in &pages {
            let snippet = page
                .metadata
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .or_else(|| search_snippets.get(page.url.as_str()).copied())
                .map(|s| clean_snippet(s, SNIPPET_MAX))
                .filter(|s| !s.is_empty());
            let meta = DocumentMetadata {
                title: page.title.clone(),
                url: page.url.clone(),
                snippet,
            };

            for chunk in chunk_text(&page.content, self.config.chunk_size, self.config.chunk_overlap) {
                texts.push(chunk);
                metadata.push(meta.clone());
            }
            page_meta.push(meta);
        }

        let embeddings = match self.providers.embedder.embed(&texts).await {
            Ok(v) => v,
            Err(e) => {
                return Ok(StageOutcome::Degraded {
                    state: RunState {
                        embeddings: Vec::new(),
                        sources: Vec::new(),
                        ..state
                    },
                    error: format!("Embedding failed: {e}"),
                });
            }
        };

        // Mismatched counts or dimensions here mean the provider broke its contract.
        index.add(&texts, &embeddings, &metadata)?;

        let sources: Vec<Source> = page_meta
            .iter()
            .take(self.config.max_sources)
            .map(Source::from)
            .collect();
        self.memory.lock().await.set_current_sources(sources.clone());

        info!(
            pages = pages.len(),
            chunks = texts.len(),
            sources = sources.len(),
            "embed stage complete"
        );
        Ok(StageOutcome::Advanced(RunState {
            embeddings,
            sources,
            ..state
        }))
    }

    async fn retrieve(&self, state: RunState, index: &VectorIndex) -> Result<StageOutcome> {
        if index.is_empty() {
            debug!("index empty, skipping query embedding");
            return Ok(StageOutcome::Advanced(RunState {
                context: String::new(),
                ..state
            }));
        }

        let query_vector = match self.providers.embedder.embed(&[state.query.clone()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => {
                warn!("query embedding came back empty");
                return Ok(StageOutcome::Advanced(RunState {
                    context: String::new(),
                    ..state
                }));
            }
            Err(e) => {
                return Ok(StageOutcome::Degraded {
                    state: RunState {
                        context: String::new(),
                        ..state
                    },
                    error: format!("Context retrieval failed: {e}"),
                });
            }
        };

        let hits = index.search(&query_vector, self.config.top_k, self.config.similarity_threshold)?;
        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        info!(hits = hits.len(), context_chars = context.len(), "retrieve stage complete");
        Ok(StageOutcome::Advanced(RunState { context, ..state }))
    }

    async fn generate(&self, state: RunState) -> StageOutcome {
        let history = self.memory.lock().await.recent_context(true);
        let user_prompt = build_user_prompt(&state.query, &state.context, &state.sources, &history);

        match self.providers.generator.generate(SYSTEM_PROMPT, &user_prompt).await {
            Ok(response) => {
                let turn_meta = serde_json::json!({
                    "run_id": state.run_id,
                    "had_context": !state.context.is_empty(),
                });
                self.memory.lock().await.add_turn(
                    state.query.clone(),
                    response.clone(),
                    state.sources.clone(),
                    Some(turn_meta),
                );
                info!(chars = response.len(), "generate stage complete");
                StageOutcome::Advanced(RunState { response, ..state })
            }
            Err(e) => StageOutcome::Degraded {
                state: RunState {
                    response: format!(
                        "I apologize, but I encountered an error while generating a response: {e}"
                    ),
                    ..state
                },
                error: format!("Response generation failed: {e}"),
            },
        }
    }

    fn format(&self, state: RunState) -> StageOutcome {
        match self.formatter.format(&state.response, &state.sources) {
            Ok(formatted_response) => StageOutcome::Advanced(RunState {
                formatted_response,
                ..state
            }),
            Err(e) => {
                let fallback = if state.response.is_empty() {
                    FORMAT_FAILED.to_string()
                } else {
                    state.response.clone()
                };
                StageOutcome::Degraded {
                    state: RunState {
                        formatted_response: fallback,
                        ..state
                    },
                    error: format!("Formatting failed: {e}"),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Memory, stats, persistence
    // -----------------------------------------------------------------------

    pub async fn clear_memory(&self) {
        self.memory.lock().await.clear();
        info!("conversation memory cleared");
    }

    pub async fn memory_usage(&self) -> MemoryUsage {
        self.memory.lock().await.usage()
    }

    /// Conversation history as pretty JSON.
    pub async fn history_json(&self) -> Result<String> {
        self.memory.lock().await.export_history()
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let index = self.index.lock().await.stats();
        let memory = self.memory.lock().await.usage();
        OrchestratorStats {
            index,
            memory,
            providers: ProviderNames {
                search: self.providers.search.name().to_string(),
                scrape: self.providers.scrape.name().to_string(),
                embedding: self.providers.embedder.name().to_string(),
                generation: self.providers.generator.name().to_string(),
            },
        }
    }

    /// Save the current index (the last run's corpus) to `base`.
    pub async fn save_index(&self, base: &Path) -> Result<()> {
        self.index.lock().await.save(base)
    }

    /// Replace the index with the one saved at `base`.
    ///
    /// The next run clears it again, so this is for inspection between runs.
    pub async fn load_index(&self, base: &Path) -> Result<()> {
        self.index.lock().await.load(base)
    }
}

#[cfg(test)]
mod tests;
