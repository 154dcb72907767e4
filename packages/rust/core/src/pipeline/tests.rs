use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use searchlight_shared::{
    Embedding, PageMetadata, ScrapeError, SearchResult,
};

use super::*;
use crate::prompt::NO_INFORMATION;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct FakeSearch {
    outcome: std::result::Result<Vec<SearchResult>, String>,
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        match &self.outcome {
            Ok(results) => Ok(results.iter().take(max_results).cloned().collect()),
            Err(msg) => Err(SearchlightError::Search(msg.clone())),
        }
    }

    fn name(&self) -> &str {
        "fake-search"
    }
}

/// Serves pages from a map; unknown URLs time out.
#[derive(Default)]
struct FakeScrape {
    pages: HashMap<String, ScrapeResult>,
    calls: StdMutex<Vec<String>>,
}

#[async_trait]
impl ScrapeProvider for FakeScrape {
    async fn fetch(&self, url: &str, _timeout: Duration) -> ScrapeResult {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| ScrapeResult::failed(url, ScrapeError::Timeout))
    }

    fn name(&self) -> &str {
        "fake-scrape"
    }
}

/// Three-dimensional keyword embedding: (rust mentions, python mentions, 1).
struct KeywordEmbedder {
    dimension: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    fn new() -> Self {
        Self {
            dimension: 3,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SearchlightError::Embedding("quota exceeded".into()));
        }
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v = vec![
                    lower.matches("rust").count() as f32,
                    lower.matches("python").count() as f32,
                    1.0,
                ];
                v.resize(self.dimension, 0.0);
                v
            })
            .collect())
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

struct FakeGenerator {
    reply: std::result::Result<String, String>,
    prompts: StdMutex<Vec<String>>,
}

impl FakeGenerator {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: StdMutex::new(Vec::new()),
        }
    }

    fn failing(msg: &str) -> Self {
        Self {
            reply: Err(msg.to_string()),
            prompts: StdMutex::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        self.reply.clone().map_err(SearchlightError::Generation)
    }

    fn name(&self) -> &str {
        "fake-generator"
    }
}

struct BrokenFormatter;

impl ResponseFormatter for BrokenFormatter {
    fn format(&self, _response: &str, _sources: &[Source]) -> Result<String> {
        Err(SearchlightError::Formatting("template missing".into()))
    }
}

#[derive(Default)]
struct RecordingProgress {
    stages: StdMutex<Vec<Stage>>,
    pages: AtomicUsize,
    done: AtomicUsize,
}

impl ProgressReporter for RecordingProgress {
    fn stage(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }
    fn page_scraped(&self, _url: &str, _current: usize, _total: usize) {
        self.pages.fetch_add(1, Ordering::SeqCst);
    }
    fn done(&self, _state: &RunState) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn hit(title: &str, url: &str, snippet: &str) -> SearchResult {
    SearchResult {
        title: title.into(),
        url: url.into(),
        snippet: snippet.into(),
    }
}

fn page(url: &str, title: &str, content: &str, description: Option<&str>) -> ScrapeResult {
    ScrapeResult {
        url: url.into(),
        title: title.into(),
        content: content.into(),
        metadata: PageMetadata {
            description: description.map(str::to_string),
            ..PageMetadata::default()
        },
        success: true,
        error: None,
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        dimension: 3,
        scrape_delay: Duration::ZERO,
        scrape_timeout: Duration::from_secs(1),
        ..PipelineConfig::default()
    }
}

struct Harness {
    orchestrator: Orchestrator,
    scrape: Arc<FakeScrape>,
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<FakeGenerator>,
}

fn harness(
    config: PipelineConfig,
    search: FakeSearch,
    scrape: FakeScrape,
    embedder: KeywordEmbedder,
    generator: FakeGenerator,
) -> Harness {
    let scrape = Arc::new(scrape);
    let embedder = Arc::new(embedder);
    let generator = Arc::new(generator);
    let orchestrator = Orchestrator::new(
        config,
        Providers {
            search: Arc::new(search),
            scrape: scrape.clone(),
            embedder: embedder.clone(),
            generator: generator.clone(),
        },
    );
    Harness {
        orchestrator,
        scrape,
        embedder,
        generator,
    }
}

fn two_page_web() -> (FakeSearch, FakeScrape) {
    let search = FakeSearch {
        outcome: Ok(vec![
            hit("Rust Book", "https://rust.example/book", "The Rust book"),
            hit("Python Docs", "https://python.example/docs", "Python documentation"),
        ]),
    };
    let mut scrape = FakeScrape::default();
    scrape.pages.insert(
        "https://rust.example/book".into(),
        page(
            "https://rust.example/book",
            "Rust Book",
            "Rust is a systems language. Rust has ownership.",
            Some("Learn Rust"),
        ),
    );
    scrape.pages.insert(
        "https://python.example/docs".into(),
        page(
            "https://python.example/docs",
            "Python Docs",
            "Python is a scripting language.",
            None,
        ),
    );
    (search, scrape)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_search_results_bypasses_scrape_and_embed() {
    let h = harness(
        test_config(),
        FakeSearch { outcome: Ok(vec![]) },
        FakeScrape::default(),
        KeywordEmbedder::new(),
        FakeGenerator::replying("I could not find information about that."),
    );

    let state = h.orchestrator.run("asdkjqwe123").await;

    assert_eq!(
        state.stages,
        [Stage::Search, Stage::Retrieve, Stage::Generate, Stage::Format]
    );
    assert!(!state.ran(Stage::Scrape));
    assert!(!state.ran(Stage::Embed));
    assert_eq!(state.context, "");
    assert!(state.error.is_none());
    assert!(h.scrape.calls.lock().unwrap().is_empty());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);

    assert!(h.generator.last_prompt().contains(NO_INFORMATION));
    assert_eq!(state.formatted_response, "I could not find information about that.");
    assert!(!state.formatted_response.contains("**Sources:**"));

    assert_eq!(h.orchestrator.memory_usage().await.count, 1);
}

#[tokio::test]
async fn full_run_cites_sources_in_scrape_order() {
    let (search, scrape) = two_page_web();
    let h = harness(
        test_config(),
        search,
        scrape,
        KeywordEmbedder::new(),
        FakeGenerator::replying("Rust is fast. It is safe. It has a book"),
    );

    let state = h.orchestrator.run("Tell me about Rust").await;

    assert!(state.error.is_none(), "unexpected error: {:?}", state.error);
    assert_eq!(
        state.stages,
        [
            Stage::Search,
            Stage::Scrape,
            Stage::Embed,
            Stage::Retrieve,
            Stage::Generate,
            Stage::Format
        ]
    );
    assert_eq!(state.scrape_results.len(), 2);
    assert_eq!(state.embeddings.len(), 2);

    let urls: Vec<&str> = state.sources.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(urls, ["https://rust.example/book", "https://python.example/docs"]);
    assert_eq!(state.sources[0].snippet, "Learn Rust");
    // No page description: falls back to the search snippet.
    assert_eq!(state.sources[1].snippet, "Python documentation");

    // The Rust page is nearest to a Rust query.
    assert!(state.context.starts_with("Rust is a systems language."));

    assert!(state.formatted_response.starts_with("Rust is fast. It is safe [1]. It has a book"));
    assert!(state.formatted_response.contains("\n\n---\n\n**Sources:**\n\n"));
    assert!(state.formatted_response.contains("**1. [Rust Book](https://rust.example/book)**"));
    assert!(state.formatted_response.contains("**2. [Python Docs](https://python.example/docs)**"));

    let prompt = h.generator.last_prompt();
    assert!(prompt.contains("Source 1: Rust Book (https://rust.example/book)"));
    assert!(prompt.contains("User Question: Tell me about Rust"));

    let stats = h.orchestrator.stats().await;
    assert_eq!(stats.index.document_count, 2);
    assert_eq!(stats.memory.count, 1);
    assert_eq!(stats.providers.generation, "fake-generator");
}

#[tokio::test]
async fn failed_pages_are_recorded_and_skipped() {
    let (_, scrape) = two_page_web();
    let search = FakeSearch {
        outcome: Ok(vec![
            hit("Gone", "https://gone.example", ""),
            hit("Rust Book", "https://rust.example/book", ""),
        ]),
    };
    let h = harness(
        test_config(),
        search,
        scrape,
        KeywordEmbedder::new(),
        FakeGenerator::replying("ok"),
    );

    let state = h.orchestrator.run("rust").await;

    assert_eq!(state.scrape_results.len(), 2);
    assert_eq!(state.scrape_results[0].url, "https://gone.example");
    assert_eq!(state.scrape_results[0].error, Some(ScrapeError::Timeout));
    assert!(state.scrape_results[1].success);
    assert_eq!(state.sources.len(), 1);
    assert!(state.error.is_none());
    assert_eq!(
        *h.scrape.calls.lock().unwrap(),
        ["https://gone.example", "https://rust.example/book"]
    );
}

#[tokio::test]
async fn all_pages_failing_degrades_without_error() {
    let search = FakeSearch {
        outcome: Ok(vec![hit("A", "https://a.example", ""), hit("B", "https://b.example", "")]),
    };
    let h = harness(
        test_config(),
        search,
        FakeScrape::default(),
        KeywordEmbedder::new(),
        FakeGenerator::replying("nothing useful"),
    );

    let state = h.orchestrator.run("q").await;

    assert!(state.ran(Stage::Scrape) && state.ran(Stage::Embed));
    assert!(state.sources.is_empty());
    assert!(state.embeddings.is_empty());
    assert_eq!(state.context, "");
    assert!(state.error.is_none());
    assert_eq!(state.formatted_response, "nothing useful");
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_failure_is_recorded_and_run_continues() {
    let h = harness(
        test_config(),
        FakeSearch {
            outcome: Err("401 unauthorized".into()),
        },
        FakeScrape::default(),
        KeywordEmbedder::new(),
        FakeGenerator::replying("fallback answer"),
    );

    let state = h.orchestrator.run("q").await;

    assert!(state.search_results.is_empty());
    assert!(state.error.as_deref().unwrap().starts_with("Search failed:"));
    assert_eq!(
        state.stages,
        [Stage::Search, Stage::Retrieve, Stage::Generate, Stage::Format]
    );
    assert_eq!(state.formatted_response, "fallback answer");
}

#[tokio::test]
async fn embedding_failure_clears_sources() {
    let (search, scrape) = two_page_web();
    let mut embedder = KeywordEmbedder::new();
    embedder.fail = true;
    let h = harness(test_config(), search, scrape, embedder, FakeGenerator::replying("answer"));

    let state = h.orchestrator.run("rust").await;

    assert!(state.error.as_deref().unwrap().starts_with("Embedding failed:"));
    assert!(state.sources.is_empty());
    assert_eq!(state.context, "");
    assert!(state.ran(Stage::Generate));
    assert_eq!(state.formatted_response, "answer");
    // Only the batch call; the empty index skips the query embedding.
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generation_failure_apologises_without_recording_turn() {
    let (search, scrape) = two_page_web();
    let h = harness(
        test_config(),
        search,
        scrape,
        KeywordEmbedder::new(),
        FakeGenerator::failing("model overloaded"),
    );

    let state = h.orchestrator.run("rust").await;

    assert!(state.error.as_deref().unwrap().starts_with("Response generation failed:"));
    assert!(state
        .response
        .starts_with("I apologize, but I encountered an error while generating a response:"));
    assert!(state.formatted_response.contains("I apologize"));
    assert_eq!(h.orchestrator.memory_usage().await.count, 0);
}

#[tokio::test]
async fn formatting_failure_falls_back_to_raw_response() {
    let (search, scrape) = two_page_web();
    let h = harness(
        test_config(),
        search,
        scrape,
        KeywordEmbedder::new(),
        FakeGenerator::replying("Plain. Answer. Text"),
    );
    let orchestrator = h.orchestrator.with_formatter(Arc::new(BrokenFormatter));

    let state = orchestrator.run("rust").await;

    assert_eq!(state.formatted_response, "Plain. Answer. Text");
    assert!(state.error.as_deref().unwrap().starts_with("Formatting failed:"));
}

#[tokio::test]
async fn formatting_failure_with_empty_response_uses_fixed_text() {
    let h = harness(
        test_config(),
        FakeSearch { outcome: Ok(vec![]) },
        FakeScrape::default(),
        KeywordEmbedder::new(),
        FakeGenerator::replying(""),
    );
    let orchestrator = h.orchestrator.with_formatter(Arc::new(BrokenFormatter));

    let state = orchestrator.run("q").await;
    assert_eq!(state.formatted_response, FORMAT_FAILED);
}

#[tokio::test]
async fn contract_violation_becomes_apology() {
    let (search, scrape) = two_page_web();
    let mut embedder = KeywordEmbedder::new();
    embedder.dimension = 5;
    let h = harness(test_config(), search, scrape, embedder, FakeGenerator::replying("unused"));

    let state = h.orchestrator.run("rust").await;

    let error = state.error.as_deref().unwrap();
    assert!(error.contains("dimension mismatch"), "{error}");
    assert_eq!(
        state.formatted_response,
        format!("I apologize, but I encountered an error: {error}")
    );
    assert!(state.stages.is_empty());
    assert!(h.generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn index_is_cleared_between_runs() {
    let (search, scrape) = two_page_web();
    let h = harness(test_config(), search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("a"));

    h.orchestrator.run("rust").await;
    h.orchestrator.run("python").await;

    assert_eq!(h.orchestrator.stats().await.index.document_count, 2);
}

#[tokio::test]
async fn memory_is_bounded_and_feeds_next_prompt() {
    let (search, scrape) = two_page_web();
    let config = PipelineConfig {
        memory_limit: 2,
        ..test_config()
    };
    let h = harness(config, search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("reply"));

    h.orchestrator.run("first question").await;
    assert!(!h.generator.last_prompt().contains("Previous conversation context"));

    h.orchestrator.run("second question").await;
    let prompt = h.generator.last_prompt();
    assert!(prompt.contains("Previous conversation context:\nUser: first question"));
    assert!(prompt.contains("Assistant (using sources: Rust Book (https://rust.example/book)"));

    h.orchestrator.run("third question").await;
    let usage = h.orchestrator.memory_usage().await;
    assert_eq!((usage.count, usage.limit, usage.percent_used), (2, 2, 100));

    let history: Vec<serde_json::Value> =
        serde_json::from_str(&h.orchestrator.history_json().await.unwrap()).unwrap();
    assert_eq!(history[0]["query"], "second question");
    assert_eq!(history[1]["query"], "third question");

    h.orchestrator.clear_memory().await;
    assert_eq!(h.orchestrator.memory_usage().await.count, 0);
}

#[tokio::test]
async fn sources_are_capped() {
    let (search, scrape) = two_page_web();
    let config = PipelineConfig {
        max_sources: 1,
        ..test_config()
    };
    let h = harness(config, search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("x"));

    let state = h.orchestrator.run("rust").await;
    assert_eq!(state.sources.len(), 1);
    assert_eq!(state.sources[0].title, "Rust Book");
    // Both pages are still indexed.
    assert_eq!(h.orchestrator.stats().await.index.document_count, 2);
}

#[tokio::test]
async fn long_pages_are_chunked_before_embedding() {
    let search = FakeSearch {
        outcome: Ok(vec![hit("Long", "https://long.example", "")]),
    };
    let mut scrape = FakeScrape::default();
    let content = "rust ".repeat(300);
    scrape.pages.insert(
        "https://long.example".into(),
        page("https://long.example", "Long", &content, None),
    );
    let config = PipelineConfig {
        chunk_size: 100,
        chunk_overlap: 10,
        ..test_config()
    };
    let h = harness(config, search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("x"));

    let state = h.orchestrator.run("rust").await;

    assert!(state.embeddings.len() > 1);
    assert_eq!(state.sources.len(), 1);
    // Retrieval is capped at top_k chunks.
    assert_eq!(state.context.split("\n\n").count(), 5);
}

#[tokio::test]
async fn progress_sees_executed_stages() {
    let (search, scrape) = two_page_web();
    let h = harness(test_config(), search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("x"));
    let progress = RecordingProgress::default();

    let state = h.orchestrator.run_with_progress("rust", &progress).await;

    assert_eq!(*progress.stages.lock().unwrap(), state.stages);
    assert_eq!(progress.pages.load(Ordering::SeqCst), 2);
    assert_eq!(progress.done.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn saved_index_round_trips_through_orchestrator() {
    let (search, scrape) = two_page_web();
    let h = harness(test_config(), search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("x"));
    h.orchestrator.run("rust").await;

    let dir = std::env::temp_dir().join(format!("searchlight-core-test-{}", uuid::Uuid::now_v7()));
    let base = dir.join("last-run");
    h.orchestrator.save_index(&base).await.unwrap();

    let before = h.orchestrator.stats().await.index;
    h.orchestrator.load_index(&base).await.unwrap();
    assert_eq!(h.orchestrator.stats().await.index, before);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn loading_index_of_other_dimension_keeps_orchestrator_usable() {
    let (search, scrape) = two_page_web();
    let h = harness(test_config(), search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("ok"));

    let dir = std::env::temp_dir().join(format!("searchlight-core-test-{}", uuid::Uuid::now_v7()));
    let base = dir.join("flat");
    let mut foreign = VectorIndex::new(2);
    foreign
        .add(
            &["two dims".to_string()],
            &[vec![0.5, 0.5]],
            &[DocumentMetadata {
                title: "Flat".into(),
                url: "https://flat.example".into(),
                snippet: None,
            }],
        )
        .unwrap();
    foreign.save(&base).unwrap();

    let err = h.orchestrator.load_index(&base).await.unwrap_err();
    assert!(matches!(err, SearchlightError::Persistence(_)));

    let index = h.orchestrator.stats().await.index;
    assert_eq!(index.dimension, 3);
    assert_eq!(index.document_count, 0);

    let state = h.orchestrator.run("rust").await;
    assert!(state.error.is_none(), "unexpected error: {:?}", state.error);
    assert_eq!(state.response, "ok");
    assert_eq!(state.sources.len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn scrape_waits_between_fetches_but_not_before_first() {
    let urls = ["https://a.example/1", "https://b.example/2", "https://c.example/3"];
    let search = FakeSearch {
        outcome: Ok(urls.iter().map(|u| hit("Page", u, "")).collect()),
    };
    let mut scrape = FakeScrape::default();
    for url in urls {
        scrape
            .pages
            .insert(url.into(), page(url, "Page", "Rust pages about rust.", None));
    }
    let delay = Duration::from_millis(750);
    let config = PipelineConfig {
        scrape_delay: delay,
        ..test_config()
    };
    let h = harness(config, search, scrape, KeywordEmbedder::new(), FakeGenerator::replying("x"));

    let start = tokio::time::Instant::now();
    let state = h.orchestrator.run("rust").await;

    assert_eq!(start.elapsed(), delay * 2);
    assert_eq!(*h.scrape.calls.lock().unwrap(), urls);
    let scraped: Vec<&str> = state.scrape_results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(scraped, urls);
}
