//! CLI command definitions, routing, and tracing setup.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use searchlight_core::{Orchestrator, ProgressReporter, Providers, RunState, Stage};
use searchlight_index::VectorIndex;
use searchlight_llm::{LlmOptions, MistralClient};
use searchlight_scraper::{ScrapeOptions, WebScraper};
use searchlight_search::{BraveSearch, SearchOptions, format_results_for_display};
use searchlight_shared::{
    AppConfig, PipelineConfig, init_config, load_config, load_config_from, read_api_key,
    validate_api_keys,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// searchlight: web-grounded answers with citations.
#[derive(Parser)]
#[command(
    name = "searchlight",
    version,
    about = "Answer questions from fresh web search results, with citations.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.searchlight/searchlight.toml.
    #[arg(long, global = true, env = "SEARCHLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Per-run overrides of config file values.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct RunArgs {
    /// Search results to fetch.
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Chunks retrieved as context.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Conversation turns remembered.
    #[arg(long)]
    pub memory_limit: Option<usize>,
}

impl RunArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(n) = self.max_results {
            config.max_search_results = n;
        }
        if let Some(k) = self.top_k {
            config.top_k = k;
        }
        if let Some(limit) = self.memory_limit {
            config.memory_limit = limit;
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer one question.
    Ask {
        /// The question.
        query: String,

        /// Save the run's vector index to this base path (<PATH>.vecs + <PATH>.json).
        #[arg(long)]
        save_index: Option<PathBuf>,

        /// Print index and memory stats after the answer.
        #[arg(long)]
        stats: bool,

        /// Print the full run state as JSON instead of the answer.
        #[arg(long)]
        json: bool,

        /// List the search results before the answer.
        #[arg(long)]
        show_search: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Interactive session; memory carries across questions.
    Chat {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Saved vector index operations.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Index subcommands.
#[derive(Subcommand)]
pub(crate) enum IndexAction {
    /// Load a saved index and print its stats and documents.
    Inspect {
        /// Base path given to `ask --save-index`.
        path: PathBuf,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "searchlight=warn",
        1 => "searchlight=info",
        2 => "searchlight=debug",
        _ => "searchlight=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Ask {
            query,
            save_index,
            stats,
            json,
            show_search,
            run,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            let output = AskOutput {
                stats,
                json,
                show_search,
            };
            cmd_ask(&config, &query, &run, save_index.as_deref(), output).await
        }
        Command::Chat { run } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_chat(&config, &run).await
        }
        Command::Index { action } => match action {
            IndexAction::Inspect { path } => cmd_index_inspect(&path),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// Wire the concrete providers into an orchestrator.
fn build_orchestrator(config: &AppConfig, overrides: &RunArgs) -> Result<Orchestrator> {
    validate_api_keys(config)?;
    let search_key = read_api_key(&config.search.api_key_env)?;
    let llm_key = read_api_key(&config.llm.api_key_env)?;

    let mut pipeline = PipelineConfig::from(config);
    overrides.apply(&mut pipeline);

    let search = BraveSearch::new(SearchOptions::from_config(&config.search, search_key))?;
    let scraper = WebScraper::new(ScrapeOptions::from(&config.scrape))?;
    let llm = Arc::new(MistralClient::new(LlmOptions::from_config(
        &config.llm,
        pipeline.dimension,
        llm_key,
    ))?);

    let models = llm.model_info();
    info!(
        chat_model = %models.chat_model,
        embedding_model = %models.embedding_model,
        dimension = models.embedding_dimension,
        "providers ready"
    );

    Ok(Orchestrator::new(
        pipeline,
        Providers {
            search: Arc::new(search),
            scrape: Arc::new(scraper),
            embedder: llm.clone(),
            generator: llm,
        },
    ))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// What `ask` prints besides the answer.
#[derive(Debug, Clone, Copy, Default)]
struct AskOutput {
    stats: bool,
    json: bool,
    show_search: bool,
}

async fn cmd_ask(
    config: &AppConfig,
    query: &str,
    overrides: &RunArgs,
    save_index: Option<&Path>,
    output: AskOutput,
) -> Result<()> {
    let orchestrator = build_orchestrator(config, overrides)?;

    let reporter = CliProgress::new();
    let state = orchestrator.run_with_progress(query, &reporter).await;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        if output.show_search {
            println!("{}", format_results_for_display(&state.search_results));
        }
        print_answer(&state);
    }

    if let Some(path) = save_index {
        orchestrator.save_index(path).await?;
        eprintln!("Index saved to {}", path.display());
    }

    if output.stats {
        let stats = orchestrator.stats().await;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Ok(())
}

async fn cmd_chat(config: &AppConfig, overrides: &RunArgs) -> Result<()> {
    let orchestrator = build_orchestrator(config, overrides)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask anything. Commands: /clear, /stats, /history, /exit");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                orchestrator.clear_memory().await;
                println!("Memory cleared.");
            }
            "/stats" => {
                let stats = orchestrator.stats().await;
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            "/history" => println!("{}", orchestrator.history_json().await?),
            cmd if cmd.starts_with('/') => println!("Unknown command: {cmd}"),
            query => {
                let reporter = CliProgress::new();
                let state = orchestrator.run_with_progress(query, &reporter).await;
                print_answer(&state);
            }
        }
    }

    Ok(())
}

fn cmd_index_inspect(path: &Path) -> Result<()> {
    let index = VectorIndex::open(path)
        .map_err(|e| eyre!("cannot load index at '{}': {e}", path.display()))?;

    let stats = index.stats();
    println!("Documents: {}", stats.document_count);
    println!("Dimension: {}", stats.dimension);
    for (i, doc) in index.documents().iter().enumerate() {
        let preview: String = doc.text.chars().take(80).collect();
        println!("{:>4}. {} <{}>", i + 1, doc.metadata.title, doc.metadata.url);
        println!("      {preview}");
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    match validate_api_keys(&config) {
        Ok(()) => println!("# API keys: present"),
        Err(e) => println!("# API keys: {e}"),
    }
    Ok(())
}

fn print_answer(state: &RunState) {
    println!();
    println!("{}", state.formatted_response);
    println!();
    if let Some(error) = &state.error {
        eprintln!("warning: {error}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        let msg = match stage {
            Stage::Search => "Searching the web",
            Stage::Scrape => "Reading pages",
            Stage::Embed => "Indexing content",
            Stage::Retrieve => "Finding relevant passages",
            Stage::Generate => "Writing answer",
            Stage::Format => "Adding citations",
            Stage::Done => "Done",
        };
        self.spinner.set_message(msg);
    }

    fn page_scraped(&self, url: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("Reading [{current}/{total}] {url}"));
    }

    fn done(&self, _state: &RunState) {
        self.spinner.finish_and_clear();
    }
}
