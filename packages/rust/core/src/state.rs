//! Run state record and the stage transition table.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use searchlight_shared::{Embedding, ScrapeResult, SearchResult, Source};

/// Bumped whenever [`RunState`] fields change shape.
pub const RUN_STATE_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Search,
    Scrape,
    Embed,
    Retrieve,
    Generate,
    Format,
    Done,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Search => "search",
            Stage::Scrape => "scrape",
            Stage::Embed => "embed",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
            Stage::Format => "format",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outgoing edge of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    To(Stage),
    /// Branch on whether the search stage produced any results.
    OnSearchResults { found: Stage, empty: Stage },
}

/// Every stage's outgoing edge. `Done` has none.
pub const TRANSITIONS: [(Stage, Edge); 6] = [
    (
        Stage::Search,
        Edge::OnSearchResults {
            found: Stage::Scrape,
            empty: Stage::Retrieve,
        },
    ),
    (Stage::Scrape, Edge::To(Stage::Embed)),
    (Stage::Embed, Edge::To(Stage::Retrieve)),
    (Stage::Retrieve, Edge::To(Stage::Generate)),
    (Stage::Generate, Edge::To(Stage::Format)),
    (Stage::Format, Edge::To(Stage::Done)),
];

/// Follow `stage`'s edge in [`TRANSITIONS`] given the state it produced.
pub fn next_stage(stage: Stage, state: &RunState) -> Stage {
    let edge = TRANSITIONS
        .iter()
        .find(|(from, _)| *from == stage)
        .map(|(_, edge)| *edge);

    match edge {
        Some(Edge::To(next)) => next,
        Some(Edge::OnSearchResults { found, empty }) => {
            if state.search_results.is_empty() {
                empty
            } else {
                found
            }
        }
        None => Stage::Done,
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Everything one pipeline run produced.
///
/// Stages consume a state and return a new one; nothing holds a reference
/// to a state while a stage runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub query: String,
    pub search_results: Vec<SearchResult>,
    pub scrape_results: Vec<ScrapeResult>,
    #[serde(skip)]
    pub embeddings: Vec<Embedding>,
    pub context: String,
    pub response: String,
    pub formatted_response: String,
    pub sources: Vec<Source>,
    /// Last stage failure, if any.
    pub error: Option<String>,
    /// Stages executed, in order. Bypassed stages do not appear.
    pub stages: Vec<Stage>,
}

impl RunState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            schema_version: RUN_STATE_VERSION,
            run_id: Uuid::now_v7(),
            query: query.into(),
            search_results: Vec::new(),
            scrape_results: Vec::new(),
            embeddings: Vec::new(),
            context: String::new(),
            response: String::new(),
            formatted_response: String::new(),
            sources: Vec::new(),
            error: None,
            stages: Vec::new(),
        }
    }

    pub fn ran(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Result of executing one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage did its work.
    Advanced(RunState),
    /// The stage failed; `state` already carries safe substitute values.
    Degraded { state: RunState, error: String },
}

impl StageOutcome {
    /// Fold the outcome into the next state, recording `stage` in the trail.
    /// A degraded outcome overwrites any earlier error.
    pub fn into_state(self, stage: Stage) -> RunState {
        let (state, error) = match self {
            StageOutcome::Advanced(state) => (state, None),
            StageOutcome::Degraded { state, error } => (state, Some(error)),
        };

        let mut stages = state.stages.clone();
        stages.push(stage);

        RunState {
            error: error.or(state.error.clone()),
            stages,
            ..state
        }
    }
}
