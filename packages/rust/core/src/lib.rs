//! Retrieval-augmented answering for searchlight.
//!
//! This crate ties the providers, the vector index, conversation memory and
//! citation formatting into the staged query pipeline ([`Orchestrator`]).

pub mod chunker;
pub mod citations;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod state;

pub use citations::{CitationFormatter, ResponseFormatter};
pub use memory::{ConversationMemory, ConversationTurn, MemoryUsage};
pub use pipeline::{
    Orchestrator, OrchestratorStats, ProgressReporter, ProviderNames, Providers, SilentProgress,
};
pub use state::{RunState, Stage, StageOutcome};
