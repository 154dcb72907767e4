//! Bounded conversation memory.
//!
//! Keeps the most recent `limit` turns, evicting strictly oldest-first, and
//! renders a short fixed-window summary used to condition the next prompt.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use searchlight_shared::{Result, SearchlightError, Source};

/// Turns included in [`ConversationMemory::recent_context`].
const CONTEXT_WINDOW: usize = 2;

/// Sources named per assistant line when sources are requested.
const CONTEXT_SOURCES: usize = 2;

/// One remembered question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub count: usize,
    pub limit: usize,
    /// Integer percentage of `limit` in use; `0` when `limit` is `0`.
    pub percent_used: usize,
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    limit: usize,
    turns: VecDeque<ConversationTurn>,
    current_sources: Vec<Source>,
}

impl ConversationMemory {
    /// A memory holding at most `limit` turns. A limit of `0` remembers nothing.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            turns: VecDeque::with_capacity(limit),
            current_sources: Vec::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn stamped with the current time, evicting the oldest
    /// turns until the limit holds.
    pub fn add_turn(
        &mut self,
        query: impl Into<String>,
        response: impl Into<String>,
        sources: Vec<Source>,
        metadata: Option<serde_json::Value>,
    ) {
        self.turns.push_back(ConversationTurn {
            timestamp: Utc::now(),
            query: query.into(),
            response: response.into(),
            sources,
            metadata,
        });

        let mut evicted = 0;
        while self.turns.len() > self.limit {
            self.turns.pop_front();
            evicted += 1;
        }
        debug!(count = self.turns.len(), evicted, "recorded conversation turn");
    }

    /// The last two turns as `User:` / `Assistant:` lines, oldest first.
    ///
    /// With `include_sources`, assistant lines name up to two of that turn's
    /// sources. Empty memory yields an empty string.
    pub fn recent_context(&self, include_sources: bool) -> String {
        let skip = self.turns.len().saturating_sub(CONTEXT_WINDOW);
        let mut parts = Vec::with_capacity(CONTEXT_WINDOW * 2);

        for turn in self.turns.iter().skip(skip) {
            parts.push(format!("User: {}", turn.query));
            if include_sources && !turn.sources.is_empty() {
                let named = turn
                    .sources
                    .iter()
                    .take(CONTEXT_SOURCES)
                    .map(|s| format!("{} ({})", s.title, s.url))
                    .collect::<Vec<_>>()
                    .join(", ");
                parts.push(format!("Assistant (using sources: {named}): {}", turn.response));
            } else {
                parts.push(format!("Assistant: {}", turn.response));
            }
        }

        parts.join("\n\n")
    }

    /// Drop every turn and the staged current sources.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.current_sources.clear();
    }

    pub fn usage(&self) -> MemoryUsage {
        let count = self.turns.len();
        let percent_used = if self.limit == 0 {
            0
        } else {
            count * 100 / self.limit
        };
        MemoryUsage {
            count,
            limit: self.limit,
            percent_used,
        }
    }

    /// Snapshot of all turns, oldest first.
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Stage the sources of the run in progress.
    pub fn set_current_sources(&mut self, sources: Vec<Source>) {
        self.current_sources = sources;
    }

    pub fn current_sources(&self) -> &[Source] {
        &self.current_sources
    }

    /// All turns as pretty-printed JSON.
    pub fn export_history(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.turns)
            .map_err(|e| SearchlightError::validation(format!("history serialization failed: {e}")))
    }
}
