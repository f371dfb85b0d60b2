//! Seams between the dispatcher and its collaborators, plus the values that cross them.

use crate::context::ConversationContext;
use crate::error::GenerationError;
use crate::knowledge::KnowledgeEntry;
use crate::shared::{Intent, Query};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maps a raw query to an intent. Must be pure and must never fail: when nothing matches it
/// returns [`Intent::unknown`].
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, query: &Query, context: &ConversationContext) -> Intent;
}

/// Fetches candidate knowledge entries. An empty result is a normal outcome, not an error.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &Query, intent: &Intent, top_k: usize) -> RetrievalResult;
}

/// Opaque generative capability. Implementations enforce `timeout` themselves.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// A knowledge entry with its relevance to the current query, in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    pub relevance: f32,
}

/// Hits ordered by descending relevance; equal scores keep store insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    hits: Vec<ScoredEntry>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sorts `hits` (stable, so ties keep their incoming order) and truncates to `top_k`.
    pub fn ranked(mut hits: Vec<ScoredEntry>, top_k: usize) -> Self {
        hits.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Self { hits }
    }

    pub fn hits(&self) -> &[ScoredEntry] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Best hit that carries usable text.
    pub fn top(&self) -> Option<&ScoredEntry> {
        self.hits.iter().find(|h| !h.entry.text.trim().is_empty())
    }

    pub fn top_relevance(&self) -> f32 {
        self.top().map(|h| h.relevance).unwrap_or(0.0)
    }

    pub fn entries(&self) -> impl Iterator<Item = &KnowledgeEntry> {
        self.hits.iter().map(|h| &h.entry)
    }
}

/// One prior exchange handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    #[serde(default)]
    pub context: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

impl GenerationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<KnowledgeEntry>) -> Self {
        self.context = context;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    /// Comparable across calls; not a calibrated probability.
    pub confidence: f32,
    pub latency_ms: u64,
}
