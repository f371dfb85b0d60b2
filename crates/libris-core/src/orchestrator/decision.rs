use crate::knowledge::KnowledgeEntry;
use crate::shared::Intent;
use serde::{Deserialize, Serialize};

/// Returned with `source = none`. Never empty.
pub const SAFE_FALLBACK_MESSAGE: &str =
    "Sorry, I can't answer right now. Please try again in a moment.";

/// Prefix of the knowledge snippet appended to a blended answer.
pub const BLEND_SNIPPET_PREFIX: &str = "From our catalog: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Knowledge,
    Generative,
    Blended,
    Clarification,
    None,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Generative => "generative",
            Self::Blended => "blended",
            Self::Clarification => "clarification",
            Self::None => "none",
        }
    }
}

/// Scores that contributed to a decision. `None` means that source did not answer in time
/// (or was never asked).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Confidences {
    pub intent: f32,
    pub retrieval: Option<f32>,
    pub generation: Option<f32>,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub source: Source,
    pub final_text: String,
    pub intent: Intent,
    pub confidences: Confidences,
    #[serde(default)]
    pub chosen_entries: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl DispatchDecision {
    pub fn new(source: Source, final_text: impl Into<String>, intent: Intent) -> Self {
        let confidences = Confidences {
            intent: intent.confidence,
            ..Confidences::default()
        };
        Self {
            source,
            final_text: final_text.into(),
            intent,
            confidences,
            chosen_entries: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// `source = none` with the safe fallback message.
    pub fn fallback(intent: Intent) -> Self {
        Self::new(Source::None, SAFE_FALLBACK_MESSAGE, intent)
    }

    pub fn with_entries(mut self, entries: Vec<KnowledgeEntry>) -> Self {
        self.chosen_entries = entries;
        self
    }

    pub fn with_scores(mut self, retrieval: Option<f32>, generation: Option<f32>) -> Self {
        self.confidences.retrieval = retrieval;
        self.confidences.generation = generation;
        self
    }
}

/// Truncates `text` to at most `max_chars` characters on a char boundary, adding an ellipsis
/// when something was cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
    }
}

/// Generated text followed by a grounding snippet.
pub fn blend(generated: &str, grounding: &str, max_chars: usize) -> String {
    format!(
        "{}\n\n{}{}",
        generated.trim(),
        BLEND_SNIPPET_PREFIX,
        snippet(grounding, max_chars)
    )
}
