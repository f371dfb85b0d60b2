//! Lexical retriever over the read-only knowledge index.

use crate::lexicon::{token_set, tokenize};
use libris_core::{
    Intent, IntentLabel, KnowledgeEntry, KnowledgeIndex, Query, RetrievalResult, Retriever,
    ScoredEntry, ENTITY_AUTHOR, ENTITY_GENRE, ENTITY_ORDER, ENTITY_TITLE,
};
use std::collections::HashSet;

const COVERAGE_WEIGHT: f32 = 0.85;
const TAG_WEIGHT: f32 = 0.15;
/// Relevance of a title that merely contains the requested one.
const PARTIAL_TITLE_RELEVANCE: f32 = 0.9;
/// Relevance of a book in the same genre as the one a recommendation is anchored on.
const SAME_GENRE_RELEVANCE: f32 = 0.55;
const SAME_AUTHOR_BONUS: f32 = 0.15;

/// Tags an intent prefers when breaking near-ties.
fn preferred_tags(label: IntentLabel) -> &'static [&'static str] {
    match label {
        IntentLabel::CatalogLookup => &["faq", "book"],
        IntentLabel::OrderStatus => &["order"],
        IntentLabel::Recommendation => &["book"],
        IntentLabel::Smalltalk => &["smalltalk"],
        IntentLabel::Unknown => &[],
    }
}

fn tag_value<'a>(entry: &'a KnowledgeEntry, prefix: &str) -> Option<&'a str> {
    entry.tags.iter().find_map(|t| t.strip_prefix(prefix))
}

fn title_match(entry: &KnowledgeEntry, title: &str) -> Option<f32> {
    let tagged = tag_value(entry, "title:")?;
    if tagged == title {
        Some(1.0)
    } else if title.chars().count() >= 3 && tagged.contains(title) {
        Some(PARTIAL_TITLE_RELEVANCE)
    } else {
        None
    }
}

/// The book a recommendation is anchored on, as in "something like Dune". It is never
/// returned itself; books sharing its genre are.
struct Anchor<'a> {
    genre: &'a str,
    author: Option<&'a str>,
}

impl Anchor<'_> {
    fn similarity(&self, entry: &KnowledgeEntry) -> f32 {
        if tag_value(entry, "genre:") != Some(self.genre) {
            return 0.0;
        }
        let same_author = self.author.is_some() && tag_value(entry, "author:") == self.author;
        SAME_GENRE_RELEVANCE + if same_author { SAME_AUTHOR_BONUS } else { 0.0 }
    }
}

/// Exact-match targets resolved once per query.
#[derive(Default)]
struct Targets<'a> {
    order: Option<usize>,
    title: Option<String>,
    anchor: Option<Anchor<'a>>,
    /// Entry that must not be returned.
    excluded: Option<usize>,
}

/// Scores entries by query-token coverage plus tag affinity. Entry tokens are computed once,
/// when the retriever is built, since the index never changes afterwards.
pub struct LexicalRetriever {
    index: KnowledgeIndex,
    entry_tokens: Vec<HashSet<String>>,
    min_relevance: f32,
}

impl LexicalRetriever {
    pub fn new(index: KnowledgeIndex, min_relevance: f32) -> Self {
        let entry_tokens = index.entries().iter().map(entry_tokens).collect();
        Self {
            index,
            entry_tokens,
            min_relevance: min_relevance.clamp(0.0, 1.0),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Titles are exact targets only for catalog lookups. A recommendation naming a title
    /// refers to a book the user already knows, so that book is excluded and its genre
    /// becomes the anchor.
    fn targets(&self, intent: &Intent) -> Targets<'_> {
        let mut targets = Targets {
            order: intent
                .entity(ENTITY_ORDER)
                .and_then(|order| self.index.position(&format!("order/{}", order))),
            ..Targets::default()
        };
        let Some(title) = intent.entity(ENTITY_TITLE).map(str::to_lowercase) else {
            return targets;
        };
        match intent.label {
            IntentLabel::CatalogLookup => targets.title = Some(title),
            IntentLabel::Recommendation => {
                let referenced = self
                    .index
                    .entries()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, e)| title_match(e, &title).map(|s| (i, s)))
                    .reduce(|best, next| if next.1 > best.1 { next } else { best });
                if let Some((position, _)) = referenced {
                    let entry = &self.index.entries()[position];
                    targets.excluded = Some(position);
                    targets.anchor = tag_value(entry, "genre:").map(|genre| Anchor {
                        genre,
                        author: tag_value(entry, "author:"),
                    });
                }
            }
            _ => {}
        }
        targets
    }

    fn score(&self, i: usize, query_tokens: &HashSet<String>, intent: &Intent, targets: &Targets<'_>) -> f32 {
        let entry = &self.index.entries()[i];
        if targets.order == Some(i) {
            return 1.0;
        }
        if let Some(exact) = targets.title.as_deref().and_then(|t| title_match(entry, t)) {
            return exact;
        }
        let similar = targets.anchor.as_ref().map_or(0.0, |a| a.similarity(entry));
        self.lexical(i, query_tokens, intent).max(similar)
    }

    fn lexical(&self, i: usize, query_tokens: &HashSet<String>, intent: &Intent) -> f32 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        let entry = &self.index.entries()[i];
        let tokens = &self.entry_tokens[i];
        let hits = query_tokens.iter().filter(|t| tokens.contains(*t)).count();
        if hits == 0 {
            return 0.0;
        }
        let coverage = hits as f32 / query_tokens.len() as f32;
        let entity_tag = [ENTITY_GENRE, ENTITY_AUTHOR]
            .iter()
            .filter_map(|k| intent.entity(k))
            .any(|v| entry.has_tag(&v.to_lowercase()));
        let preferred = preferred_tags(intent.label)
            .iter()
            .any(|t| entry.has_tag(t));
        let affinity = if entity_tag || preferred { 1.0 } else { 0.0 };
        (COVERAGE_WEIGHT * coverage + TAG_WEIGHT * affinity).clamp(0.0, 1.0)
    }
}

fn entry_tokens(entry: &KnowledgeEntry) -> HashSet<String> {
    let mut tokens = token_set(&entry.text);
    for tag in &entry.tags {
        let value = tag.split_once(':').map_or(tag.as_str(), |(_, v)| v);
        tokens.extend(tokenize(value));
    }
    tokens
}

#[async_trait::async_trait]
impl Retriever for LexicalRetriever {
    async fn retrieve(&self, query: &Query, intent: &Intent, top_k: usize) -> RetrievalResult {
        let query_tokens = token_set(query.text());
        let targets = self.targets(intent);
        let hits: Vec<ScoredEntry> = (0..self.index.len())
            .filter(|i| targets.excluded != Some(*i))
            .filter_map(|i| {
                let relevance = self.score(i, &query_tokens, intent, &targets);
                (relevance >= self.min_relevance && relevance > 0.0).then(|| ScoredEntry {
                    entry: self.index.entries()[i].clone(),
                    relevance,
                })
            })
            .collect();
        let result = RetrievalResult::ranked(hits, top_k);
        tracing::debug!(
            target: "libris::knowledge",
            session_id = %query.session_id(),
            intent = intent.label.as_str(),
            hits = result.len(),
            top = result.top_relevance(),
            "retrieval finished"
        );
        result
    }
}
