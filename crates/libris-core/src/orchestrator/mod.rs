//! Dispatcher: decides, per query, whether the answer comes from the knowledge store, the
//! generator, or a blend of both.
//!
//! Knowledge-first intents consult the retriever alone and stop there on a decisive hit.
//! Everything else runs retrieval and generation as two spawned tasks, each under its own
//! timeout, joined against the turn deadline. Generator failures only steer routing; the
//! caller always gets a decision unless the deployment itself is misconfigured.

mod capability;
mod decision;
mod stats;

pub use capability::{
    GenerationRequest, GenerationResponse, Generator, HistoryTurn, IntentClassifier,
    RetrievalResult, Retriever, ScoredEntry,
};
pub use decision::{
    blend, snippet, Confidences, DispatchDecision, Source, BLEND_SNIPPET_PREFIX,
    SAFE_FALLBACK_MESSAGE,
};
pub use stats::{DispatchStats, StatsSnapshot};

use crate::context::{ContextManager, ConversationContext};
use crate::error::{DispatchError, GenerationError};
use crate::knowledge::KnowledgeEntry;
use crate::shared::{DispatchPolicy, Intent, Query, DEFAULT_SESSION_ID};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Results of the sub-calls that finished before the deadline.
#[derive(Debug, Default)]
struct Gathered {
    retrieval: Option<RetrievalResult>,
    generation: Option<GenerationResponse>,
}

enum SubCall {
    Retrieval(Option<RetrievalResult>),
    Generation(Result<GenerationResponse, GenerationError>),
}

/// Picks the answer source from the scores that arrived. `None` means the source did not
/// answer.
pub fn choose_source(policy: &DispatchPolicy, relevance: Option<f32>, generation: Option<f32>) -> Source {
    match (relevance, generation) {
        (Some(r), _) if r >= policy.high_threshold => Source::Knowledge,
        (Some(r), Some(g)) if g >= policy.min_threshold && r >= policy.low_threshold => Source::Blended,
        (_, Some(g)) if g >= policy.min_threshold => Source::Generative,
        (Some(r), _) if r >= policy.min_threshold => Source::Knowledge,
        _ => Source::Clarification,
    }
}

/// A sequential sub-call's timeout, clipped to the turn deadline.
fn budget(timeout: Duration, deadline: Instant) -> Duration {
    timeout.min(deadline.saturating_duration_since(Instant::now()))
}

fn history_window(context: &ConversationContext, n: usize) -> Vec<HistoryTurn> {
    context
        .recent(n)
        .into_iter()
        .map(|t| HistoryTurn {
            user: t.query.text().to_string(),
            assistant: t.decision.final_text.clone(),
        })
        .collect()
}

pub struct Dispatcher {
    classifier: Arc<dyn IntentClassifier>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    contexts: Arc<ContextManager>,
    policy: DispatchPolicy,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Fails when thresholds or limits are inconsistent. A missing clarification template is
    /// reported per turn by [`Dispatcher::dispatch`].
    pub fn new(
        policy: DispatchPolicy,
        classifier: Arc<dyn IntentClassifier>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        contexts: Arc<ContextManager>,
    ) -> Result<Self, DispatchError> {
        policy.validate_limits()?;
        Ok(Self {
            classifier,
            retriever,
            generator,
            contexts,
            policy,
            stats: DispatchStats::new(),
        })
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn contexts(&self) -> &Arc<ContextManager> {
        &self.contexts
    }

    /// Classifies `text` against an empty context, without dispatching or recording anything.
    pub fn classify_text(&self, text: &str) -> Intent {
        let query = Query::new(text, DEFAULT_SESSION_ID);
        self.classifier
            .classify(&query, &ConversationContext::new(DEFAULT_SESSION_ID))
    }

    /// Runs one turn and records it in the session context before returning.
    ///
    /// Only [`DispatchError::FatalConfiguration`] escapes; the turn is not recorded then.
    pub async fn dispatch(&self, query: Query) -> Result<DispatchDecision, DispatchError> {
        let clarification = match self.policy.clarification_text() {
            Ok(text) => text.to_string(),
            Err(e) => {
                self.stats.fatal();
                tracing::error!(
                    target: "libris::dispatch",
                    session_id = %query.session_id(),
                    error = %e,
                    "turn aborted"
                );
                return Err(e);
            }
        };

        let turn = self.contexts.begin_turn(query.session_id()).await;
        let started = Instant::now();
        let deadline = started + self.policy.turn_deadline();

        let intent = self.classifier.classify(&query, turn.context());
        let history = history_window(turn.context(), self.policy.history_window);
        tracing::debug!(
            target: "libris::dispatch",
            session_id = %query.session_id(),
            intent = intent.label.as_str(),
            confidence = intent.confidence,
            "intent classified"
        );

        let mut decision = self
            .route(&query, intent, history, &clarification, deadline)
            .await;
        decision.elapsed_ms = started.elapsed().as_millis() as u64;
        self.stats.record(&decision);

        tracing::info!(
            target: "libris::dispatch",
            session_id = %query.session_id(),
            intent = decision.intent.label.as_str(),
            source = decision.source.as_str(),
            retrieval = ?decision.confidences.retrieval,
            generation = ?decision.confidences.generation,
            elapsed_ms = decision.elapsed_ms,
            "turn dispatched"
        );

        turn.append(query, decision.clone());
        Ok(decision)
    }

    async fn route(
        &self,
        query: &Query,
        intent: Intent,
        history: Vec<HistoryTurn>,
        clarification: &str,
        deadline: Instant,
    ) -> DispatchDecision {
        let mut prior = None;
        if intent.label.is_knowledge_first() {
            let result = self.retrieve_within(query, &intent, deadline).await;
            let decisive = result
                .as_ref()
                .map(|r| r.top_relevance() >= self.policy.high_threshold)
                .unwrap_or(false);
            if decisive {
                self.stats.short_circuit();
                let gathered = Gathered {
                    retrieval: result,
                    generation: None,
                };
                return self.resolve(intent, gathered, clarification);
            }
            prior = Some(result);
        }
        let gathered = self.gather(query, &intent, prior, history, deadline).await;
        self.resolve(intent, gathered, clarification)
    }

    async fn retrieve_within(
        &self,
        query: &Query,
        intent: &Intent,
        deadline: Instant,
    ) -> Option<RetrievalResult> {
        let limit = budget(self.policy.retrieval_timeout(), deadline);
        match tokio::time::timeout(limit, self.retriever.retrieve(query, intent, self.policy.top_k)).await {
            Ok(result) => Some(result),
            Err(_) => {
                tracing::warn!(
                    target: "libris::dispatch",
                    session_id = %query.session_id(),
                    timeout_ms = limit.as_millis() as u64,
                    "retrieval timed out"
                );
                None
            }
        }
    }

    /// Runs the outstanding sub-calls concurrently, each under its own timeout, until both
    /// finish or the turn deadline passes. `prior` is `Some` when retrieval already ran for
    /// this turn; its hits become grounding context for the generator.
    async fn gather(
        &self,
        query: &Query,
        intent: &Intent,
        prior: Option<Option<RetrievalResult>>,
        history: Vec<HistoryTurn>,
        deadline: Instant,
    ) -> Gathered {
        let (tx, mut rx) = mpsc::channel::<SubCall>(2);
        let mut gathered = Gathered::default();
        let mut retrieval_task: Option<JoinHandle<()>> = None;

        match prior {
            Some(result) => gathered.retrieval = result,
            None => {
                let retriever = Arc::clone(&self.retriever);
                let (q, i, top_k) = (query.clone(), intent.clone(), self.policy.top_k);
                let limit = self.policy.retrieval_timeout();
                let tx = tx.clone();
                retrieval_task = Some(tokio::spawn(async move {
                    let result = tokio::time::timeout(limit, retriever.retrieve(&q, &i, top_k))
                        .await
                        .ok();
                    let _ = tx.send(SubCall::Retrieval(result)).await;
                }));
            }
        }

        let grounding: Vec<KnowledgeEntry> = gathered
            .retrieval
            .as_ref()
            .map(|r| r.entries().cloned().collect())
            .unwrap_or_default();
        let request = GenerationRequest::new(query.text())
            .with_context(grounding)
            .with_history(history);
        let generator = Arc::clone(&self.generator);
        let limit = self.policy.generation_timeout();
        let mut generation_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, generator.generate(&request, limit)).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(limit)),
            };
            let _ = tx.send(SubCall::Generation(result)).await;
        }));

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(SubCall::Retrieval(result))) => {
                    retrieval_task = None;
                    if result.is_none() {
                        tracing::warn!(target: "libris::dispatch", "retrieval timed out");
                    }
                    let decisive = result
                        .as_ref()
                        .map(|r| r.top_relevance() >= self.policy.high_threshold)
                        .unwrap_or(false);
                    gathered.retrieval = result;
                    if decisive {
                        if let Some(task) = generation_task.take() {
                            task.abort();
                            self.stats.generation_cancelled();
                            tracing::debug!(
                                target: "libris::dispatch",
                                "decisive retrieval; generation cancelled"
                            );
                        }
                    }
                }
                Ok(Some(SubCall::Generation(result))) => {
                    generation_task = None;
                    match result {
                        Ok(response) if !response.text.trim().is_empty() => {
                            gathered.generation = Some(response);
                        }
                        Ok(_) => {
                            self.stats.generation_failed();
                            tracing::warn!(target: "libris::dispatch", "generator returned empty text");
                        }
                        Err(e) => {
                            self.stats.generation_failed();
                            tracing::warn!(
                                target: "libris::dispatch",
                                error = %e,
                                "generation failed; continuing with knowledge only"
                            );
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    for task in [retrieval_task.take(), generation_task.take()].into_iter().flatten() {
                        task.abort();
                    }
                    self.stats.deadline_expired();
                    tracing::warn!(
                        target: "libris::dispatch",
                        session_id = %query.session_id(),
                        deadline_ms = self.policy.turn_deadline_ms,
                        "turn deadline expired; using partial results"
                    );
                    break;
                }
            }
        }
        gathered
    }

    fn resolve(&self, intent: Intent, gathered: Gathered, clarification: &str) -> DispatchDecision {
        let policy = &self.policy;
        let top = gathered.retrieval.as_ref().and_then(|r| r.top());
        let retrieval_score = gathered.retrieval.as_ref().map(|r| r.top_relevance());
        let generation_score = gathered.generation.as_ref().map(|g| g.confidence);

        let source = choose_source(policy, top.map(|h| h.relevance), generation_score);
        let decision = match (source, top, gathered.generation.as_ref()) {
            (Source::Knowledge, Some(hit), _) => {
                let floor = policy.min_threshold.min(hit.relevance);
                let entries = gathered
                    .retrieval
                    .as_ref()
                    .map(|r| {
                        r.hits()
                            .iter()
                            .filter(|h| h.relevance >= floor && !h.entry.text.trim().is_empty())
                            .map(|h| h.entry.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                DispatchDecision::new(Source::Knowledge, hit.entry.text.trim(), intent)
                    .with_entries(entries)
            }
            (Source::Blended, Some(hit), Some(generated)) => DispatchDecision::new(
                Source::Blended,
                blend(&generated.text, &hit.entry.text, policy.snippet_chars),
                intent,
            )
            .with_entries(vec![hit.entry.clone()]),
            (Source::Generative, _, Some(generated)) => {
                DispatchDecision::new(Source::Generative, generated.text.trim(), intent)
            }
            _ => DispatchDecision::new(Source::Clarification, clarification, intent),
        };
        decision.with_scores(retrieval_score, generation_score)
    }
}
