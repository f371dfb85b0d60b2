//! Conversation Context Manager: short-lived per-session state.
//!
//! Each session owns one [`ConversationContext`] behind an async mutex. A dispatch holds the
//! session lock from [`ContextManager::begin_turn`] until the turn is appended, so a second
//! query for the same session cannot start before the previous append completes. The mutex
//! is FIFO, which keeps turns in issue order. Different sessions never contend.

use crate::orchestrator::{DispatchDecision, Source};
use crate::shared::Query;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// One completed exchange.
#[derive(Debug, Clone)]
pub struct Turn {
    pub query: Query,
    pub decision: DispatchDecision,
}

/// Ordered, bounded history of one session plus its unresolved clarification.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    session_id: String,
    turns: VecDeque<Turn>,
    pending_clarification: Option<Query>,
    last_active: Instant,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: VecDeque::new(),
            pending_clarification: None,
            last_active: Instant::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Turns, oldest first.
    pub fn turns(&self) -> impl DoubleEndedIterator<Item = &Turn> + ExactSizeIterator {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Up to `n` most recent turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).collect()
    }

    /// The query that was last answered with a clarification, until a later turn resolves it.
    pub fn pending_clarification(&self) -> Option<&Query> {
        self.pending_clarification.as_ref()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_active.elapsed() >= ttl
    }

    fn push(&mut self, query: Query, decision: DispatchDecision, max_turns: usize) {
        self.pending_clarification = if decision.source == Source::Clarification {
            Some(query.clone())
        } else {
            None
        };
        self.turns.push_back(Turn { query, decision });
        while self.turns.len() > max_turns {
            self.turns.pop_front();
        }
        self.last_active = Instant::now();
    }
}

type SessionSlot = Arc<Mutex<ConversationContext>>;

/// Exclusive access to one session for the duration of a dispatch.
///
/// Dropping the guard without calling [`TurnGuard::append`] releases the session and
/// records nothing.
pub struct TurnGuard {
    context: OwnedMutexGuard<ConversationContext>,
    max_turns: usize,
}

impl TurnGuard {
    /// Snapshot the classifier and generator read from.
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Appends the completed turn and releases the session.
    pub fn append(mut self, query: Query, decision: DispatchDecision) {
        let max_turns = self.max_turns;
        self.context.push(query, decision, max_turns);
        tracing::debug!(
            target: "libris::context",
            session_id = %self.context.session_id(),
            turns = self.context.len(),
            "turn appended"
        );
    }
}

/// Keyed store `session_id -> ConversationContext`, the only owner of session state.
pub struct ContextManager {
    sessions: DashMap<String, SessionSlot>,
    max_turns: usize,
    ttl: Duration,
}

impl ContextManager {
    pub fn new(max_turns: usize, ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_turns: max_turns.max(1),
            ttl,
        }
    }

    fn slot(&self, session_id: &str) -> SessionSlot {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationContext::new(session_id))))
            .clone()
    }

    /// Locks the session, creating it (or replacing an expired one) transparently.
    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<ConversationContext> {
        loop {
            let slot = self.slot(session_id);
            let mut guard = Arc::clone(&slot).lock_owned().await;
            // A purge may have dropped this slot while we waited; retry on the live one.
            let still_current = self
                .sessions
                .get(session_id)
                .map(|s| Arc::ptr_eq(s.value(), &slot))
                .unwrap_or(false);
            if !still_current {
                continue;
            }
            if guard.is_expired(self.ttl) && !guard.is_empty() {
                tracing::debug!(
                    target: "libris::context",
                    session_id = %session_id,
                    "session expired; starting a fresh context"
                );
                *guard = ConversationContext::new(session_id);
            }
            return guard;
        }
    }

    /// Starts a turn: waits for any in-flight turn of the same session to finish.
    pub async fn begin_turn(&self, session_id: &str) -> TurnGuard {
        TurnGuard {
            context: self.lock_session(session_id).await,
            max_turns: self.max_turns,
        }
    }

    /// Snapshot of a session's context (fresh and empty when unknown or expired).
    pub async fn get(&self, session_id: &str) -> ConversationContext {
        if !self.sessions.contains_key(session_id) {
            return ConversationContext::new(session_id);
        }
        self.lock_session(session_id).await.clone()
    }

    /// Appends a completed turn outside of a [`TurnGuard`].
    pub async fn append(&self, session_id: &str, query: Query, decision: DispatchDecision) {
        self.begin_turn(session_id).await.append(query, decision);
    }

    /// Drops idle sessions past their TTL. Sessions with a turn in flight are kept.
    /// Returns the number of sessions removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions.retain(|_, slot| {
            slot.try_lock()
                .map(|ctx| !ctx.is_expired(ttl))
                .unwrap_or(true)
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::info!(target: "libris::context", removed, "expired sessions purged");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}
