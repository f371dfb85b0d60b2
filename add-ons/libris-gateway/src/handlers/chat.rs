//! Chat handler: runs one dispatcher turn and shapes the decision for HTTP clients.

use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use libris_core::{Book, DispatchDecision, Intent, IntentLabel, Query, ENTITY_TITLE};
use serde::{Deserialize, Serialize};

const RECOMMENDED_BOOKS_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    #[serde(alias = "message")]
    pub(crate) text: String,
    #[serde(default, alias = "user_id")]
    pub(crate) session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    pub(crate) text: String,
    pub(crate) source: &'static str,
    pub(crate) session_id: String,
    pub(crate) intent: IntentLabel,
    pub(crate) confidence: f32,
    pub(crate) recommended_books: Vec<Book>,
}

/// Catalog books behind the chosen knowledge entries. Recommendation turns without any
/// grounding book fall back to the recommendation engine. A title named in a recommendation
/// request is the book the user already knows and is never suggested back.
fn recommended_books(state: &AppState, decision: &DispatchDecision) -> Vec<Book> {
    let catalog = state.recommender.catalog();
    let known = match decision.intent.label {
        IntentLabel::Recommendation => decision
            .intent
            .entity(ENTITY_TITLE)
            .and_then(|t| catalog.find_by_title(t))
            .map(|b| b.id),
        _ => None,
    };
    let books: Vec<Book> = decision
        .chosen_entries
        .iter()
        .filter_map(|e| e.key.as_deref())
        .filter_map(|key| catalog.by_knowledge_key(key))
        .filter(|b| Some(b.id) != known)
        .take(RECOMMENDED_BOOKS_LIMIT)
        .cloned()
        .collect();
    if books.is_empty() && decision.intent.label == IntentLabel::Recommendation {
        return state
            .recommender
            .for_intent(&decision.intent, RECOMMENDED_BOOKS_LIMIT);
    }
    books
}

/// POST /chat and /api/v1/chat.
pub(crate) async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::info!(
        target: "libris::gateway",
        session_id = %session_id,
        chars = req.text.chars().count(),
        "chat request received"
    );

    match state.dispatcher.dispatch(Query::new(req.text, session_id.clone())).await {
        Ok(decision) => {
            let body = ChatResponse {
                recommended_books: recommended_books(&state, &decision),
                source: decision.source.as_str(),
                session_id,
                intent: decision.intent.label,
                confidence: decision.confidences.intent,
                text: decision.final_text,
            };
            Json(body).into_response()
        }
        Err(e) => {
            tracing::error!(target: "libris::gateway", session_id = %session_id, error = %e, "chat turn aborted");
            let fallback = DispatchDecision::fallback(Intent::unknown());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "text": fallback.final_text,
                    "source": fallback.source.as_str(),
                    "session_id": session_id,
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
