//! Model Router: the generator backend. Sends the query, its grounding entries and recent
//! history to a mock LLM or an OpenAI-compatible chat-completions endpoint.

use crate::lexicon::{is_book_term, token_set, tokenize};
use libris_core::{CoreConfig, GenerationError, GenerationRequest, GenerationResponse, Generator};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You are a friendly assistant for an online bookstore. \
Answer briefly, recommend books when asked, and never invent store policies.";

/// Generator backend selected by `llm_mode`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    #[default]
    Mock,
    OpenAi,
}

impl LlmMode {
    /// Unknown values fall back to `Mock`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "openai" | "live" => LlmMode::OpenAi,
            "mock" | "" => LlmMode::Mock,
            other => {
                tracing::warn!(target: "libris::generator", mode = other, "unknown llm_mode, using mock");
                LlmMode::Mock
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmMode::Mock => "mock",
            LlmMode::OpenAi => "openai",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
}

/// Routes a generation request to the mock LLM or a live OpenAI-compatible API.
pub struct ModelRouter {
    mode: LlmMode,
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl ModelRouter {
    pub fn with_mode(mode: LlmMode) -> Self {
        Self {
            mode,
            client: reqwest::Client::new(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Live backend against `api_url` (an OpenAI-compatible chat-completions URL).
    pub fn openai(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: Some(api_key.into()),
            model: model.into(),
            ..Self::with_mode(LlmMode::OpenAi)
        }
    }

    /// Builds the router from configuration. `openai` without an API key (in config or
    /// `OPENAI_API_KEY`) degrades to the mock backend.
    pub fn from_config(cfg: &CoreConfig) -> Self {
        match LlmMode::parse(&cfg.llm_mode) {
            LlmMode::Mock => Self::with_mode(LlmMode::Mock),
            LlmMode::OpenAi => {
                let key = cfg
                    .llm_api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .or_else(|| std::env::var(ENV_OPENAI_API_KEY).ok());
                match key {
                    Some(key) => Self::openai(
                        cfg.llm_api_url.as_deref().unwrap_or(DEFAULT_API_URL),
                        key,
                        cfg.llm_model.as_deref().unwrap_or(DEFAULT_MODEL),
                    ),
                    None => {
                        tracing::warn!(
                            target: "libris::generator",
                            "llm_mode is openai but no API key is configured, using mock"
                        );
                        Self::with_mode(LlmMode::Mock)
                    }
                }
            }
        }
    }

    pub fn mode(&self) -> LlmMode {
        self.mode
    }

    /// Mock LLM: deterministic, offline. Book-related or grounded requests get a full answer
    /// built from the query's book vocabulary; anything else gets a short low-confidence reply.
    fn mock_generate(&self, request: &GenerationRequest) -> String {
        let keywords: Vec<String> = tokenize(&request.query)
            .into_iter()
            .filter(|t| is_book_term(t))
            .fold(Vec::new(), |mut acc, t| {
                if !acc.contains(&t) {
                    acc.push(t);
                }
                acc
            });
        if keywords.is_empty() && request.context.is_empty() {
            return "Sorry, I'm not sure I can help with that one.".to_string();
        }

        let mut reply = String::new();
        if keywords.is_empty() {
            reply.push_str("Happy to help with that. ");
        } else {
            reply.push_str(&format!("Happy to help you with {}. ", keywords.join(", ")));
        }
        reply.push_str(
            "I'd look for a well-reviewed title with characters you can root for and an ending \
             that stays with you for a while.",
        );
        if !request.context.is_empty() {
            reply.push_str(" Our catalog has a few matching picks worth a look.");
        }
        if !request.history.is_empty() {
            reply.push_str(" It also fits what we talked about earlier.");
        }
        reply.push_str(" Let me know if you'd like more suggestions.");
        reply
    }

    async fn openai_complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::Unavailable("no API key configured".into()))?;

        let mut system = SYSTEM_PROMPT.to_string();
        if !request.context.is_empty() {
            system.push_str("\n\nRelevant store knowledge:");
            for entry in &request.context {
                system.push_str("\n- ");
                system.push_str(&entry.text);
            }
        }
        let mut messages = vec![ChatMessage {
            role: "system",
            content: system,
        }];
        for turn in &request.history {
            messages.push(ChatMessage {
                role: "user",
                content: turn.user.clone(),
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: turn.assistant.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.query.clone(),
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("failed to read response body: {}", e)))?;
        if !status.is_success() {
            let message = serde_json::from_str::<ChatErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(GenerationError::Unavailable(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::Unavailable(format!("malformed completion: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Unavailable("completion had no content".into()))
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::with_mode(LlmMode::Mock)
    }
}

/// Derived confidence: rewards longer replies that cover the query's content words.
fn confidence_proxy(query: &str, reply: &str) -> f32 {
    let words = reply.split_whitespace().count() as f32;
    let query_tokens = token_set(query);
    let coverage = if query_tokens.is_empty() {
        0.0
    } else {
        let reply_tokens = token_set(reply);
        query_tokens.iter().filter(|t| reply_tokens.contains(*t)).count() as f32
            / query_tokens.len() as f32
    };
    (0.25 + 0.35 * (words / 40.0).min(1.0) + 0.4 * coverage).clamp(0.0, 1.0)
}

#[async_trait::async_trait]
impl Generator for ModelRouter {
    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<GenerationResponse, GenerationError> {
        let started = Instant::now();
        let call = async {
            match self.mode {
                LlmMode::Mock => Ok(self.mock_generate(request)),
                LlmMode::OpenAi => self.openai_complete(request).await,
            }
        };
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GenerationError::Timeout(timeout)),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(text) => {
                let confidence = confidence_proxy(&request.query, &text);
                tracing::debug!(
                    target: "libris::generator",
                    mode = self.mode.as_str(),
                    latency_ms,
                    confidence,
                    "generation finished"
                );
                Ok(GenerationResponse {
                    text,
                    confidence,
                    latency_ms,
                })
            }
            Err(e) => {
                tracing::warn!(
                    target: "libris::generator",
                    mode = self.mode.as_str(),
                    latency_ms,
                    error = %e,
                    "generation failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_core::KnowledgeEntry;

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(LlmMode::parse("openai"), LlmMode::OpenAi);
        assert_eq!(LlmMode::parse(" OpenAI "), LlmMode::OpenAi);
        assert_eq!(LlmMode::parse("mock"), LlmMode::Mock);
        assert_eq!(LlmMode::parse("gemini"), LlmMode::Mock);
    }

    #[tokio::test]
    async fn mock_is_confident_about_book_questions() {
        let router = ModelRouter::with_mode(LlmMode::Mock);
        let request = GenerationRequest::new("Recommend a sad but hopeful novel");
        let response = router.generate(&request, Duration::from_secs(1)).await.unwrap();
        assert!(response.confidence >= 0.6, "confidence {}", response.confidence);
        assert!(!response.text.contains("Recommend a sad but hopeful novel"));
    }

    #[tokio::test]
    async fn mock_is_unsure_about_gibberish() {
        let router = ModelRouter::with_mode(LlmMode::Mock);
        let response = router
            .generate(&GenerationRequest::new("qwerty zxcv"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(response.confidence < 0.4, "confidence {}", response.confidence);
    }

    #[tokio::test]
    async fn grounding_context_is_acknowledged() {
        let router = ModelRouter::default();
        let request = GenerationRequest::new("anything good")
            .with_context(vec![KnowledgeEntry::new("Dune by Frank Herbert")]);
        let response = router.generate(&request, Duration::from_secs(1)).await.unwrap();
        assert!(response.text.contains("catalog"));
    }

    #[test]
    fn confidence_proxy_is_bounded() {
        assert!((confidence_proxy("", "") - 0.25).abs() < 1e-6);
        let long = "fantasy ".repeat(100);
        assert!((confidence_proxy("fantasy", &long) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn openai_backend_parses_completions() {
        use axum::{routing::post, Json};
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["messages"][0]["role"], "system");
                Json(serde_json::json!({
                    "choices": [{ "message": { "content": "Try The Hobbit, a cosy fantasy classic." } }]
                }))
            }),
        );
        let url = serve(app).await;
        let router = ModelRouter::openai(url, "k", "test-model");
        let response = router
            .generate(&GenerationRequest::new("a fantasy book"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.text, "Try The Hobbit, a cosy fantasy classic.");
        assert!(response.confidence > 0.25);
    }

    #[tokio::test]
    async fn openai_error_status_is_unavailable() {
        use axum::{http::StatusCode, routing::post, Json};
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({ "error": { "message": "rate limited" } })),
                )
            }),
        );
        let url = serve(app).await;
        let router = ModelRouter::openai(url, "k", "m");
        let err = router
            .generate(&GenerationRequest::new("hi"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Unavailable("HTTP 429: rate limited".into()));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        use axum::{routing::post, Json};
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({ "choices": [] }))
            }),
        );
        let url = serve(app).await;
        let router = ModelRouter::openai(url, "k", "m");
        let timeout = Duration::from_millis(50);
        let err = router
            .generate(&GenerationRequest::new("hi"), timeout)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout(timeout));
    }
}
