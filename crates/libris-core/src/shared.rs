//! Shared types used across all Libris crates.

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Session id used when a caller does not supply one.
pub const DEFAULT_SESSION_ID: &str = "anonymous";

/// Entity keys extracted by the intent classifier.
pub const ENTITY_GENRE: &str = "genre";
pub const ENTITY_AUTHOR: &str = "author";
pub const ENTITY_TITLE: &str = "title";
pub const ENTITY_YEAR: &str = "year";
pub const ENTITY_MOOD: &str = "mood";
pub const ENTITY_OCCASION: &str = "occasion";
pub const ENTITY_ORDER: &str = "order";
/// `"true"` for best-sellers, `"false"` for lesser-known titles.
pub const ENTITY_BESTSELLER: &str = "bestseller";

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A single user query. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    session_id: String,
    timestamp_ms: i64,
}

impl Query {
    /// Creates a query stamped with the current time. An empty session id maps to
    /// [`DEFAULT_SESSION_ID`].
    pub fn new(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            text: text.into(),
            session_id: if session_id.trim().is_empty() {
                DEFAULT_SESSION_ID.to_string()
            } else {
                session_id
            },
            timestamp_ms: now_ms(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Coarse intent taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    CatalogLookup,
    Recommendation,
    OrderStatus,
    Smalltalk,
    Unknown,
}

impl IntentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatalogLookup => "catalog_lookup",
            Self::Recommendation => "recommendation",
            Self::OrderStatus => "order_status",
            Self::Smalltalk => "smalltalk",
            Self::Unknown => "unknown",
        }
    }

    /// Intents answered from the knowledge store before any generation is attempted.
    #[inline]
    pub fn is_knowledge_first(&self) -> bool {
        matches!(self, Self::CatalogLookup | Self::OrderStatus)
    }
}

/// Classified intent of one query. Not persisted beyond the turn except as part of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub label: IntentLabel,
    /// In [0, 1].
    pub confidence: f32,
    /// Extracted entities keyed by the `ENTITY_*` constants.
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
}

impl Intent {
    pub fn new(label: IntentLabel, confidence: f32) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            entities: BTreeMap::new(),
        }
    }

    /// Safe default when nothing matched.
    pub fn unknown() -> Self {
        Self::new(IntentLabel::Unknown, 0.0)
    }

    pub fn with_entity(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entities.insert(key.to_string(), value.into());
        self
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }
}

fn default_high_threshold() -> f32 {
    0.85
}
fn default_min_threshold() -> f32 {
    0.4
}
fn default_low_threshold() -> f32 {
    0.2
}
fn default_min_relevance() -> f32 {
    0.1
}
fn default_top_k() -> usize {
    5
}
fn default_retrieval_timeout_ms() -> u64 {
    300
}
fn default_generation_timeout_ms() -> u64 {
    4_000
}
fn default_turn_deadline_ms() -> u64 {
    5_000
}
fn default_session_ttl_secs() -> u64 {
    1_800
}
fn default_max_turns() -> usize {
    20
}
fn default_history_window() -> usize {
    4
}
fn default_snippet_chars() -> usize {
    240
}
fn default_clarification_template() -> Option<String> {
    Some(
        "I'm not sure I understood. Could you tell me a bit more? You can ask about a genre, \
         an author, a title, your order, or how you're feeling and I'll suggest a book."
            .to_string(),
    )
}

/// Routing thresholds, limits and time budgets consumed by the dispatcher.
/// Read-only for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPolicy {
    /// T_high: retrieval relevance that wins outright.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f32,
    /// T_min: minimum acceptance for any single source.
    #[serde(default = "default_min_threshold")]
    pub min_threshold: f32,
    /// T_low: minimum relevance for a knowledge snippet in a blended answer.
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f32,
    /// Entries below this relevance are never returned by the retriever.
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,
    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,
    /// Wall-clock budget of a whole dispatch.
    #[serde(default = "default_turn_deadline_ms")]
    pub turn_deadline_ms: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Number of prior turns handed to the generator.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Maximum characters of a knowledge snippet in blended answers.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_clarification_template")]
    pub clarification_template: Option<String>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            high_threshold: default_high_threshold(),
            min_threshold: default_min_threshold(),
            low_threshold: default_low_threshold(),
            min_relevance: default_min_relevance(),
            top_k: default_top_k(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            generation_timeout_ms: default_generation_timeout_ms(),
            turn_deadline_ms: default_turn_deadline_ms(),
            session_ttl_secs: default_session_ttl_secs(),
            max_turns: default_max_turns(),
            history_window: default_history_window(),
            snippet_chars: default_snippet_chars(),
            clarification_template: default_clarification_template(),
        }
    }
}

impl DispatchPolicy {
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn turn_deadline(&self) -> Duration {
        Duration::from_millis(self.turn_deadline_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// The clarification text, or a fatal configuration error when it is missing.
    pub fn clarification_text(&self) -> Result<&str, DispatchError> {
        self.clarification_template
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DispatchError::FatalConfiguration("clarification template is missing".into())
            })
    }

    /// Full startup check: limits plus the clarification template.
    pub fn validate(&self) -> Result<(), DispatchError> {
        self.validate_limits()?;
        self.clarification_text()?;
        Ok(())
    }

    /// Checks threshold ordering and limits. Any violation is a deployment defect.
    pub fn validate_limits(&self) -> Result<(), DispatchError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        let thresholds = [
            ("high_threshold", self.high_threshold),
            ("min_threshold", self.min_threshold),
            ("low_threshold", self.low_threshold),
            ("min_relevance", self.min_relevance),
        ];
        for (name, value) in thresholds {
            if !in_unit(value) {
                return Err(DispatchError::FatalConfiguration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(self.low_threshold <= self.min_threshold && self.min_threshold <= self.high_threshold) {
            return Err(DispatchError::FatalConfiguration(format!(
                "thresholds must satisfy low <= min <= high (got {} / {} / {})",
                self.low_threshold, self.min_threshold, self.high_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(DispatchError::FatalConfiguration("top_k must be at least 1".into()));
        }
        if self.max_turns == 0 {
            return Err(DispatchError::FatalConfiguration("max_turns must be at least 1".into()));
        }
        if self.turn_deadline_ms == 0 {
            return Err(DispatchError::FatalConfiguration(
                "turn_deadline_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Global application configuration (gateway + dispatch policy). Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity shown by the gateway.
    pub app_name: String,
    /// Interface the gateway binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for the sled knowledge DB.
    pub storage_path: String,
    /// JSON file with the book catalog (`{"books": [...]}`).
    pub catalog_path: String,
    /// Generator backend: "mock" or "openai".
    pub llm_mode: String,
    #[serde(default)]
    pub llm_api_url: Option<String>,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default)]
    pub dispatch: DispatchPolicy,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("LIBRIS")
        .prefix_separator("_")
        .separator("__")
}

impl CoreConfig {
    /// Load config from file and environment. Precedence: env (`LIBRIS_PORT`,
    /// `LIBRIS_DISPATCH__HIGH_THRESHOLD`, ...) > `LIBRIS_CONFIG` path (default
    /// `config/gateway.toml`) > defaults. The bind address and dispatch policy are validated.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("LIBRIS_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        Self::load_with(Path::new(&config_path), environment())
    }

    fn load_with(path: &Path, env: config::Environment) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("app_name", "Libris Bookstore Assistant")?
            .set_default("host", default_host())?
            .set_default("port", 8000_i64)?
            .set_default("storage_path", "./data")?
            .set_default("catalog_path", "data/books.json")?
            .set_default("llm_mode", "mock")?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder.add_source(env).build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.bind_addr()
            .map_err(|e| config::ConfigError::Message(format!("invalid host {:?}: {}", cfg.host, e)))?;
        cfg.dispatch
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Socket address the gateway listens on.
    pub fn bind_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.host.trim().parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
