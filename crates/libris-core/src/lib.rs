//! libris-core: bookstore assistant core library (shared types, knowledge store, catalog,
//! conversation context, and the hybrid dispatcher).
//!
//! Concrete classifier, retriever and generator implementations live in `libris-skills`;
//! the gateway wires them into a [`Dispatcher`].

mod catalog;
mod context;
mod error;
mod knowledge;
mod orchestrator;
mod shared;

// Shared
pub use shared::{
    CoreConfig, DispatchPolicy, Intent, IntentLabel, Query, DEFAULT_SESSION_ID, ENTITY_AUTHOR,
    ENTITY_BESTSELLER, ENTITY_GENRE, ENTITY_MOOD, ENTITY_OCCASION, ENTITY_ORDER, ENTITY_TITLE, ENTITY_YEAR,
};

// Errors
pub use error::{CatalogError, DispatchError, GenerationError, KnowledgeError};

// Catalog
pub use catalog::{Book, BookCatalog};

// Knowledge Store
pub use knowledge::{
    book_entry, ingest_catalog, initialize_store_faq, KnowledgeEntry, KnowledgeIndex,
    KnowledgeStore,
};

// Conversation Context Manager
pub use context::{ContextManager, ConversationContext, Turn, TurnGuard};

// Dispatcher
pub use orchestrator::{
    blend, choose_source, snippet, Confidences, DispatchDecision, DispatchStats, Dispatcher,
    GenerationRequest, GenerationResponse, Generator, HistoryTurn, IntentClassifier,
    RetrievalResult, Retriever, ScoredEntry, Source, StatsSnapshot, BLEND_SNIPPET_PREFIX,
    SAFE_FALLBACK_MESSAGE,
};
