//! Concrete capabilities plugged into the dispatcher: intent classifier, lexical retriever,
//! model router (generator backends) and the catalog recommendation engine.

pub use libris_core::{Generator, IntentClassifier, Retriever};

pub mod lexicon;

mod intent_classifier;
mod knowledge_retriever;
mod model_router;
mod recommendation;

pub use intent_classifier::{classify_text, RegexIntentClassifier};
pub use knowledge_retriever::LexicalRetriever;
pub use model_router::{LlmMode, ModelRouter};
pub use recommendation::{calculate_similarity, RecommendationEngine, RecommendationQuery, DEFAULT_LIMIT};
