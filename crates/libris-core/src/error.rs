//! Error taxonomy for the dispatch core.
//!
//! `ClassificationDefault` and `RetrievalEmpty` are not errors: the classifier always
//! returns a label and the retriever returns an empty result. Only the types below exist.

use std::time::Duration;
use thiserror::Error;

/// Failure of a generative call. Handled inside the dispatcher; never reaches the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generative service unavailable: {0}")]
    Unavailable(String),
}

/// Conditions that abort a turn. Only configuration defects qualify.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("fatal configuration error: {0}")]
    FatalConfiguration(String),
}

/// Knowledge store failures (ingestion and snapshot time only).
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("knowledge storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("knowledge record is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Book catalog loading failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog file could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
