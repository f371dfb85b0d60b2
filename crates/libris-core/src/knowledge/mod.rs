//! Knowledge Store: curated bookstore facts, FAQs and catalog snippets.
//!
//! Populated at startup by [`initialize_store_faq`] and [`ingest_catalog`]; afterwards the
//! dispatcher only sees the immutable [`KnowledgeIndex`].

mod bootstrap;
mod store;

pub use bootstrap::{book_entry, ingest_catalog, initialize_store_faq};
pub use store::{KnowledgeEntry, KnowledgeIndex, KnowledgeStore};
