//! Startup ingestion: baseline store FAQs and catalog snippets.

use super::store::{KnowledgeEntry, KnowledgeStore};
use crate::catalog::{Book, BookCatalog};
use crate::error::KnowledgeError;

/// Marker key; when present the FAQ set is considered installed.
const FAQ_MARKER_KEY: &str = "faq/returns";

fn baseline_faq() -> Vec<KnowledgeEntry> {
    vec![
        KnowledgeEntry::new(
            "Return policy: books can be returned within 30 days of delivery for a full refund \
             as long as they are in their original condition. Start a return from the order page; \
             return shipping is free for damaged or incorrect items.",
        )
        .with_key(FAQ_MARKER_KEY)
        .with_tags(["faq", "policy", "return", "refund"]),
        KnowledgeEntry::new(
            "Shipping policy: orders ship within 2 business days. Standard delivery takes 5 to 8 \
             business days and express delivery 1 to 2 business days. Shipping is free on orders \
             over $50.",
        )
        .with_key("faq/shipping")
        .with_tags(["faq", "policy", "shipping", "delivery"]),
        KnowledgeEntry::new(
            "Payment: we accept credit and debit cards, PayPal and store gift cards. Payment is \
             charged when the order ships.",
        )
        .with_key("faq/payment")
        .with_tags(["faq", "payment", "card"]),
        KnowledgeEntry::new(
            "Order status: open 'My orders' to see the status of every order. A tracking number \
             is emailed as soon as the package ships; tell me your order number and I can look it up.",
        )
        .with_key("faq/order-tracking")
        .with_tags(["faq", "order", "tracking", "status"]),
        KnowledgeEntry::new(
            "Customer support hours: our team answers chat and email from 9am to 6pm, Monday to \
             Saturday. The online store is open around the clock.",
        )
        .with_key("faq/hours")
        .with_tags(["faq", "support", "hours", "contact"]),
        KnowledgeEntry::new(
            "Gift cards: digital gift cards from $10 to $200 are delivered by email and never \
             expire. They can be combined with any other payment method.",
        )
        .with_key("faq/gift-cards")
        .with_tags(["faq", "gift", "card"]),
        KnowledgeEntry::new(
            "Hello! I'm the bookstore assistant. Ask me for recommendations by genre, author or \
             mood, look up a title, or check on an order.",
        )
        .with_key("smalltalk/greeting")
        .with_tags(["smalltalk", "greeting", "hello", "hi"]),
        KnowledgeEntry::new("You're welcome! Happy reading, and come back any time you need a new book.")
            .with_key("smalltalk/thanks")
            .with_tags(["smalltalk", "thanks", "thank"]),
    ]
}

/// Installs the baseline FAQ entries if the store does not hold them yet.
/// Returns `Ok(true)` when entries were written.
pub fn initialize_store_faq(store: &KnowledgeStore) -> Result<bool, KnowledgeError> {
    if store.contains_key(FAQ_MARKER_KEY)? {
        return Ok(false);
    }
    let faq = baseline_faq();
    store.ingest_all(&faq)?;
    Ok(true)
}

/// Builds the knowledge entry describing one book.
pub fn book_entry(book: &Book) -> KnowledgeEntry {
    let text = format!(
        "{} by {} ({}, {}, rated {:.1}/5). {}",
        book.title, book.author, book.year, book.genre, book.rating, book.description
    );
    let mut tags = vec![
        "catalog".to_string(),
        "book".to_string(),
        book.genre.to_lowercase(),
        book.author.to_lowercase(),
        format!("genre:{}", book.genre.to_lowercase()),
        format!("author:{}", book.author.to_lowercase()),
        format!("title:{}", book.title.to_lowercase()),
        book.year.to_string(),
    ];
    if book.bestseller {
        tags.push("bestseller".to_string());
    }
    KnowledgeEntry::new(text)
        .with_key(book.knowledge_key())
        .with_tags(tags)
}

/// Ingests (or refreshes) one entry per catalog book. Returns the number of new entries.
pub fn ingest_catalog(store: &KnowledgeStore, catalog: &BookCatalog) -> Result<usize, KnowledgeError> {
    let entries: Vec<KnowledgeEntry> = catalog.all().iter().map(book_entry).collect();
    store.ingest_all(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::book;

    #[test]
    fn faq_is_installed_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path()).unwrap();
        assert!(initialize_store_faq(&store).unwrap());
        let n = store.count().unwrap();
        assert!(!initialize_store_faq(&store).unwrap());
        assert_eq!(store.count().unwrap(), n);
    }

    #[test]
    fn catalog_entries_carry_lookup_key_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path()).unwrap();
        let catalog = BookCatalog::from_books(vec![book(4, "Dune", "Frank Herbert", "Science Fiction", 1965, 4.7)]);
        assert_eq!(ingest_catalog(&store, &catalog).unwrap(), 1);
        assert_eq!(ingest_catalog(&store, &catalog).unwrap(), 0);

        let index = store.snapshot().unwrap();
        let entry = &index.entries()[index.position("book/4").unwrap()];
        assert!(entry.has_tag("science fiction"));
        assert!(entry.has_tag("title:dune"));
        assert!(entry.has_tag("genre:science fiction"));
        assert!(entry.has_tag("author:frank herbert"));
        assert!(entry.has_tag("bestseller"));
        assert!(entry.text.starts_with("Dune by Frank Herbert"));
    }
}
