//! Sled-backed knowledge store and its immutable in-memory snapshot.
//!
//! Entries live in one tree keyed by a monotonic big-endian id, so iterating the tree
//! yields insertion order. A second tree maps lookup keys to ids; re-ingesting an entry
//! with an existing lookup key replaces it in place and keeps its original position.
//!
//! Ingestion happens before the dispatcher starts. Request-time reads go through
//! [`KnowledgeIndex`], which is read-only and shared without locking.

use crate::error::KnowledgeError;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const ENTRIES_TREE: &str = "entries";
const KEYS_TREE: &str = "lookup_keys";

/// One curated fact, FAQ answer or catalog snippet. Immutable after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Optional exact-lookup key (e.g. `faq/returns`, `book/12`, `order/1042`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl KnowledgeEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            tags: BTreeSet::new(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Adds tags, lower-cased.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags
            .extend(tags.into_iter().map(|t| t.as_ref().trim().to_lowercase()));
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    fn to_bytes(&self) -> Result<Vec<u8>, KnowledgeError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, KnowledgeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Persistent store used by ingestion.
pub struct KnowledgeStore {
    db: Db,
}

impl KnowledgeStore {
    /// Opens or creates the knowledge DB at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Stores an entry. Entries with a lookup key already present replace the old entry in
    /// place; everything else is appended. Returns true when an existing entry was replaced.
    pub fn ingest(&self, entry: &KnowledgeEntry) -> Result<bool, KnowledgeError> {
        let entries = self.db.open_tree(ENTRIES_TREE)?;
        let keys = self.db.open_tree(KEYS_TREE)?;

        let existing = match entry.key.as_deref() {
            Some(k) => keys.get(k.as_bytes())?,
            None => None,
        };
        let replaced = existing.is_some();
        let seq_bytes = match existing {
            Some(seq) => seq.to_vec(),
            None => self.db.generate_id()?.to_be_bytes().to_vec(),
        };

        entries.insert(seq_bytes.as_slice(), entry.to_bytes()?)?;
        if let Some(k) = entry.key.as_deref() {
            keys.insert(k.as_bytes(), seq_bytes.as_slice())?;
        }

        tracing::debug!(
            target: "libris::knowledge",
            key = entry.key.as_deref().unwrap_or("-"),
            tags = entry.tags.len(),
            action = if replaced { "UPDATE" } else { "INSERT" },
            "knowledge entry {}",
            if replaced { "updated" } else { "inserted" }
        );
        Ok(replaced)
    }

    /// Stores many entries; returns how many were newly inserted.
    pub fn ingest_all<'a, I>(&self, entries: I) -> Result<usize, KnowledgeError>
    where
        I: IntoIterator<Item = &'a KnowledgeEntry>,
    {
        let mut inserted = 0;
        for entry in entries {
            if !self.ingest(entry)? {
                inserted += 1;
            }
        }
        self.db.flush()?;
        tracing::info!(target: "libris::knowledge", inserted, "knowledge ingestion finished");
        Ok(inserted)
    }

    /// True when an entry with this lookup key exists.
    pub fn contains_key(&self, key: &str) -> Result<bool, KnowledgeError> {
        let keys = self.db.open_tree(KEYS_TREE)?;
        Ok(keys.contains_key(key.as_bytes())?)
    }

    /// Number of stored entries.
    pub fn count(&self) -> Result<usize, KnowledgeError> {
        Ok(self.db.open_tree(ENTRIES_TREE)?.len())
    }

    /// Reads every entry in insertion order into an immutable index.
    pub fn snapshot(&self) -> Result<KnowledgeIndex, KnowledgeError> {
        let tree = self.db.open_tree(ENTRIES_TREE)?;
        let mut entries = Vec::with_capacity(tree.len());
        for item in tree.iter() {
            let (_, bytes) = item?;
            match KnowledgeEntry::from_bytes(&bytes) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(target: "libris::knowledge", error = %e, "skipping unreadable knowledge record")
                }
            }
        }
        tracing::info!(
            target: "libris::knowledge",
            entries = entries.len(),
            "knowledge snapshot taken"
        );
        Ok(KnowledgeIndex::from_entries(entries))
    }
}

/// Read-only view of the knowledge store, cheap to clone and safe to share across sessions.
#[derive(Debug, Clone)]
pub struct KnowledgeIndex {
    entries: Arc<[KnowledgeEntry]>,
    by_key: Arc<HashMap<String, usize>>,
}

impl KnowledgeIndex {
    /// Builds an index; slice order is the insertion order used for tie-breaking.
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        let by_key = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.key.clone().map(|k| (k, i)))
            .collect();
        Self {
            entries: entries.into(),
            by_key: Arc::new(by_key),
        }
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insertion position of the entry carrying an exact lookup key.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }
}

impl Default for KnowledgeIndex {
    fn default() -> Self {
        Self::from_entries(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path()).unwrap();
        let texts = ["first", "second", "third"];
        for t in texts {
            store.ingest(&KnowledgeEntry::new(t)).unwrap();
        }
        let index = store.snapshot().unwrap();
        let got: Vec<&str> = index.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(got, texts);
    }

    #[test]
    fn reingesting_a_key_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path()).unwrap();
        store
            .ingest(&KnowledgeEntry::new("old returns").with_key("faq/returns"))
            .unwrap();
        store.ingest(&KnowledgeEntry::new("shipping")).unwrap();
        let replaced = store
            .ingest(&KnowledgeEntry::new("new returns").with_key("faq/returns"))
            .unwrap();
        assert!(replaced);
        assert_eq!(store.count().unwrap(), 2);

        let index = store.snapshot().unwrap();
        assert_eq!(index.entries()[0].text, "new returns");
        assert_eq!(index.position("faq/returns"), Some(0));
        assert_eq!(index.position("faq/missing"), None);
    }

    #[test]
    fn tags_are_lowercased() {
        let entry = KnowledgeEntry::new("x").with_tags(["Policy", " Returns "]);
        assert!(entry.has_tag("policy"));
        assert!(entry.has_tag("returns"));
    }

    #[test]
    fn ingest_all_counts_only_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path()).unwrap();
        let batch = vec![
            KnowledgeEntry::new("a").with_key("k/a"),
            KnowledgeEntry::new("b").with_key("k/b"),
        ];
        assert_eq!(store.ingest_all(&batch).unwrap(), 2);
        assert_eq!(store.ingest_all(&batch).unwrap(), 0);
        assert!(store.contains_key("k/a").unwrap());
    }
}
