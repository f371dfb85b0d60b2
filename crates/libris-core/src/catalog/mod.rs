//! Book catalog loaded from a JSON file (`{"books": [...]}`).

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: u32,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub year: i32,
    pub bestseller: bool,
    pub description: String,
    pub rating: f32,
}

impl Book {
    /// Lookup key used for this book in the knowledge store.
    pub fn knowledge_key(&self) -> String {
        format!("book/{}", self.id)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    books: Vec<Book>,
}

/// In-memory catalog, read-only after load.
#[derive(Debug, Clone, Default)]
pub struct BookCatalog {
    books: Vec<Book>,
}

impl BookCatalog {
    pub fn from_books(books: Vec<Book>) -> Self {
        Self { books }
    }

    /// Loads the catalog file. A missing file yields an empty catalog.
    pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    target: "libris::catalog",
                    path = %path.display(),
                    "catalog file not found; starting with an empty catalog"
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let file: CatalogFile = serde_json::from_str(&raw)?;
        tracing::info!(target: "libris::catalog", books = file.books.len(), "catalog loaded");
        Ok(Self { books: file.books })
    }

    pub fn all(&self) -> &[Book] {
        &self.books
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn by_id(&self, id: u32) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    /// Exact genre match, case-insensitive.
    pub fn by_genre(&self, genre: &str) -> Vec<&Book> {
        let genre = genre.to_lowercase();
        self.books
            .iter()
            .filter(|b| b.genre.to_lowercase() == genre)
            .collect()
    }

    /// Books whose author contains `author`, case-insensitive.
    pub fn by_author(&self, author: &str) -> Vec<&Book> {
        let author = author.to_lowercase();
        self.books
            .iter()
            .filter(|b| b.author.to_lowercase().contains(&author))
            .collect()
    }

    pub fn by_year(&self, year: i32) -> Vec<&Book> {
        self.books.iter().filter(|b| b.year == year).collect()
    }

    pub fn bestsellers(&self, is_bestseller: bool) -> Vec<&Book> {
        self.books
            .iter()
            .filter(|b| b.bestseller == is_bestseller)
            .collect()
    }

    /// First book whose title contains `title`, case-insensitive.
    pub fn find_by_title(&self, title: &str) -> Option<&Book> {
        let title = title.to_lowercase();
        self.books
            .iter()
            .find(|b| b.title.to_lowercase().contains(&title))
    }

    /// Resolves a knowledge key of the form `book/{id}`.
    pub fn by_knowledge_key(&self, key: &str) -> Option<&Book> {
        key.strip_prefix("book/")
            .and_then(|id| id.parse::<u32>().ok())
            .and_then(|id| self.by_id(id))
    }
}
