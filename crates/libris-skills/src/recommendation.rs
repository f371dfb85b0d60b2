//! Recommendation engine over the book catalog.
//!
//! Every strategy returns books ordered by rating (highest first), truncated to `limit`.

use crate::lexicon::{mood_genre, NEGATIVE_MOODS, RELAXING_OCCASIONS};
use libris_core::{
    Book, BookCatalog, Intent, ENTITY_AUTHOR, ENTITY_BESTSELLER, ENTITY_GENRE, ENTITY_MOOD,
    ENTITY_OCCASION, ENTITY_TITLE, ENTITY_YEAR,
};
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_LIMIT: usize = 5;
const DEFAULT_GENRE: &str = "Romance";
const NEGATIVE_MOOD_MIN_RATING: f32 = 4.0;
const RELAXING_MIN_RATING: f32 = 3.5;

/// Query string of `GET /books/recommend`. The first populated criterion wins, in field order.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RecommendationQuery {
    pub similar_to: Option<String>,
    pub genre: Option<String>,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub bestseller: Option<bool>,
    pub mood: Option<String>,
    pub occasion: Option<String>,
    pub limit: Option<usize>,
}

fn top_rated(mut books: Vec<&Book>, limit: usize) -> Vec<Book> {
    books.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    books.into_iter().take(limit).cloned().collect()
}

pub struct RecommendationEngine {
    catalog: Arc<BookCatalog>,
}

impl RecommendationEngine {
    pub fn new(catalog: Arc<BookCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &BookCatalog {
        &self.catalog
    }

    pub fn by_genre(&self, genre: &str, limit: usize) -> Vec<Book> {
        top_rated(self.catalog.by_genre(genre), limit)
    }

    pub fn by_author(&self, author: &str, limit: usize) -> Vec<Book> {
        top_rated(self.catalog.by_author(author), limit)
    }

    pub fn by_year(&self, year: i32, limit: usize) -> Vec<Book> {
        top_rated(self.catalog.by_year(year), limit)
    }

    pub fn bestsellers(&self, is_bestseller: bool, limit: usize) -> Vec<Book> {
        top_rated(self.catalog.bestsellers(is_bestseller), limit)
    }

    /// Same-genre books other than `title` itself. Among equal ratings the book most
    /// similar to the target comes first, so the same author wins. Unknown titles yield nothing.
    pub fn similar_to(&self, title: &str, limit: usize) -> Vec<Book> {
        let Some(target) = self.catalog.find_by_title(title) else {
            return Vec::new();
        };
        let mut books: Vec<(&Book, f32)> = self
            .catalog
            .by_genre(&target.genre)
            .into_iter()
            .filter(|b| b.id != target.id)
            .map(|b| (b, calculate_similarity(target, b)))
            .collect();
        books.sort_by(|(a, sa), (b, sb)| b.rating.total_cmp(&a.rating).then(sb.total_cmp(sa)));
        books.into_iter().take(limit).map(|(b, _)| b.clone()).collect()
    }

    /// Books for a mood. Negative moods only get well-rated books.
    pub fn by_mood(&self, mood: &str, target_genre: Option<&str>, limit: usize) -> Vec<Book> {
        let mood = mood.trim().to_lowercase();
        let genre = target_genre
            .or_else(|| mood_genre(&mood))
            .unwrap_or(DEFAULT_GENRE);
        let mut books = self.catalog.by_genre(genre);
        if NEGATIVE_MOODS.contains(&mood.as_str()) {
            books.retain(|b| b.rating >= NEGATIVE_MOOD_MIN_RATING);
        }
        top_rated(books, limit)
    }

    /// Books for an occasion. Relaxing occasions skip poorly rated books.
    pub fn by_occasion(&self, occasion: &str, target_genre: Option<&str>, limit: usize) -> Vec<Book> {
        let occasion = occasion.trim().to_lowercase();
        let mut books = self.catalog.by_genre(target_genre.unwrap_or(DEFAULT_GENRE));
        if RELAXING_OCCASIONS.contains(&occasion.as_str()) {
            books.retain(|b| b.rating >= RELAXING_MIN_RATING);
        }
        top_rated(books, limit)
    }

    pub fn recommend(&self, query: &RecommendationQuery) -> Vec<Book> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
        if let Some(title) = &query.similar_to {
            return self.similar_to(title, limit);
        }
        if let Some(genre) = &query.genre {
            return self.by_genre(genre, limit);
        }
        if let Some(author) = &query.author {
            return self.by_author(author, limit);
        }
        if let Some(year) = query.year {
            return self.by_year(year, limit);
        }
        if let Some(bestseller) = query.bestseller {
            return self.bestsellers(bestseller, limit);
        }
        if let Some(mood) = &query.mood {
            return self.by_mood(mood, None, limit);
        }
        if let Some(occasion) = &query.occasion {
            return self.by_occasion(occasion, None, limit);
        }
        top_rated(self.catalog.all().iter().collect(), limit)
    }

    /// Books suggested by the entities of a classified intent. Criteria are tried from most
    /// to least specific; the first that yields books wins.
    pub fn for_intent(&self, intent: &Intent, limit: usize) -> Vec<Book> {
        let genre = intent.entity(ENTITY_GENRE);
        let candidates = [
            intent.entity(ENTITY_TITLE).map(|t| self.similar_to(t, limit)),
            intent.entity(ENTITY_AUTHOR).map(|a| self.by_author(a, limit)),
            intent.entity(ENTITY_MOOD).map(|m| self.by_mood(m, genre, limit)),
            intent.entity(ENTITY_OCCASION).map(|o| self.by_occasion(o, genre, limit)),
            genre.map(|g| self.by_genre(g, limit)),
            intent
                .entity(ENTITY_YEAR)
                .and_then(|y| y.parse().ok())
                .map(|y| self.by_year(y, limit)),
            intent
                .entity(ENTITY_BESTSELLER)
                .map(|b| self.bestsellers(b == "true", limit)),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|books| !books.is_empty())
            .unwrap_or_default()
    }
}

/// Similarity of two books in [0, 1]: genre 0.4, author 0.3, rating closeness 0.2,
/// publication-year closeness 0.1.
pub fn calculate_similarity(a: &Book, b: &Book) -> f32 {
    let mut similarity = 0.0;
    if a.genre == b.genre {
        similarity += 0.4;
    }
    if a.author == b.author {
        similarity += 0.3;
    }
    let rating = (1.0 - (a.rating - b.rating).abs() / 5.0).max(0.0);
    similarity += 0.2 * rating;
    let years = (1.0 - (a.year - b.year).abs() as f32 / 50.0).max(0.0);
    similarity += 0.1 * years;
    similarity
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_core::IntentLabel;

    fn book(id: u32, title: &str, author: &str, genre: &str, year: i32, rating: f32, bestseller: bool) -> Book {
        Book {
            id,
            title: title.into(),
            author: author.into(),
            genre: genre.into(),
            year,
            bestseller,
            description: String::new(),
            rating,
        }
    }

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(Arc::new(BookCatalog::from_books(vec![
            book(1, "The Shining", "Stephen King", "Horror", 1977, 4.5, true),
            book(2, "It", "Stephen King", "Horror", 1986, 4.6, true),
            book(3, "Dracula", "Bram Stoker", "Horror", 1897, 4.5, false),
            book(4, "Pride and Prejudice", "Jane Austen", "Romance", 1813, 4.8, true),
            book(5, "Me Before You", "Jojo Moyes", "Romance", 2012, 4.2, true),
            book(6, "Forgettable Love", "Nobody", "Romance", 2001, 3.1, false),
            book(7, "Dune", "Frank Herbert", "Science Fiction", 1965, 4.7, true),
        ])))
    }

    fn ids(books: &[Book]) -> Vec<u32> {
        books.iter().map(|b| b.id).collect()
    }

    #[test]
    fn genre_results_are_ordered_by_rating_and_limited() {
        let e = engine();
        assert_eq!(ids(&e.by_genre("horror", 5)), vec![2, 1, 3]);
        assert_eq!(ids(&e.by_genre("Horror", 1)), vec![2]);
        assert!(e.by_genre("Poetry", 5).is_empty());
    }

    #[test]
    fn similar_books_exclude_the_title_and_prefer_the_author() {
        let e = engine();
        assert_eq!(ids(&e.similar_to("the shining", 5)), vec![2, 3]);
        assert_eq!(ids(&e.similar_to("Dracula", 5)), vec![2, 1]);
        assert!(e.similar_to("No Such Book", 5).is_empty());
    }

    #[test]
    fn rating_ties_go_to_the_closest_book() {
        let e = RecommendationEngine::new(Arc::new(BookCatalog::from_books(vec![
            book(1, "Target", "X", "Mystery", 1975, 4.0, false),
            book(2, "Old One", "Y", "Mystery", 1900, 4.2, false),
            book(3, "Near One", "Z", "Mystery", 1970, 4.2, false),
            book(4, "Same Pen", "X", "Mystery", 1900, 4.2, false),
        ])));
        assert_eq!(ids(&e.similar_to("target", 5)), vec![4, 3, 2]);
    }

    #[test]
    fn negative_moods_only_get_well_rated_books() {
        let e = engine();
        assert_eq!(ids(&e.by_mood("sad", None, 5)), vec![4, 5]);
        assert_eq!(ids(&e.by_mood("smile", None, 5)), vec![4, 5, 6]);
        assert_eq!(ids(&e.by_mood("dark", None, 5)), vec![2, 1, 3]);
    }

    #[test]
    fn relaxing_occasions_skip_low_ratings() {
        let e = engine();
        assert_eq!(ids(&e.by_occasion("beach", None, 5)), vec![4, 5]);
        assert_eq!(ids(&e.by_occasion("bedtime", None, 5)), vec![4, 5, 6]);
    }

    #[test]
    fn query_picks_the_first_populated_criterion() {
        let e = engine();
        let q = RecommendationQuery {
            author: Some("king".into()),
            bestseller: Some(false),
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(ids(&e.recommend(&q)), vec![2]);
        let q = RecommendationQuery {
            bestseller: Some(false),
            ..Default::default()
        };
        assert_eq!(ids(&e.recommend(&q)), vec![3, 6]);
        assert_eq!(ids(&e.recommend(&RecommendationQuery::default())), vec![4, 7, 2, 1, 3]);
    }

    #[test]
    fn intent_entities_drive_recommendations() {
        let e = engine();
        let intent = Intent::new(IntentLabel::Recommendation, 0.8)
            .with_entity(ENTITY_MOOD, "sad")
            .with_entity(ENTITY_GENRE, "Romance");
        assert_eq!(ids(&e.for_intent(&intent, 5)), vec![4, 5]);

        let intent = Intent::new(IntentLabel::Recommendation, 0.8).with_entity(ENTITY_AUTHOR, "stephen king");
        assert_eq!(ids(&e.for_intent(&intent, 5)), vec![2, 1]);

        let intent = Intent::new(IntentLabel::Recommendation, 0.8).with_entity(ENTITY_YEAR, "1965");
        assert_eq!(ids(&e.for_intent(&intent, 5)), vec![7]);

        assert!(e.for_intent(&Intent::unknown(), 5).is_empty());
    }

    #[test]
    fn similarity_weights() {
        let a = book(1, "A", "X", "Horror", 2000, 4.0, true);
        assert!((calculate_similarity(&a, &a) - 1.0).abs() < 1e-6);
        let b = book(2, "B", "Y", "Romance", 1900, 4.0, true);
        assert!((calculate_similarity(&a, &b) - 0.2).abs() < 1e-6);
    }
}
