//! Catalog browsing and recommendation endpoints.

use crate::AppState;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use libris_core::Book;
use libris_skills::RecommendationQuery;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct BookList {
    pub(crate) books: Vec<Book>,
    pub(crate) total: usize,
}

impl From<Vec<Book>> for BookList {
    fn from(books: Vec<Book>) -> Self {
        Self {
            total: books.len(),
            books,
        }
    }
}

fn owned(books: Vec<&Book>) -> BookList {
    books.into_iter().cloned().collect::<Vec<_>>().into()
}

/// GET /books
pub(crate) async fn list_books(State(state): State<AppState>) -> Json<BookList> {
    Json(state.recommender.catalog().all().to_vec().into())
}

/// GET /books/:id
pub(crate) async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Book>, StatusCode> {
    state
        .recommender
        .catalog()
        .by_id(id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /books/genre/:genre
pub(crate) async fn books_by_genre(
    State(state): State<AppState>,
    Path(genre): Path<String>,
) -> Json<BookList> {
    Json(owned(state.recommender.catalog().by_genre(&genre)))
}

/// GET /books/author/:author
pub(crate) async fn books_by_author(
    State(state): State<AppState>,
    Path(author): Path<String>,
) -> Json<BookList> {
    Json(owned(state.recommender.catalog().by_author(&author)))
}

/// GET /books/recommend
pub(crate) async fn recommend(
    State(state): State<AppState>,
    Query(query): Query<RecommendationQuery>,
) -> Json<BookList> {
    tracing::debug!(target: "libris::gateway", ?query, "recommendation request");
    Json(state.recommender.recommend(&query).into())
}
