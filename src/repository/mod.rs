//! Repository layer: the Entity Store behind a single trait.
//!
//! `postgres` is the production adapter; `memory` keeps everything in
//! process and is used for development and tests. Both enforce ISBN
//! uniqueness and author-reference integrity themselves, so the checks in
//! the service layer are only a fast path.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Author, AuthorInput, AuthorPatch, AuthorQuery, Book, BookPatch, BookQuery, NewBook},
};

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Persistence operations for authors, books and their association
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Cheap connectivity check
    async fn ping(&self) -> AppResult<()>;

    /// Filtered, searched and ordered authors with `book_count`
    async fn authors_list(&self, query: &AuthorQuery) -> AppResult<Vec<Author>>;

    async fn authors_get(&self, id: Uuid) -> AppResult<Author>;

    async fn authors_create(&self, data: &AuthorInput) -> AppResult<Author>;

    async fn authors_update(&self, id: Uuid, data: &AuthorPatch) -> AppResult<Author>;

    /// Hard delete; association rows go with it
    async fn authors_delete(&self, id: Uuid) -> AppResult<()>;

    /// The subset of `ids` that resolve to stored authors
    async fn authors_existing(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>>;

    /// Filtered, searched and ordered books with their authors attached
    async fn books_list(&self, query: &BookQuery) -> AppResult<Vec<Book>>;

    async fn books_get(&self, id: Uuid) -> AppResult<Book>;

    async fn books_isbn_exists(&self, isbn: &str) -> AppResult<bool>;

    /// Insert the book and its association rows atomically
    async fn books_create(&self, data: &NewBook) -> AppResult<Book>;

    /// Apply a partial update atomically; `author_ids` replaces the set
    async fn books_update(&self, id: Uuid, data: &BookPatch) -> AppResult<Book>;

    async fn books_delete(&self, id: Uuid) -> AppResult<()>;
}

/// Shared handle to the configured store
pub type Repository = Arc<dyn CatalogRepository>;

/// Escape LIKE metacharacters so search terms match literally
pub(crate) fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
