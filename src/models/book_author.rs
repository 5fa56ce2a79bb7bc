//! Book-Author junction model (N:M relationship)

use sqlx::FromRow;
use uuid::Uuid;

use super::author::AuthorSummary;

/// Junction row joined with the author it points to; used to attach
/// authors to a page of books in a single query.
#[derive(Debug, Clone, FromRow)]
pub struct BookAuthor {
    pub book_id: Uuid,
    #[sqlx(flatten)]
    pub author: AuthorSummary,
}
