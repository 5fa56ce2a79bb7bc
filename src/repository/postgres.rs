//! PostgreSQL Entity Store.
//!
//! Listing queries are assembled with `sqlx::QueryBuilder` so every filter
//! value is a bound parameter. `book_count` comes from a LEFT JOIN + GROUP BY
//! in the same statement; book authors are loaded for a whole result set with
//! one extra query.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{escape_like, CatalogRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        query::OrderField, Author, AuthorInput, AuthorPatch, AuthorQuery, AuthorSummary, Book,
        BookAuthor, BookPatch, BookQuery, NewBook,
    },
};

const AUTHOR_SELECT: &str = r#"
    SELECT a.id, a.first_name, a.last_name,
           a.first_name || ' ' || a.last_name AS full_name,
           a.birth_date, a.biography,
           COUNT(ba.book_id) AS book_count,
           a.created_at, a.updated_at
    FROM authors a
    LEFT JOIN book_authors ba ON ba.author_id = a.id
    WHERE 1=1
"#;

const BOOK_SELECT: &str = r#"
    SELECT b.id, b.title, b.summary, b.isbn, b.publication_date, b.created_at, b.updated_at
    FROM books b
    WHERE 1=1
"#;

#[derive(Clone)]
pub struct PgRepository {
    pool: Pool<Postgres>,
}

impl PgRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Attach authors to every book of `books` with a single query
    async fn attach_authors(&self, books: &mut [Book]) -> AppResult<()> {
        if books.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = books.iter().map(|b| b.id).collect();

        let rows = sqlx::query_as::<_, BookAuthor>(
            r#"
            SELECT ba.book_id, a.id, a.first_name, a.last_name,
                   a.first_name || ' ' || a.last_name AS full_name,
                   a.birth_date, a.biography, a.created_at
            FROM book_authors ba
            JOIN authors a ON a.id = ba.author_id
            WHERE ba.book_id = ANY($1)
            ORDER BY a.last_name, a.first_name, a.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_book: HashMap<Uuid, Vec<AuthorSummary>> = HashMap::with_capacity(books.len());
        for row in rows {
            by_book.entry(row.book_id).or_default().push(row.author);
        }
        for book in books.iter_mut() {
            book.authors = by_book.remove(&book.id).unwrap_or_default();
        }
        Ok(())
    }
}

fn push_ordering<F: OrderField>(
    builder: &mut QueryBuilder<'_, Postgres>,
    prefix: &str,
    ordering: &[crate::models::query::OrderTerm<F>],
) {
    builder.push(" ORDER BY ");
    for term in ordering {
        builder
            .push(prefix)
            .push(term.field.name())
            .push(if term.descending { " DESC, " } else { " ASC, " });
    }
    // Total order so pagination over the materialized list is stable
    builder.push(prefix).push("id ASC");
}

#[async_trait]
impl CatalogRepository for PgRepository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // AUTHORS
    // =========================================================================

    async fn authors_list(&self, query: &AuthorQuery) -> AppResult<Vec<Author>> {
        let mut builder = QueryBuilder::<Postgres>::new(AUTHOR_SELECT);

        if let Some(ref last_name) = query.last_name {
            builder.push(" AND a.last_name = ").push_bind(last_name.clone());
        }
        if let Some(birth_date) = query.birth_date {
            builder.push(" AND a.birth_date = ").push_bind(birth_date);
        }
        for term in &query.search {
            let pattern = format!("%{}%", escape_like(term));
            builder
                .push(" AND (a.first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR a.last_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR a.biography ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        builder.push(" GROUP BY a.id");
        // Bare names so `book_count` resolves to the aggregate's alias
        push_ordering(&mut builder, "", &query.ordering);

        let authors = builder
            .build_query_as::<Author>()
            .fetch_all(&self.pool)
            .await?;
        Ok(authors)
    }

    async fn authors_get(&self, id: Uuid) -> AppResult<Author> {
        let mut builder = QueryBuilder::<Postgres>::new(AUTHOR_SELECT);
        builder.push(" AND a.id = ").push_bind(id).push(" GROUP BY a.id");

        builder
            .build_query_as::<Author>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Author with id={} not found", id)))
    }

    async fn authors_create(&self, data: &AuthorInput) -> AppResult<Author> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO authors (id, first_name, last_name, biography, birth_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(id)
        .bind(&data.first_name)
        .bind(&data.last_name)
        .bind(&data.biography)
        .bind(data.birth_date)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.authors_get(id).await
    }

    async fn authors_update(&self, id: Uuid, data: &AuthorPatch) -> AppResult<Author> {
        let result = sqlx::query(
            r#"
            UPDATE authors SET
                first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                biography = CASE WHEN $3 THEN $4 ELSE biography END,
                birth_date = CASE WHEN $5 THEN $6 ELSE birth_date END,
                updated_at = $7
            WHERE id = $8
            "#,
        )
        .bind(data.first_name.clone().flatten())
        .bind(data.last_name.clone().flatten())
        .bind(data.biography.is_some())
        .bind(data.biography.clone().flatten())
        .bind(data.birth_date.is_some())
        .bind(data.birth_date.flatten())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author with id={} not found", id)));
        }
        self.authors_get(id).await
    }

    async fn authors_delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author with id={} not found", id)));
        }
        Ok(())
    }

    async fn authors_existing(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM authors WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(found)
    }

    // =========================================================================
    // BOOKS
    // =========================================================================

    async fn books_list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let mut builder = QueryBuilder::<Postgres>::new(BOOK_SELECT);

        if let Some(ref isbn) = query.isbn {
            builder.push(" AND b.isbn = ").push_bind(isbn.clone());
        }
        if let Some(date) = query.publication_date {
            builder.push(" AND b.publication_date = ").push_bind(date);
        }
        if let Some(date) = query.publication_date_gte {
            builder.push(" AND b.publication_date >= ").push_bind(date);
        }
        if let Some(date) = query.publication_date_lte {
            builder.push(" AND b.publication_date <= ").push_bind(date);
        }
        if let Some(author_id) = query.author_id {
            builder
                .push(" AND EXISTS (SELECT 1 FROM book_authors f WHERE f.book_id = b.id AND f.author_id = ")
                .push_bind(author_id)
                .push(")");
        }
        for term in &query.search {
            let pattern = format!("%{}%", escape_like(term));
            builder
                .push(" AND (b.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR b.summary ILIKE ")
                .push_bind(pattern.clone())
                .push(
                    " OR EXISTS (SELECT 1 FROM book_authors s JOIN authors sa ON sa.id = s.author_id \
                     WHERE s.book_id = b.id AND (sa.first_name ILIKE ",
                )
                .push_bind(pattern.clone())
                .push(" OR sa.last_name ILIKE ")
                .push_bind(pattern)
                .push(")))");
        }

        push_ordering(&mut builder, "b.", &query.ordering);

        let mut books = builder
            .build_query_as::<Book>()
            .fetch_all(&self.pool)
            .await?;
        self.attach_authors(&mut books).await?;
        Ok(books)
    }

    async fn books_get(&self, id: Uuid) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, summary, isbn, publication_date, created_at, updated_at
            FROM books
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id={} not found", id)))?;

        let mut books = [book];
        self.attach_authors(&mut books).await?;
        let [book] = books;
        Ok(book)
    }

    async fn books_isbn_exists(&self, isbn: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
            .bind(isbn)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn books_create(&self, data: &NewBook) -> AppResult<Book> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO books (id, title, summary, isbn, publication_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(id)
        .bind(&data.title)
        .bind(&data.summary)
        .bind(&data.isbn)
        .bind(data.publication_date)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO book_authors (book_id, author_id) SELECT $1, UNNEST($2::uuid[])")
            .bind(id)
            .bind(&data.author_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.books_get(id).await
    }

    async fn books_update(&self, id: Uuid, data: &BookPatch) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE books SET
                title = COALESCE($1, title),
                summary = CASE WHEN $2 THEN $3 ELSE summary END,
                isbn = COALESCE($4, isbn),
                publication_date = COALESCE($5, publication_date),
                updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(data.title.clone().flatten())
        .bind(data.summary.is_some())
        .bind(data.summary.clone().flatten())
        .bind(data.isbn.clone().flatten())
        .bind(data.publication_date.flatten())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id={} not found", id)));
        }

        if let Some(author_ids) = data.author_ids() {
            sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO book_authors (book_id, author_id) SELECT $1, UNNEST($2::uuid[])")
                .bind(id)
                .bind(author_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.books_get(id).await
    }

    async fn books_delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id={} not found", id)));
        }
        Ok(())
    }
}
