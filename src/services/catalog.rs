//! Catalog management service
//!
//! Reads go through the list cache; every mutation is validated here before
//! it reaches the repository and then invalidates the affected lists.

use std::{future::Future, sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::dedup_ids, query::ListParams, Author, AuthorInput, AuthorPatch, AuthorQuery, Book,
        BookInput, BookPatch, BookQuery, NewBook,
    },
    repository::Repository,
    services::{
        cache::{generation_key, list_key, list_prefix, ListCache, AUTHORS_LIST, BOOKS_LIST},
        pagination::{paginate, Page},
    },
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    cache: Arc<dyn ListCache>,
    namespace: String,
    ttl: Duration,
    page_size: usize,
}

impl CatalogService {
    pub fn new(
        repository: Repository,
        cache: Arc<dyn ListCache>,
        namespace: String,
        ttl: Duration,
        page_size: usize,
    ) -> Self {
        Self {
            repository,
            cache,
            namespace,
            ttl,
            page_size,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn cache(&self) -> &Arc<dyn ListCache> {
        &self.cache
    }

    // ---- Reads ----

    /// Filtered, ordered author list, one page of it
    pub async fn list_authors(&self, params: &ListParams) -> AppResult<Page<Author>> {
        let query = AuthorQuery::from_params(params)?;
        let authors = self
            .cached_list(AUTHORS_LIST, params, || self.repository.authors_list(&query))
            .await?;
        Ok(paginate(authors, params.page()?, self.page_size))
    }

    pub async fn list_books(&self, params: &ListParams) -> AppResult<Page<Book>> {
        let query = BookQuery::from_params(params)?;
        let books = self
            .cached_list(BOOKS_LIST, params, || self.repository.books_list(&query))
            .await?;
        Ok(paginate(books, params.page()?, self.page_size))
    }

    pub async fn get_author(&self, id: Uuid) -> AppResult<Author> {
        self.repository.authors_get(id).await
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books_get(id).await
    }

    // ---- Authors ----

    pub async fn create_author(&self, input: AuthorInput) -> AppResult<Author> {
        input.validate()?;
        let author = self.repository.authors_create(&input).await?;
        tracing::info!("Created author id={}", author.id);
        self.invalidate(&[AUTHORS_LIST]).await;
        Ok(author)
    }

    /// Full update: names are replaced, omitted optional fields are kept
    pub async fn update_author(&self, id: Uuid, input: AuthorInput) -> AppResult<Author> {
        input.validate()?;
        self.partial_update_author(id, AuthorPatch::from(input)).await
    }

    pub async fn partial_update_author(&self, id: Uuid, patch: AuthorPatch) -> AppResult<Author> {
        patch.check()?;
        if patch.is_empty() {
            return self.repository.authors_get(id).await;
        }
        let author = self.repository.authors_update(id, &patch).await?;
        self.invalidate(&[AUTHORS_LIST]).await;
        Ok(author)
    }

    /// Removes the author and its book associations; the books stay
    pub async fn delete_author(&self, id: Uuid) -> AppResult<()> {
        self.repository.authors_delete(id).await?;
        tracing::info!("Deleted author id={}", id);
        self.invalidate(&[AUTHORS_LIST, BOOKS_LIST]).await;
        Ok(())
    }

    // ---- Books ----

    /// Create a book after checking ISBN uniqueness and that every
    /// referenced author exists
    pub async fn create_book(&self, input: BookInput) -> AppResult<Book> {
        input.validate()?;

        if self.repository.books_isbn_exists(&input.isbn).await? {
            return Err(duplicate_isbn(&input.isbn));
        }
        let author_ids = dedup_ids(&input.author_ids);
        self.check_authors(&author_ids).await?;

        let book = self
            .repository
            .books_create(&NewBook {
                title: input.title,
                summary: input.summary,
                isbn: input.isbn,
                publication_date: input.publication_date,
                author_ids,
            })
            .await?;

        tracing::info!("Created book id={} isbn={}", book.id, book.isbn);
        self.invalidate(&[BOOKS_LIST, AUTHORS_LIST]).await;
        Ok(book)
    }

    pub async fn update_book(&self, id: Uuid, input: BookInput) -> AppResult<Book> {
        input.validate()?;
        self.partial_update_book(id, BookPatch::from(input)).await
    }

    /// Apply a partial update; the author set is only replaced when
    /// `author_ids` is sent
    pub async fn partial_update_book(&self, id: Uuid, mut patch: BookPatch) -> AppResult<Book> {
        patch.check()?;
        let existing = self.repository.books_get(id).await?;

        if let Some(Some(ref isbn)) = patch.isbn {
            if *isbn != existing.isbn && self.repository.books_isbn_exists(isbn).await? {
                return Err(duplicate_isbn(isbn));
            }
        }
        if let Some(ids) = patch.author_ids() {
            let ids = dedup_ids(ids);
            self.check_authors(&ids).await?;
            patch.author_ids = Some(Some(ids));
        }

        let book = self.repository.books_update(id, &patch).await?;
        tracing::info!("Updated book id={}", book.id);
        self.invalidate(&[BOOKS_LIST, AUTHORS_LIST]).await;
        Ok(book)
    }

    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books_delete(id).await?;
        tracing::info!("Deleted book id={}", id);
        self.invalidate(&[BOOKS_LIST, AUTHORS_LIST]).await;
        Ok(())
    }

    // ---- Helpers ----

    /// Every id must resolve; the error names exactly the ones that don't
    async fn check_authors(&self, ids: &[Uuid]) -> AppResult<()> {
        let existing = self.repository.authors_existing(ids).await?;
        let missing: Vec<Uuid> = ids
            .iter()
            .filter(|id| !existing.contains(id))
            .copied()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        let listed = missing.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ");
        Err(AppError::BusinessRule {
            message: format!("Author ids not found: {}", listed),
            details: json!({ "author_ids": missing }),
        })
    }

    /// Serve a list from the cache, or load and store it.
    ///
    /// The generation is read before loading, so rows loaded while a
    /// mutation commits are stored under the superseded generation.
    /// Cache errors never fail the request: a failed read is a miss and a
    /// failed write is only logged.
    async fn cached_list<T, F, Fut>(&self, entity: &str, params: &ListParams, load: F) -> AppResult<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Vec<T>>>,
    {
        let generation = match self.cache.generation(&generation_key(&self.namespace, entity)).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!("Cache generation unavailable for {}, bypassing cache: {}", entity, e);
                return load().await;
            }
        };
        let key = list_key(&self.namespace, entity, generation, &params.canonical());

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<T>>(&raw) {
                Ok(rows) => {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(rows);
                }
                Err(e) => tracing::warn!("Discarding unreadable cache entry {}: {}", key, e),
            },
            Ok(None) => tracing::debug!("Cache miss for {}", key),
            Err(e) => tracing::warn!("Cache read failed for {}: {}", key, e),
        }

        let rows = load().await?;

        match serde_json::to_string(&rows) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, self.ttl).await {
                    tracing::warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize list for {}: {}", key, e),
        }

        Ok(rows)
    }

    /// Bump each entity generation, then drop the superseded entries
    async fn invalidate(&self, entities: &[&str]) {
        for entity in entities {
            let counter = generation_key(&self.namespace, entity);
            match self.cache.bump(&counter).await {
                Ok(generation) => tracing::debug!("{} now at generation {}", counter, generation),
                Err(e) => tracing::error!("Cache generation bump failed for {}: {}", counter, e),
            }

            let prefix = list_prefix(&self.namespace, entity);
            match self.cache.invalidate_prefix(&prefix).await {
                Ok(removed) => tracing::debug!("Invalidated {} cache entries under {}", removed, prefix),
                Err(e) => tracing::error!("Cache invalidation failed for {}: {}", prefix, e),
            }
        }
    }
}

fn duplicate_isbn(isbn: &str) -> AppError {
    AppError::Conflict(format!("A book with ISBN {} already exists", isbn))
}
