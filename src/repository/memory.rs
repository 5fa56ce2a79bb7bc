//! In-process Entity Store.
//!
//! Mirrors the PostgreSQL adapter's semantics (filters, case-insensitive
//! search, ordering with nulls last ascending, id tiebreak, cascade of
//! association rows) so the service layer behaves the same on either
//! backend. Each mutation runs under one write lock, which makes book
//! creation and association replacement atomic for readers.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CatalogRepository;
use crate::{
    error::{AppError, AppResult},
    models::{
        author::full_name,
        query::{AuthorOrderField, BookOrderField, OrderTerm},
        Author, AuthorInput, AuthorPatch, AuthorQuery, AuthorSummary, Book, BookPatch, BookQuery,
        NewBook,
    },
};

#[derive(Debug, Clone)]
struct AuthorRecord {
    id: Uuid,
    first_name: String,
    last_name: String,
    biography: Option<String>,
    birth_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AuthorRecord {
    fn to_author(&self, book_count: i64) -> Author {
        Author {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: full_name(&self.first_name, &self.last_name),
            birth_date: self.birth_date,
            biography: self.biography.clone(),
            book_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn to_summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            full_name: full_name(&self.first_name, &self.last_name),
            birth_date: self.birth_date,
            biography: self.biography.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
struct BookRecord {
    id: Uuid,
    title: String,
    summary: Option<String>,
    isbn: String,
    publication_date: NaiveDate,
    author_ids: BTreeSet<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    authors: HashMap<Uuid, AuthorRecord>,
    books: HashMap<Uuid, BookRecord>,
}

impl State {
    fn author(&self, id: Uuid) -> AppResult<&AuthorRecord> {
        self.authors
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Author with id={} not found", id)))
    }

    fn book_count(&self, author_id: Uuid) -> i64 {
        self.books
            .values()
            .filter(|b| b.author_ids.contains(&author_id))
            .count() as i64
    }

    /// Authors of a book in (last_name, first_name, id) order
    fn book(&self, record: &BookRecord) -> Book {
        let mut authors: Vec<&AuthorRecord> = record
            .author_ids
            .iter()
            .filter_map(|id| self.authors.get(id))
            .collect();
        authors.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then_with(|| a.first_name.cmp(&b.first_name))
                .then_with(|| a.id.cmp(&b.id))
        });
        Book {
            id: record.id,
            title: record.title.clone(),
            summary: record.summary.clone(),
            isbn: record.isbn.clone(),
            publication_date: record.publication_date,
            authors: authors.into_iter().map(AuthorRecord::to_summary).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn isbn_taken(&self, isbn: &str, except: Option<Uuid>) -> bool {
        self.books
            .values()
            .any(|b| b.isbn == isbn && Some(b.id) != except)
    }

    /// Store-level integrity guard, equivalent to the foreign key
    fn check_authors(&self, ids: &[Uuid]) -> AppResult<()> {
        if ids.iter().all(|id| self.authors.contains_key(id)) {
            Ok(())
        } else {
            Err(AppError::business_rule("Referenced resource does not exist"))
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Ascending puts `None` last; reversing for descending puts it first,
/// which is PostgreSQL's default null placement.
fn cmp_nullable<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    }
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn cmp_authors(a: &Author, b: &Author, terms: &[OrderTerm<AuthorOrderField>]) -> Ordering {
    for term in terms {
        let ordering = match term.field {
            AuthorOrderField::LastName => a.last_name.cmp(&b.last_name),
            AuthorOrderField::FirstName => a.first_name.cmp(&b.first_name),
            AuthorOrderField::BirthDate => cmp_nullable(&a.birth_date, &b.birth_date),
            AuthorOrderField::BookCount => a.book_count.cmp(&b.book_count),
        };
        let ordering = directed(ordering, term.descending);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id.cmp(&b.id)
}

fn cmp_books(a: &Book, b: &Book, terms: &[OrderTerm<BookOrderField>]) -> Ordering {
    for term in terms {
        let ordering = match term.field {
            BookOrderField::Title => a.title.cmp(&b.title),
            BookOrderField::PublicationDate => a.publication_date.cmp(&b.publication_date),
        };
        let ordering = directed(ordering, term.descending);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id.cmp(&b.id)
}

#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for MemoryRepository {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn authors_list(&self, query: &AuthorQuery) -> AppResult<Vec<Author>> {
        let state = self.state.read().await;

        // Count every association once instead of once per author
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for book in state.books.values() {
            for author_id in &book.author_ids {
                *counts.entry(*author_id).or_default() += 1;
            }
        }

        let mut authors: Vec<Author> = state
            .authors
            .values()
            .filter(|a| query.last_name.as_ref().map_or(true, |v| &a.last_name == v))
            .filter(|a| query.birth_date.map_or(true, |v| a.birth_date == Some(v)))
            .filter(|a| {
                query.search.iter().all(|term| {
                    contains_ci(&a.first_name, term)
                        || contains_ci(&a.last_name, term)
                        || a.biography.as_deref().is_some_and(|bio| contains_ci(bio, term))
                })
            })
            .map(|a| a.to_author(counts.get(&a.id).copied().unwrap_or(0)))
            .collect();

        authors.sort_by(|a, b| cmp_authors(a, b, &query.ordering));
        Ok(authors)
    }

    async fn authors_get(&self, id: Uuid) -> AppResult<Author> {
        let state = self.state.read().await;
        let record = state.author(id)?;
        Ok(record.to_author(state.book_count(id)))
    }

    async fn authors_create(&self, data: &AuthorInput) -> AppResult<Author> {
        let now = Utc::now();
        let record = AuthorRecord {
            id: Uuid::new_v4(),
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            biography: data.biography.clone(),
            birth_date: data.birth_date,
            created_at: now,
            updated_at: now,
        };
        let author = record.to_author(0);
        self.state.write().await.authors.insert(record.id, record);
        Ok(author)
    }

    async fn authors_update(&self, id: Uuid, data: &AuthorPatch) -> AppResult<Author> {
        let mut state = self.state.write().await;
        let record = state
            .authors
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Author with id={} not found", id)))?;

        if let Some(Some(ref first_name)) = data.first_name {
            record.first_name = first_name.clone();
        }
        if let Some(Some(ref last_name)) = data.last_name {
            record.last_name = last_name.clone();
        }
        if let Some(ref biography) = data.biography {
            record.biography = biography.clone();
        }
        if let Some(birth_date) = data.birth_date {
            record.birth_date = birth_date;
        }
        record.updated_at = Utc::now();

        let record = record.clone();
        Ok(record.to_author(state.book_count(id)))
    }

    async fn authors_delete(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.authors.remove(&id).is_none() {
            return Err(AppError::NotFound(format!("Author with id={} not found", id)));
        }
        for book in state.books.values_mut() {
            book.author_ids.remove(&id);
        }
        Ok(())
    }

    async fn authors_existing(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| state.authors.contains_key(id))
            .collect())
    }

    async fn books_list(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let state = self.state.read().await;

        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| query.isbn.as_ref().map_or(true, |v| &b.isbn == v))
            .filter(|b| query.publication_date.map_or(true, |v| b.publication_date == v))
            .filter(|b| query.publication_date_gte.map_or(true, |v| b.publication_date >= v))
            .filter(|b| query.publication_date_lte.map_or(true, |v| b.publication_date <= v))
            .filter(|b| query.author_id.map_or(true, |v| b.author_ids.contains(&v)))
            .filter(|b| {
                query.search.iter().all(|term| {
                    contains_ci(&b.title, term)
                        || b.summary.as_deref().is_some_and(|s| contains_ci(s, term))
                        || b.author_ids.iter().filter_map(|id| state.authors.get(id)).any(|a| {
                            contains_ci(&a.first_name, term) || contains_ci(&a.last_name, term)
                        })
                })
            })
            .map(|b| state.book(b))
            .collect();

        books.sort_by(|a, b| cmp_books(a, b, &query.ordering));
        Ok(books)
    }

    async fn books_get(&self, id: Uuid) -> AppResult<Book> {
        let state = self.state.read().await;
        state
            .books
            .get(&id)
            .map(|record| state.book(record))
            .ok_or_else(|| AppError::NotFound(format!("Book with id={} not found", id)))
    }

    async fn books_isbn_exists(&self, isbn: &str) -> AppResult<bool> {
        Ok(self.state.read().await.isbn_taken(isbn, None))
    }

    async fn books_create(&self, data: &NewBook) -> AppResult<Book> {
        let mut state = self.state.write().await;

        if state.isbn_taken(&data.isbn, None) {
            return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
        }
        state.check_authors(&data.author_ids)?;

        let now = Utc::now();
        let record = BookRecord {
            id: Uuid::new_v4(),
            title: data.title.clone(),
            summary: data.summary.clone(),
            isbn: data.isbn.clone(),
            publication_date: data.publication_date,
            author_ids: data.author_ids.iter().copied().collect(),
            created_at: now,
            updated_at: now,
        };
        let book = state.book(&record);
        state.books.insert(record.id, record);
        Ok(book)
    }

    async fn books_update(&self, id: Uuid, data: &BookPatch) -> AppResult<Book> {
        let mut state = self.state.write().await;

        if !state.books.contains_key(&id) {
            return Err(AppError::NotFound(format!("Book with id={} not found", id)));
        }
        if let Some(Some(ref isbn)) = data.isbn {
            if state.isbn_taken(isbn, Some(id)) {
                return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
            }
        }
        if let Some(author_ids) = data.author_ids() {
            state.check_authors(author_ids)?;
        }

        // All checks passed; nothing below can fail
        let Some(record) = state.books.get_mut(&id) else {
            return Err(AppError::NotFound(format!("Book with id={} not found", id)));
        };
        if let Some(Some(ref title)) = data.title {
            record.title = title.clone();
        }
        if let Some(ref summary) = data.summary {
            record.summary = summary.clone();
        }
        if let Some(Some(ref isbn)) = data.isbn {
            record.isbn = isbn.clone();
        }
        if let Some(Some(date)) = data.publication_date {
            record.publication_date = date;
        }
        if let Some(author_ids) = data.author_ids() {
            record.author_ids = author_ids.iter().copied().collect();
        }
        record.updated_at = Utc::now();

        let record = record.clone();
        Ok(state.book(&record))
    }

    async fn books_delete(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.books.remove(&id).is_none() {
            return Err(AppError::NotFound(format!("Book with id={} not found", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::ListParams;

    fn author_input(first: &str, last: &str) -> AuthorInput {
        AuthorInput {
            first_name: first.to_string(),
            last_name: last.to_string(),
            biography: None,
            birth_date: None,
        }
    }

    fn new_book(title: &str, isbn: &str, year: i32, authors: &[Uuid]) -> NewBook {
        NewBook {
            title: title.to_string(),
            summary: None,
            isbn: isbn.to_string(),
            publication_date: NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
            author_ids: authors.to_vec(),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        ListParams::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[tokio::test]
    async fn test_book_count_matches_associations() {
        let repo = MemoryRepository::new();
        let tolkien = repo.authors_create(&author_input("J.R.R.", "Tolkien")).await.unwrap();
        let orwell = repo.authors_create(&author_input("George", "Orwell")).await.unwrap();
        repo.books_create(&new_book("The Hobbit", "9780261102217", 1937, &[tolkien.id])).await.unwrap();
        repo.books_create(&new_book("The Lord of the Rings", "9780261103252", 1954, &[tolkien.id])).await.unwrap();

        let authors = repo.authors_list(&AuthorQuery::default()).await.unwrap();
        let counts: Vec<(String, i64)> = authors.iter().map(|a| (a.last_name.clone(), a.book_count)).collect();
        assert_eq!(counts, vec![("Orwell".to_string(), 0), ("Tolkien".to_string(), 2)]);
        assert_eq!(repo.authors_get(orwell.id).await.unwrap().book_count, 0);
    }

    #[tokio::test]
    async fn test_order_by_book_count_desc() {
        let repo = MemoryRepository::new();
        let a = repo.authors_create(&author_input("A", "Alpha")).await.unwrap();
        let b = repo.authors_create(&author_input("B", "Beta")).await.unwrap();
        repo.books_create(&new_book("One", "1111111111", 2000, &[b.id])).await.unwrap();

        let query = AuthorQuery::from_params(&params(&[("ordering", "-book_count")])).unwrap();
        let authors = repo.authors_list(&query).await.unwrap();
        assert_eq!(authors[0].id, b.id);
        assert_eq!(authors[1].id, a.id);
    }

    #[tokio::test]
    async fn test_birth_date_nulls_last_ascending() {
        let repo = MemoryRepository::new();
        let mut dated = author_input("Jane", "Austen");
        dated.birth_date = NaiveDate::from_ymd_opt(1775, 12, 16);
        repo.authors_create(&author_input("Anon", "Ymous")).await.unwrap();
        repo.authors_create(&dated).await.unwrap();

        let query = AuthorQuery::from_params(&params(&[("ordering", "birth_date")])).unwrap();
        let authors = repo.authors_list(&query).await.unwrap();
        assert_eq!(authors[0].last_name, "Austen");

        let query = AuthorQuery::from_params(&params(&[("ordering", "-birth_date")])).unwrap();
        let authors = repo.authors_list(&query).await.unwrap();
        assert_eq!(authors[0].last_name, "Ymous");
    }

    #[tokio::test]
    async fn test_book_search_covers_author_names() {
        let repo = MemoryRepository::new();
        let tolkien = repo.authors_create(&author_input("J.R.R.", "Tolkien")).await.unwrap();
        let orwell = repo.authors_create(&author_input("George", "Orwell")).await.unwrap();
        repo.books_create(&new_book("The Hobbit", "9780261102217", 1937, &[tolkien.id])).await.unwrap();
        repo.books_create(&new_book("1984", "9780451524935", 1949, &[orwell.id])).await.unwrap();

        let query = BookQuery::from_params(&params(&[("search", "TOLK")])).unwrap();
        let books = repo.books_list(&query).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "The Hobbit");
    }

    #[tokio::test]
    async fn test_book_date_range_and_default_order() {
        let repo = MemoryRepository::new();
        let a = repo.authors_create(&author_input("J.R.R.", "Tolkien")).await.unwrap();
        repo.books_create(&new_book("The Hobbit", "9780261102217", 1937, &[a.id])).await.unwrap();
        repo.books_create(&new_book("The Lord of the Rings", "9780261103252", 1954, &[a.id])).await.unwrap();
        repo.books_create(&new_book("The Silmarillion", "9788445070380", 1977, &[a.id])).await.unwrap();

        let books = repo.books_list(&BookQuery::default()).await.unwrap();
        let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["The Silmarillion", "The Lord of the Rings", "The Hobbit"]);

        let query = BookQuery::from_params(&params(&[
            ("publication_date__gte", "1940-01-01"),
            ("publication_date__lte", "1960-01-01"),
        ]))
        .unwrap();
        let books = repo.books_list(&query).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "The Lord of the Rings");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_isbn_and_unknown_author() {
        let repo = MemoryRepository::new();
        let a = repo.authors_create(&author_input("George", "Orwell")).await.unwrap();
        repo.books_create(&new_book("1984", "9780451524935", 1949, &[a.id])).await.unwrap();

        let err = repo
            .books_create(&new_book("Copy", "9780451524935", 2000, &[a.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = repo
            .books_create(&new_book("Ghost", "1234567890", 2000, &[Uuid::new_v4()]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule { .. }));
        assert_eq!(repo.books_list(&BookQuery::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_author_delete_removes_associations() {
        let repo = MemoryRepository::new();
        let a = repo.authors_create(&author_input("Terry", "Pratchett")).await.unwrap();
        let b = repo.authors_create(&author_input("Neil", "Gaiman")).await.unwrap();
        let book = repo
            .books_create(&new_book("Good Omens", "9780060853983", 1990, &[a.id, b.id]))
            .await
            .unwrap();

        repo.authors_delete(a.id).await.unwrap();
        let book = repo.books_get(book.id).await.unwrap();
        assert_eq!(book.author_ids(), vec![b.id]);
    }

    #[tokio::test]
    async fn test_update_missing_book_is_not_found() {
        let repo = MemoryRepository::new();
        let err = repo.books_update(Uuid::new_v4(), &BookPatch::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
