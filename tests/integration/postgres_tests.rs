//! PostgreSQL store tests
//!
//! These need a reachable database at DATABASE_URL; migrations are applied
//! on connect. Every run tags its rows with a fresh id so reruns against the
//! same database don't collide.

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use catalog_server::{
    models::{AuthorInput, AuthorQuery, BookPatch, ListParams, NewBook},
    repository::{CatalogRepository, PgRepository},
    AppError,
};

async fn repository() -> PgRepository {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    PgRepository::new(pool)
}

fn tag() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 13 digits, unique per call
fn isbn() -> String {
    format!("{:013}", Uuid::new_v4().as_u128() % 10_000_000_000_000)
}

fn author(first: &str, last: &str) -> AuthorInput {
    AuthorInput {
        first_name: first.to_string(),
        last_name: last.to_string(),
        biography: None,
        birth_date: None,
    }
}

fn book(title: &str, author_ids: Vec<Uuid>) -> NewBook {
    NewBook {
        title: title.to_string(),
        summary: None,
        isbn: isbn(),
        publication_date: NaiveDate::from_ymd_opt(1937, 9, 21).unwrap(),
        author_ids,
    }
}

fn query(pairs: &[(&str, &str)]) -> AuthorQuery {
    let params = ListParams::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
    AuthorQuery::from_params(&params).unwrap()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_book_count_and_ordering() {
    let repo = repository().await;
    let tag = tag();
    let tolkien = repo.authors_create(&author("John", &format!("Tolkien{}", tag))).await.unwrap();
    let lewis = repo.authors_create(&author("Clive", &format!("Lewis{}", tag))).await.unwrap();

    repo.books_create(&book("The Hobbit", vec![tolkien.id])).await.unwrap();
    repo.books_create(&book("The Silmarillion", vec![tolkien.id])).await.unwrap();
    repo.books_create(&book("Letters", vec![tolkien.id, lewis.id])).await.unwrap();

    let authors = repo
        .authors_list(&query(&[("search", &tag), ("ordering", "-book_count")]))
        .await
        .unwrap();
    assert_eq!(authors.len(), 2);
    assert_eq!(authors[0].id, tolkien.id);
    assert_eq!(authors[0].book_count, 3);
    assert_eq!(authors[1].book_count, 1);

    let authors = repo
        .authors_list(&query(&[("search", &tag), ("ordering", "book_count")]))
        .await
        .unwrap();
    assert_eq!(authors[0].id, lewis.id);

    assert_eq!(repo.authors_get(tolkien.id).await.unwrap().book_count, 3);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_isbn_is_conflict() {
    let repo = repository().await;
    let a = repo.authors_create(&author("George", &format!("Orwell{}", tag()))).await.unwrap();

    let first = book("1984", vec![a.id]);
    repo.books_create(&first).await.unwrap();

    let copy = NewBook {
        isbn: first.isbn.clone(),
        ..book("Copy", vec![a.id])
    };
    let err = repo.books_create(&copy).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "unexpected error: {:?}", err);
}

#[tokio::test]
#[ignore]
async fn test_unknown_author_is_business_error() {
    let repo = repository().await;
    let new_book = book("Orphan", vec![Uuid::new_v4()]);

    let err = repo.books_create(&new_book).await.unwrap_err();
    assert!(matches!(err, AppError::BusinessRule { .. }), "unexpected error: {:?}", err);
    assert!(!repo.books_isbn_exists(&new_book.isbn).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_update_replaces_author_set() {
    let repo = repository().await;
    let tag = tag();
    let pratchett = repo.authors_create(&author("Terry", &format!("Pratchett{}", tag))).await.unwrap();
    let gaiman = repo.authors_create(&author("Neil", &format!("Gaiman{}", tag))).await.unwrap();
    let created = repo.books_create(&book("Good Omens", vec![pratchett.id])).await.unwrap();

    let patch = BookPatch {
        author_ids: Some(Some(vec![gaiman.id])),
        ..Default::default()
    };
    let updated = repo.books_update(created.id, &patch).await.unwrap();
    assert_eq!(updated.author_ids(), vec![gaiman.id]);
    assert_eq!(updated.title, "Good Omens");

    // A failed association insert rolls the title change back too
    let patch = BookPatch {
        title: Some(Some("Bad Omens".to_string())),
        author_ids: Some(Some(vec![Uuid::new_v4()])),
        ..Default::default()
    };
    let err = repo.books_update(created.id, &patch).await.unwrap_err();
    assert!(matches!(err, AppError::BusinessRule { .. }), "unexpected error: {:?}", err);

    let stored = repo.books_get(created.id).await.unwrap();
    assert_eq!(stored.title, "Good Omens");
    assert_eq!(stored.author_ids(), vec![gaiman.id]);
    assert_eq!(repo.authors_get(pratchett.id).await.unwrap().book_count, 0);
}
