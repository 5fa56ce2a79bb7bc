//! API integration tests
//!
//! Each test builds the full router over the in-memory store and cache and
//! drives it with `oneshot`, so no database or Redis is needed.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use catalog_server::{
    api,
    config::{ApiUser, AppConfig, CacheBackend, StoreBackend},
    repository::MemoryRepository,
    services::{
        cache::MemoryCache,
        reports::{ReportQueue, ReportWorker},
        Services,
    },
    AppState,
};

const USERNAME: &str = "librarian";
const PASSWORD: &str = "correct horse battery staple";

struct TestApp {
    router: Router,
    token: String,
}

fn test_config() -> AppConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(PASSWORD.as_bytes(), &salt)
        .expect("hash password")
        .to_string();

    let mut config = AppConfig::default();
    config.database.backend = StoreBackend::Memory;
    config.cache.backend = CacheBackend::Memory;
    config.rate_limit.enabled = false;
    config.reports.work_seconds = 0;
    config.auth.jwt_secret = "integration-secret".to_string();
    config.auth.users = vec![ApiUser {
        username: USERNAME.to_string(),
        password_hash: hash,
    }];
    config
}

fn build_router(config: AppConfig) -> Router {
    let repository = Arc::new(MemoryRepository::new());
    let (queue, receiver) = ReportQueue::channel(config.reports.queue_capacity);
    tokio::spawn(ReportWorker::new(repository.clone(), receiver, &config.reports).run());

    let services = Services::new(&config, repository, Arc::new(MemoryCache::new()), Arc::new(queue));
    api::router(AppState::new(config, services))
}

async fn spawn_app() -> TestApp {
    let router = build_router(test_config());
    let (status, body) = send(
        &router,
        Method::POST,
        "/api/v1/auth/token",
        None,
        Some(json!({ "username": USERNAME, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "token request failed: {}", body);

    TestApp {
        token: body["access"].as_str().expect("access token").to_string(),
        router,
    }
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

impl TestApp {
    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        send(&self.router, Method::GET, uri, Some(&self.token), None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        send(&self.router, Method::POST, uri, Some(&self.token), Some(body)).await
    }

    async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        send(&self.router, Method::PATCH, uri, Some(&self.token), Some(body)).await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        send(&self.router, Method::DELETE, uri, Some(&self.token), None).await
    }

    async fn create_author(&self, first_name: &str, last_name: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/catalog/authors",
                json!({ "first_name": first_name, "last_name": last_name }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create author failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_book(&self, title: &str, isbn: &str, date: &str, authors: &[&str]) -> (StatusCode, Value) {
        self.post(
            "/api/v1/catalog/books",
            json!({
                "title": title,
                "isbn": isbn,
                "publication_date": date,
                "author_ids": authors,
            }),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let (status, body) = send(&app.router, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app.router, Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn test_unauthenticated_list_is_rejected() {
    let app = spawn_app().await;
    let (status, body) = send(&app.router, Method::GET, "/api/v1/catalog/authors", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "not_authenticated");

    let (status, _) = send(&app.router, Method::GET, "/api/v1/catalog/books", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = spawn_app().await;
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/auth/token",
        None,
        Some(json!({ "username": USERNAME, "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "not_authenticated");
}

#[tokio::test]
async fn test_refresh_token_rotation() {
    let app = spawn_app().await;
    let (_, pair) = send(
        &app.router,
        Method::POST,
        "/api/v1/auth/token",
        None,
        Some(json!({ "username": USERNAME, "password": PASSWORD })),
    )
    .await;
    let refresh = pair["refresh"].as_str().unwrap();

    let (status, rotated) = send(
        &app.router,
        Method::POST,
        "/api/v1/auth/token/refresh",
        None,
        Some(json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(rotated["access"].is_string());

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/api/v1/auth/token/refresh",
        None,
        Some(json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tolkien_book_count() {
    let app = spawn_app().await;
    let tolkien = app.create_author("J.R.R.", "Tolkien").await;
    app.create_book("The Hobbit", "9780261102217", "1937-09-21", &[&tolkien]).await;
    app.create_book("The Lord of the Rings", "9780261103252", "1954-07-29", &[&tolkien]).await;

    let (status, body) = app.get("/api/v1/catalog/authors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["book_count"], 2);
    assert_eq!(body["results"][0]["full_name"], "J.R.R. Tolkien");

    let (status, body) = app
        .create_book("The Silmarillion", "9788445070380", "1977-09-15", &[&tolkien])
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["authors"][0]["id"], tolkien.as_str());

    // The cached author list must reflect the new book
    let (_, body) = app.get("/api/v1/catalog/authors").await;
    assert_eq!(body["results"][0]["book_count"], 3);

    let (_, body) = app.get(&format!("/api/v1/catalog/authors/{}", tolkien)).await;
    assert_eq!(body["data"]["book_count"], 3);
}

#[tokio::test]
async fn test_duplicate_isbn_is_conflict() {
    let app = spawn_app().await;
    let orwell = app.create_author("George", "Orwell").await;
    let (status, _) = app.create_book("1984", "9780451524935", "1949-06-08", &[&orwell]).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.create_book("Copy", "9780451524935", "1950-01-01", &[&orwell]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let (_, body) = app.get("/api/v1/catalog/books").await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_unknown_author_is_business_error() {
    let app = spawn_app().await;
    let ghost = "6f1c1f0e-6a8b-4c3e-9a4f-2b9d8e7c6a5b";
    let (status, body) = app.create_book("Ghost", "1234567890", "2000-01-01", &[ghost]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "business_error");
    assert_eq!(body["details"]["author_ids"], json!([ghost]));
}

#[tokio::test]
async fn test_malformed_input_is_invalid() {
    let app = spawn_app().await;
    let author = app.create_author("Mary", "Shelley").await;

    let (status, body) = app.create_book("Frankenstein", "12-34", "1818-01-01", &[&author]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");
    assert!(body["details"]["isbn"].is_array());

    let (status, body) = app.post("/api/v1/catalog/books", json!({ "title": "No fields" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");

    let (status, body) = app.get("/api/v1/catalog/authors/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_filter_by_author_after_create() {
    let app = spawn_app().await;
    let pratchett = app.create_author("Terry", "Pratchett").await;
    let gaiman = app.create_author("Neil", "Gaiman").await;
    app.create_book("Mort", "9780552131063", "1987-11-12", &[&pratchett]).await;

    // Warm the filtered list before the mutation
    let uri = format!("/api/v1/catalog/books?author_id={}", gaiman);
    let (_, body) = app.get(&uri).await;
    assert_eq!(body["count"], 0);

    app.create_book("Good Omens", "9780060853983", "1990-05-01", &[&pratchett, &gaiman])
        .await;
    let (_, body) = app.get(&uri).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["title"], "Good Omens");
}

#[tokio::test]
async fn test_patch_author_ids() {
    let app = spawn_app().await;
    let austen = app.create_author("Jane", "Austen").await;
    let (_, body) = app.create_book("Emma", "9780141439587", "1815-12-23", &[&austen]).await;
    let uri = format!("/api/v1/catalog/books/{}", body["data"]["id"].as_str().unwrap());

    let (status, body) = app.patch(&uri, json!({ "author_ids": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");

    let (status, body) = app.patch(&uri, json!({ "title": "Emma: A Novel" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Emma: A Novel");
    assert_eq!(body["data"]["authors"][0]["id"], austen.as_str());

    let (status, body) = app.patch(&uri, json!({ "summary": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["summary"].is_null());
}

#[tokio::test]
async fn test_patch_null_on_required_fields_is_invalid() {
    let app = spawn_app().await;
    let austen = app.create_author("Jane", "Austen").await;
    let (_, body) = app.create_book("Persuasion", "9780141439686", "1817-12-20", &[&austen]).await;
    let uri = format!("/api/v1/catalog/books/{}", body["data"]["id"].as_str().unwrap());

    let (status, body) = app.patch(&uri, json!({ "author_ids": null })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");
    assert_eq!(body["details"]["author_ids"][0], "This field may not be null.");

    let (status, body) = app.patch(&uri, json!({ "title": null })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");
    assert!(body["details"]["title"].is_array());

    let (status, body) = app.patch(&uri, json!({ "isbn": null })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["isbn"].is_array());

    // Nothing was applied
    let (status, body) = app.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Persuasion");
    assert_eq!(body["data"]["authors"][0]["id"], austen.as_str());

    let author_uri = format!("/api/v1/catalog/authors/{}", austen);
    let (status, body) = app.patch(&author_uri, json!({ "first_name": null })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["first_name"].is_array());

    let (status, body) = app.patch(&author_uri, json!({ "biography": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Jane");
}

#[tokio::test]
async fn test_pagination() {
    let app = spawn_app().await;
    for i in 0..12 {
        app.create_author("Author", &format!("Name{:02}", i)).await;
    }

    let (status, body) = app.get("/api/v1/catalog/authors?ordering=last_name&page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 12);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["results"][0]["last_name"], "Name10");
    assert!(body["next"].is_null());
    assert_eq!(body["previous"], "/api/v1/catalog/authors?ordering=last_name");

    let (_, body) = app.get("/api/v1/catalog/authors").await;
    assert_eq!(body["next"], "/api/v1/catalog/authors?page=2");

    let (status, body) = app.get("/api/v1/catalog/authors?page=9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 12);
    assert!(body["results"].as_array().unwrap().is_empty());

    let (status, body) = app.get("/api/v1/catalog/authors?page=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid");
}

#[tokio::test]
async fn test_unknown_parameters_are_rejected() {
    let app = spawn_app().await;
    let (status, body) = app.get("/api/v1/catalog/books?colour=red").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["colour"].is_array());

    let (status, body) = app.get("/api/v1/catalog/authors?ordering=-height").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["ordering"].is_array());
}

#[tokio::test]
async fn test_search_and_ordering() {
    let app = spawn_app().await;
    let tolkien = app.create_author("J.R.R.", "Tolkien").await;
    let orwell = app.create_author("George", "Orwell").await;
    app.create_book("The Hobbit", "9780261102217", "1937-09-21", &[&tolkien]).await;
    app.create_book("Animal Farm", "9780451526342", "1945-08-17", &[&orwell]).await;
    app.create_book("1984", "9780451524935", "1949-06-08", &[&orwell]).await;

    let (_, body) = app.get("/api/v1/catalog/books?search=orwell&ordering=title").await;
    let titles: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["1984", "Animal Farm"]);

    let (_, body) = app.get("/api/v1/catalog/authors?ordering=-book_count").await;
    assert_eq!(body["results"][0]["last_name"], "Orwell");

    let (_, body) = app
        .get("/api/v1/catalog/books?publication_date__gte=1940-01-01&publication_date__lte=1946-01-01")
        .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["title"], "Animal Farm");
}

#[tokio::test]
async fn test_delete_author_keeps_books() {
    let app = spawn_app().await;
    let pratchett = app.create_author("Terry", "Pratchett").await;
    let gaiman = app.create_author("Neil", "Gaiman").await;
    let (_, body) = app
        .create_book("Good Omens", "9780060853983", "1990-05-01", &[&pratchett, &gaiman])
        .await;
    let book_uri = format!("/api/v1/catalog/books/{}", body["data"]["id"].as_str().unwrap());

    let (status, body) = app.delete(&format!("/api/v1/catalog/authors/{}", pratchett)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, body) = app.get(&book_uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["authors"].as_array().unwrap().len(), 1);

    let (status, _) = app.delete(&book_uri).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&book_uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_report_is_accepted() {
    let app = spawn_app().await;
    let author = app.create_author("Ursula", "Le Guin").await;

    let (status, body) = app
        .post(&format!("/api/v1/catalog/authors/{}/generate_report", author), json!({}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["author_id"], author.as_str());
    assert_eq!(body["data"]["state"], "accepted");

    let (status, _) = app
        .post(
            "/api/v1/catalog/authors/6f1c1f0e-6a8b-4c3e-9a4f-2b9d8e7c6a5b/generate_report",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_uses_envelope() {
    let app = spawn_app().await;
    let (status, body) = app.get("/api/v1/catalog/publishers").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_token_endpoint_is_rate_limited() {
    let mut config = test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.login_max_requests = 2;
    let router = build_router(config);

    let credentials = json!({ "username": USERNAME, "password": PASSWORD });
    for _ in 0..2 {
        let (status, _) = send(&router, Method::POST, "/api/v1/auth/token", None, Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&router, Method::POST, "/api/v1/auth/token", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "throttled");
}
