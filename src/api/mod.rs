//! API handlers for the catalog REST endpoints

pub mod auth;
pub mod authors;
pub mod books;
pub mod health;
pub mod openapi;
pub mod rate_limit;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{request::Parts, Uri},
    middleware,
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use url::form_urlencoded;
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::{query::ListParams, token::Claims, Author, Book},
    services::pagination::Page,
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AppError::Authentication("Authentication credentials were not provided.".to_string())
                })?;

        let claims = state.services.auth.verify_access(bearer.token())?;
        Ok(AuthenticatedUser(claims))
    }
}

/// JSON body whose rejections render through the error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path parameters whose rejections render through the error envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Raw query pairs in request order; repeated keys are kept
#[async_trait]
impl<S> FromRequestParts<S> for ListParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pairs = parts
            .uri
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Ok(ListParams::new(pairs))
    }
}

/// Success envelope
#[derive(Serialize, ToSchema)]
#[aliases(AuthorEnvelope = ApiSuccess<Author>, BookEnvelope = ApiSuccess<Book>)]
pub struct ApiSuccess<T> {
    /// Always "success"
    pub status: &'static str,
    pub data: T,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
        })
    }
}

/// Paginated list response
#[derive(Serialize, ToSchema)]
#[aliases(AuthorPage = PaginatedResponse<Author>, BookPage = PaginatedResponse<Book>)]
pub struct PaginatedResponse<T> {
    /// Total number of results across all pages
    pub count: usize,
    /// Link to the next page
    pub next: Option<String>,
    /// Link to the previous page
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    /// Build the response, turning page numbers into links relative to the
    /// request path
    pub fn from_page(page: Page<T>, uri: &Uri, params: &ListParams) -> Self {
        let link = |n: usize| {
            let query = params.with_page(n);
            if query.is_empty() {
                uri.path().to_string()
            } else {
                format!("{}?{}", uri.path(), query)
            }
        };
        Self {
            count: page.total_count,
            next: page.next_page.map(&link),
            previous: page.previous_page.map(&link),
            results: page.items,
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("The requested resource does not exist".to_string())
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut token_routes = Router::new()
        .route("/auth/token", post(auth::obtain_token))
        .route("/auth/token/refresh", post(auth::refresh_token));

    let mut catalog_routes = Router::new()
        // Authors
        .route("/catalog/authors", get(authors::list_authors).post(authors::create_author))
        .route(
            "/catalog/authors/:id",
            get(authors::get_author)
                .put(authors::update_author)
                .patch(authors::partial_update_author)
                .delete(authors::delete_author),
        )
        .route("/catalog/authors/:id/generate_report", post(authors::generate_report))
        // Books
        .route("/catalog/books", get(books::list_books).post(books::create_book))
        .route(
            "/catalog/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .patch(books::partial_update_book)
                .delete(books::delete_book),
        );

    if state.config.rate_limit.enabled {
        token_routes = token_routes.layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::login_rate_limit,
        ));
        catalog_routes = catalog_routes.layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::api_rate_limit,
        ));
    }

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .merge(token_routes)
        .merge(catalog_routes)
        .fallback(not_found)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .fallback(not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
