//! Book endpoints

use axum::{
    extract::{OriginalUri, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{query::ListParams, Book, BookInput, BookPatch},
    AppState,
};

use super::{ApiJson, ApiPath, ApiSuccess, AuthenticatedUser, BookEnvelope, BookPage, PaginatedResponse};

/// List books with filters, search, ordering and pagination
#[utoipa::path(
    get,
    path = "/catalog/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("isbn" = Option<String>, Query, description = "Exact ISBN"),
        ("publication_date" = Option<String>, Query, description = "Exact publication date (YYYY-MM-DD)"),
        ("publication_date__gte" = Option<String>, Query, description = "Published on or after"),
        ("publication_date__lte" = Option<String>, Query, description = "Published on or before"),
        ("author_id" = Option<Uuid>, Query, description = "Books by this author"),
        ("search" = Option<String>, Query, description = "Search title, summary and author names"),
        ("ordering" = Option<String>, Query, description = "title or publication_date; prefix with - for descending"),
        ("page" = Option<usize>, Query, description = "Page number (default: 1)")
    ),
    responses(
        (status = 200, description = "Page of books", body = BookPage),
        (status = 400, description = "Invalid query parameters", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    OriginalUri(uri): OriginalUri,
    params: ListParams,
) -> AppResult<Json<PaginatedResponse<Book>>> {
    let page = state.services.catalog.list_books(&params).await?;
    Ok(Json(PaginatedResponse::from_page(page, &uri, &params)))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/catalog/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = BookInput,
    responses(
        (status = 201, description = "Book created", body = BookEnvelope),
        (status = 400, description = "Invalid input or unknown authors", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN already exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiJson(input): ApiJson<BookInput>,
) -> AppResult<(StatusCode, Json<ApiSuccess<Book>>)> {
    let book = state.services.catalog.create_book(input).await?;
    Ok((StatusCode::CREATED, ApiSuccess::new(book)))
}

/// Get a book with its authors
#[utoipa::path(
    get,
    path = "/catalog/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = BookEnvelope),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<ApiSuccess<Book>>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(ApiSuccess::new(book))
}

/// Replace a book, including its author set
#[utoipa::path(
    put,
    path = "/catalog/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = BookInput,
    responses(
        (status = 200, description = "Book updated", body = BookEnvelope),
        (status = 400, description = "Invalid input or unknown authors", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN already exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<BookInput>,
) -> AppResult<Json<ApiSuccess<Book>>> {
    let book = state.services.catalog.update_book(id, input).await?;
    Ok(ApiSuccess::new(book))
}

/// Partially update a book; authors are only replaced when `author_ids` is sent
#[utoipa::path(
    patch,
    path = "/catalog/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = BookPatch,
    responses(
        (status = 200, description = "Book updated", body = BookEnvelope),
        (status = 400, description = "Invalid input or unknown authors", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "ISBN already exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn partial_update_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<BookPatch>,
) -> AppResult<Json<ApiSuccess<Book>>> {
    let book = state.services.catalog.partial_update_book(id, patch).await?;
    Ok(ApiSuccess::new(book))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/catalog/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
