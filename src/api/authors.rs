//! Author endpoints

use axum::{
    extract::{OriginalUri, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{query::ListParams, Author, AuthorInput, AuthorPatch},
    AppState,
};

use super::{ApiJson, ApiPath, ApiSuccess, AuthenticatedUser, AuthorEnvelope, AuthorPage, PaginatedResponse};

/// Acknowledgement of a queued report
#[derive(Serialize, ToSchema)]
pub struct ReportAccepted {
    pub author_id: Uuid,
    pub job_id: Uuid,
    /// Always "accepted"
    pub state: &'static str,
}

/// List authors with filters, search, ordering and pagination
#[utoipa::path(
    get,
    path = "/catalog/authors",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(
        ("last_name" = Option<String>, Query, description = "Exact last name"),
        ("birth_date" = Option<String>, Query, description = "Exact birth date (YYYY-MM-DD)"),
        ("search" = Option<String>, Query, description = "Search first name, last name and biography"),
        ("ordering" = Option<String>, Query, description = "last_name, first_name, birth_date or book_count; prefix with - for descending"),
        ("page" = Option<usize>, Query, description = "Page number (default: 1)")
    ),
    responses(
        (status = 200, description = "Page of authors", body = AuthorPage),
        (status = 400, description = "Invalid query parameters", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_authors(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    OriginalUri(uri): OriginalUri,
    params: ListParams,
) -> AppResult<Json<PaginatedResponse<Author>>> {
    let page = state.services.catalog.list_authors(&params).await?;
    Ok(Json(PaginatedResponse::from_page(page, &uri, &params)))
}

/// Create a new author
#[utoipa::path(
    post,
    path = "/catalog/authors",
    tag = "authors",
    security(("bearer_auth" = [])),
    request_body = AuthorInput,
    responses(
        (status = 201, description = "Author created", body = AuthorEnvelope),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_author(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiJson(input): ApiJson<AuthorInput>,
) -> AppResult<(StatusCode, Json<ApiSuccess<Author>>)> {
    let author = state.services.catalog.create_author(input).await?;
    Ok((StatusCode::CREATED, ApiSuccess::new(author)))
}

/// Get an author with its book count
#[utoipa::path(
    get,
    path = "/catalog/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Author ID")),
    responses(
        (status = 200, description = "Author details", body = AuthorEnvelope),
        (status = 404, description = "Author not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_author(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<ApiSuccess<Author>>> {
    let author = state.services.catalog.get_author(id).await?;
    Ok(ApiSuccess::new(author))
}

/// Replace an author's names; optional fields are kept when omitted
#[utoipa::path(
    put,
    path = "/catalog/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Author ID")),
    request_body = AuthorInput,
    responses(
        (status = 200, description = "Author updated", body = AuthorEnvelope),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Author not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_author(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<AuthorInput>,
) -> AppResult<Json<ApiSuccess<Author>>> {
    let author = state.services.catalog.update_author(id, input).await?;
    Ok(ApiSuccess::new(author))
}

/// Partially update an author; `null` clears biography or birth date
#[utoipa::path(
    patch,
    path = "/catalog/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Author ID")),
    request_body = AuthorPatch,
    responses(
        (status = 200, description = "Author updated", body = AuthorEnvelope),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Author not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn partial_update_author(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<AuthorPatch>,
) -> AppResult<Json<ApiSuccess<Author>>> {
    let author = state.services.catalog.partial_update_author(id, patch).await?;
    Ok(ApiSuccess::new(author))
}

/// Delete an author; its books are kept
#[utoipa::path(
    delete,
    path = "/catalog/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Author ID")),
    responses(
        (status = 204, description = "Author deleted"),
        (status = 404, description = "Author not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_author(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_author(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Queue a report for the author and return immediately
#[utoipa::path(
    post,
    path = "/catalog/authors/{id}/generate_report",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Author ID")),
    responses(
        (status = 202, description = "Report queued", body = ReportAccepted),
        (status = 404, description = "Author not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn generate_report(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<(StatusCode, Json<ApiSuccess<ReportAccepted>>)> {
    let author = state.services.catalog.get_author(id).await?;
    let job_id = state.services.reports.enqueue(author.id).await?;
    tracing::info!("Report for author {} requested by {}", author.id, claims.sub);

    Ok((
        StatusCode::ACCEPTED,
        ApiSuccess::new(ReportAccepted {
            author_id: author.id,
            job_id,
            state: "accepted",
        }),
    ))
}
