//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, authors, books, health};

/// Registers the bearer JWT scheme referenced by the catalog endpoints
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Catalog API",
        version = "1.0.0",
        description = "Authors and Books catalog REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::obtain_token,
        auth::refresh_token,
        // Authors
        authors::list_authors,
        authors::create_author,
        authors::get_author,
        authors::update_author,
        authors::partial_update_author,
        authors::delete_author,
        authors::generate_report,
        // Books
        books::list_books,
        books::create_book,
        books::get_book,
        books::update_book,
        books::partial_update_book,
        books::delete_book,
    ),
    components(
        schemas(
            // Auth
            crate::models::token::TokenRequest,
            crate::models::token::RefreshRequest,
            crate::models::token::TokenPair,
            // Authors
            crate::models::author::Author,
            crate::models::author::AuthorSummary,
            crate::models::author::AuthorInput,
            crate::models::author::AuthorPatch,
            crate::api::AuthorEnvelope,
            crate::api::AuthorPage,
            authors::ReportAccepted,
            // Books
            crate::models::book::Book,
            crate::models::book::BookInput,
            crate::models::book::BookPatch,
            crate::api::BookEnvelope,
            crate::api::BookPage,
            // Health
            health::HealthResponse,
            health::ReadinessResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "authors", description = "Author management"),
        (name = "books", description = "Book management")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/api/v1/schema/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
