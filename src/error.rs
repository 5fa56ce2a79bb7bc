//! Error types for the catalog server

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::{
        header::{RETRY_AFTER, WWW_AUTHENTICATE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Machine-readable error codes carried in the error envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BusinessError,
    Invalid,
    NotFound,
    Conflict,
    NotAuthenticated,
    Throttled,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BusinessError => "business_error",
            ErrorCode::Invalid => "invalid",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::NotAuthenticated => "not_authenticated",
            ErrorCode::Throttled => "throttled",
            ErrorCode::ServerError => "server_error",
        }
    }

    /// Generic, client-facing message for the code
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::BusinessError => "Business rule violation.",
            ErrorCode::Invalid => "Invalid input.",
            ErrorCode::NotFound => "Resource not found.",
            ErrorCode::Conflict => "Resource already exists.",
            ErrorCode::NotAuthenticated => "Authentication credentials were not provided or are invalid.",
            ErrorCode::Throttled => "Request was throttled.",
            ErrorCode::ServerError => "An unexpected server error occurred.",
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input; details map field names to messages
    #[error("Validation error: {0}")]
    Validation(Value),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Business rule violation: {message}")]
    BusinessRule { message: String, details: Value },

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
}

impl AppError {
    /// Business rule violation whose details are the message itself
    pub fn business_rule(message: impl Into<String>) -> Self {
        let message = message.into();
        AppError::BusinessRule {
            details: Value::String(message.clone()),
            message,
        }
    }

    /// Validation error on a single field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut details = serde_json::Map::new();
        details.insert(field.to_string(), Value::Array(vec![Value::String(message.into())]));
        AppError::Validation(Value::Object(details))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(_) => ErrorCode::NotAuthenticated,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Validation(_) => ErrorCode::Invalid,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::BusinessRule { .. } => ErrorCode::BusinessError,
            AppError::RateLimited { .. } => ErrorCode::Throttled,
            AppError::Database(_) | AppError::Internal(_) => ErrorCode::ServerError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::BusinessError | ErrorCode::Invalid => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::Throttled => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Store errors are mapped onto the closest domain error: uniqueness
/// violations become conflicts, dangling references become business errors.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict(match db_err.constraint() {
                    Some("books_isbn_key") => "A book with this ISBN already exists".to_string(),
                    _ => "Resource violates a uniqueness constraint".to_string(),
                });
            }
            if db_err.is_foreign_key_violation() {
                return AppError::business_rule("Referenced resource does not exist");
            }
        }
        if let sqlx::Error::RowNotFound = err {
            return AppError::NotFound("Resource not found".to_string());
        }
        AppError::Database(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details = serde_json::Map::new();
        for (field, field_errors) in errors.field_errors() {
            let messages = field_errors
                .iter()
                .map(|e| {
                    Value::String(
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string()),
                    )
                })
                .collect();
            details.insert(field.to_string(), Value::Array(messages));
        }
        AppError::Validation(Value::Object(details))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid_field("body", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::NotFound(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always "error"
    pub status: &'static str,
    pub message: String,
    pub code: &'static str,
    #[schema(value_type = Object)]
    pub details: Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let retry_after = match &self {
            AppError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        let details = match self {
            AppError::Authentication(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                Value::String(msg)
            }
            AppError::Validation(details) => details,
            AppError::BusinessRule { details, .. } => details,
            AppError::RateLimited { retry_after } => {
                Value::String(format!("Expected available in {} seconds.", retry_after))
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                Value::String("Database error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                Value::String("Internal server error".to_string())
            }
        };

        let body = Json(ErrorResponse {
            status: "error",
            message: code.message().to_string(),
            code: code.as_str(),
            details,
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer realm=\"api\""));
        }
        if let Some(secs) = retry_after {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
