//! Token endpoints

use axum::{extract::State, Json};
use validator::Validate;

use crate::{
    error::AppResult,
    models::token::{RefreshRequest, TokenPair, TokenRequest},
    AppState,
};

use super::ApiJson;

/// Exchange credentials for an access and refresh token pair
#[utoipa::path(
    post,
    path = "/auth/token",
    tag = "auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Missing fields", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 429, description = "Too many attempts", body = crate::error::ErrorResponse)
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TokenRequest>,
) -> AppResult<Json<TokenPair>> {
    request.validate()?;
    let pair = state.services.auth.issue_tokens(&request.username, &request.password)?;
    Ok(Json(pair))
}

/// Rotate a refresh token; the old one can no longer be used
#[utoipa::path(
    post,
    path = "/auth/token/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or already used", body = crate::error::ErrorResponse)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    request.validate()?;
    let pair = state.services.auth.refresh(&request.refresh)?;
    Ok(Json(pair))
}
