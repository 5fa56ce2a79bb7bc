//! Token issuing and verification

use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::token::{Claims, TokenPair, TokenType},
};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";

#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    /// Refresh token ids already rotated, with their expiry
    revoked: Arc<DashMap<Uuid, i64>>,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            revoked: Arc::new(DashMap::new()),
        }
    }

    /// Check credentials against the configured users and issue a token pair
    pub fn issue_tokens(&self, username: &str, password: &str) -> AppResult<TokenPair> {
        let user = self
            .config
            .users
            .iter()
            .find(|u| u.username == username)
            .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal(format!("Invalid password hash for user {}", user.username)))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_err()
        {
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        tracing::info!("Issued tokens for {}", username);
        self.token_pair(username)
    }

    /// Exchange a refresh token for a new pair; the old refresh token is
    /// revoked
    pub fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = Claims::from_token(refresh_token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(format!("Token is invalid or expired: {}", e)))?;

        if claims.token_type != TokenType::Refresh {
            return Err(AppError::Authentication("Token has wrong type".to_string()));
        }

        self.prune_revoked();
        if self.revoked.insert(claims.jti, claims.exp).is_some() {
            return Err(AppError::Authentication("Token is blacklisted".to_string()));
        }

        self.token_pair(&claims.sub)
    }

    /// Validate an access token from the Authorization header
    pub fn verify_access(&self, token: &str) -> AppResult<Claims> {
        let claims = Claims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(format!("Token is invalid or expired: {}", e)))?;

        if claims.token_type != TokenType::Access {
            return Err(AppError::Authentication("Token has wrong type".to_string()));
        }
        Ok(claims)
    }

    fn token_pair(&self, subject: &str) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access: self.create_token(
                subject,
                TokenType::Access,
                Duration::minutes(self.config.access_token_minutes),
            )?,
            refresh: self.create_token(
                subject,
                TokenType::Refresh,
                Duration::hours(self.config.refresh_token_hours),
            )?,
        })
    }

    fn create_token(&self, subject: &str, token_type: TokenType, lifetime: Duration) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            token_type,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Expired tokens fail validation anyway, so their ids can go
    fn prune_revoked(&self) {
        let now = Utc::now().timestamp();
        self.revoked.retain(|_, exp| *exp > now);
    }
}
