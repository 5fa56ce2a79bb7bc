//! Sliding-window request quotas
//!
//! Catalog requests are counted per authenticated subject, or per client
//! address when no valid token is presented. The token endpoint has its own,
//! stricter per-address quota.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::{config::RateLimitConfig, error::AppError, AppState};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Record a request for `key`; returns whether it is allowed and how
    /// many requests remain in the window
    pub fn allow(&self, key: &str) -> (bool, u32) {
        let now = Instant::now();
        let window = self.window;

        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        let remaining = self.max_requests.saturating_sub(entry.len() as u32);
        if remaining == 0 {
            return (false, 0);
        }

        entry.push(now);
        (true, remaining.saturating_sub(1))
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Drop buckets with no request inside the window
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.buckets
            .retain(|_, hits| hits.iter().any(|instant| now.duration_since(*instant) < window));
    }
}

/// The three quotas the API enforces
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub user: RateLimiter,
    pub anon: RateLimiter,
    pub login: RateLimiter,
}

impl RateLimits {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let window = Duration::from_secs(config.window_seconds);
        Self {
            user: RateLimiter::new(window, config.user_max_requests),
            anon: RateLimiter::new(window, config.anon_max_requests),
            login: RateLimiter::new(
                Duration::from_secs(config.login_window_seconds),
                config.login_max_requests,
            ),
        }
    }

    pub fn prune(&self) {
        self.user.prune();
        self.anon.prune();
        self.login.prune();
    }
}

pub async fn api_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let limits = state.rate_limits.clone();
    let (limiter, key) = match bearer_subject(&state, request.headers()) {
        Some(subject) => (&limits.user, format!("user:{}", subject)),
        None => (&limits.anon, format!("ip:{}", client_ip(&request))),
    };
    enforce(limiter, &key, request, next).await
}

pub async fn login_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = format!("ip:{}", client_ip(&request));
    enforce(&state.rate_limits.login, &key, request, next).await
}

async fn enforce(limiter: &RateLimiter, key: &str, request: Request, next: Next) -> Response {
    let (allowed, remaining) = limiter.allow(key);
    if !allowed {
        tracing::warn!("Rate limit exceeded for {} on {}", key, request.uri().path());
        return AppError::RateLimited {
            retry_after: limiter.retry_after_secs(),
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.limit()));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
    response
}

/// Subject of a valid access token, if the request carries one
fn bearer_subject(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?;
    state.services.auth.verify_access(token).ok().map(|claims| claims.sub)
}

fn client_ip(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
