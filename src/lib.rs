//! Catalog Server
//!
//! A REST JSON API for managing a catalog of authors and books, with
//! filtered and cached listings, JWT authentication, rate limiting and
//! background report generation.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub rate_limits: Arc<api::rate_limit::RateLimits>,
}

impl AppState {
    pub fn new(config: AppConfig, services: services::Services) -> Self {
        let rate_limits = api::rate_limit::RateLimits::from_config(&config.rate_limit);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
            rate_limits: Arc::new(rate_limits),
        }
    }
}
