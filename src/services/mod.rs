//! Business logic services

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod pagination;
pub mod reports;

use std::{sync::Arc, time::Duration};

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub reports: Arc<dyn reports::JobQueue>,
}

impl Services {
    /// Create all services over the given store, cache and job queue
    pub fn new(
        config: &AppConfig,
        repository: Repository,
        cache: Arc<dyn cache::ListCache>,
        reports: Arc<dyn reports::JobQueue>,
    ) -> Self {
        Self {
            auth: auth::AuthService::new(config.auth.clone()),
            catalog: catalog::CatalogService::new(
                repository,
                cache,
                config.cache.namespace.clone(),
                Duration::from_secs(config.cache.ttl_seconds),
                config.pagination.page_size,
            ),
            reports,
        }
    }
}
