//! List cache backends
//!
//! Entries are serialized result lists keyed by
//! `{namespace}:{entity}_list:g{generation}:{canonical query}`. Every
//! mutation bumps the entity generation, so a list loaded before the bump
//! can only land under a key no later read asks for. Old generations are
//! then dropped by prefix.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

pub const AUTHORS_LIST: &str = "authors_list";
pub const BOOKS_LIST: &str = "books_list";

/// Prefix shared by every cached list of one entity
pub fn list_prefix(namespace: &str, entity: &str) -> String {
    format!("{}:{}:", namespace, entity)
}

pub fn list_key(namespace: &str, entity: &str, generation: u64, canonical: &str) -> String {
    format!("{}g{}:{}", list_prefix(namespace, entity), generation, canonical)
}

/// Counter key; lives outside `list_prefix` so prefix drops keep it
pub fn generation_key(namespace: &str, entity: &str) -> String {
    format!("{}:{}_gen", namespace, entity)
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListCache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Remove every entry whose key starts with `prefix`; returns how many
    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<u64>;

    /// Current value of a generation counter, 0 when never bumped
    async fn generation(&self, key: &str) -> AppResult<u64>;

    /// Increment a generation counter and return the new value
    async fn bump(&self, key: &str) -> AppResult<u64>;

    async fn ping(&self) -> AppResult<()>;
}

/// Escape glob metacharacters for a Redis MATCH pattern
fn escape_pattern(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    /// Create a new Redis cache and check the server answers
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let cache = Self { client };
        cache.ping().await?;
        Ok(cache)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl ListCache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read cache entry: {}", e)))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write cache entry: {}", e)))
    }

    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut conn = self.connection().await?;
        let pattern = escape_pattern(prefix);

        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to scan cache keys: {}", e)))?;

            if !keys.is_empty() {
                let deleted: u64 = conn
                    .del(&keys)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to delete cache keys: {}", e)))?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn generation(&self, key: &str) -> AppResult<u64> {
        let mut conn = self.connection().await?;
        let value: Option<u64> = conn
            .get(key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read cache generation: {}", e)))?;
        Ok(value.unwrap_or(0))
    }

    async fn bump(&self, key: &str) -> AppResult<u64> {
        let mut conn = self.connection().await?;
        conn.incr(key, 1u64)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bump cache generation: {}", e)))
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;
        Ok(())
    }
}

/// In-process cache with per-entry expiry
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Instant, String)>,
    generations: DashMap<String, u64>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListCache for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (expires_at, value) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (expires_at, _)| *expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries
            .insert(key.to_string(), (Instant::now() + ttl, value.to_string()));
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> AppResult<u64> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    async fn generation(&self, key: &str) -> AppResult<u64> {
        Ok(self.generations.get(key).map(|g| *g).unwrap_or(0))
    }

    async fn bump(&self, key: &str) -> AppResult<u64> {
        let mut generation = self.generations.entry(key.to_string()).or_insert(0);
        *generation += 1;
        Ok(*generation)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
