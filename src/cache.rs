// src/cache.rs

//! Cache-aside layer for the filter metadata snapshot.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::{
    error::AppError,
    models::quiz::FilterSnapshot,
    store::{QuizRepository, Store},
};

/// Key under which the serialized [`FilterSnapshot`] is cached.
pub const FILTER_SNAPSHOT_KEY: &str = "quizzes:available-filters";

/// The cache backend could not serve a request. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Opaque string-keyed cache with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process TTL cache. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Cache-aside view of the distinct filter values across approved quizzes.
///
/// The cache is an optimization only: without a backend, or when the backend
/// errors, reads recompute from the store and invalidation does nothing.
///
/// Invalidation reaches exactly the instances that share the backend.
/// [`MemoryCache`] lives in one process, so several replicas in front of one
/// `PgStore` each keep their own snapshot and may serve a stale one for up to
/// `ttl` after another replica's write. Keep the TTL short in that setup, or
/// plug a shared [`CacheStore`] in here.
#[derive(Clone)]
pub struct FilterCache {
    backend: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl FilterCache {
    pub fn new(backend: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns the cached snapshot, recomputing and storing it on a miss.
    pub async fn read(&self, store: &dyn Store) -> Result<FilterSnapshot, AppError> {
        let Some(backend) = &self.backend else {
            return store.available_filters().await;
        };

        match backend.get(FILTER_SNAPSHOT_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<FilterSnapshot>(&raw) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => tracing::warn!("Discarding unreadable filter snapshot: {}", e),
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Filter cache read failed, recomputing: {}", e);
                return store.available_filters().await;
            }
        }

        let snapshot = store.available_filters().await?;

        match serde_json::to_string(&snapshot) {
            Ok(raw) => {
                if let Err(e) = backend.set(FILTER_SNAPSHOT_KEY, raw, self.ttl).await {
                    tracing::warn!("Failed to store filter snapshot: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize filter snapshot: {}", e),
        }

        Ok(snapshot)
    }

    /// Evicts the snapshot; the next read recomputes it.
    pub async fn invalidate(&self) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.delete(FILTER_SNAPSHOT_KEY).await {
                tracing::warn!("Failed to invalidate filter snapshot: {}", e);
            }
        }
    }
}
