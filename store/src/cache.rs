//! Process-wide embedding-vector cache, keyed by
//! the SHA-256 content hash of the embedding text so it is safe to share
//! across concurrent jobs without invalidation.
//!
//! Two backends: an in-process `DashMap` (always available) and an
//! optional Postgres/`pgvector` table, both behind a narrow trait so
//! callers don't care which is active. When `DATABASE_URL` is unset the
//! cache degrades to
//! the in-memory map — re-embedding after a restart without Postgres
//! configured is an accepted degradation, not a correctness bug, since
//! re-embedding is idempotent.

use crate::config::{DistillConfig, PoolConfig};
use async_trait::async_trait;
use dashmap::DashMap;
use embed::{EmbeddingClient, EmbeddingError};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

/// Content hash of an embedding-input text, used as the cache key. The
/// embedding text's field order and spacing are fixed, so this hash is
/// stable across runs.
#[must_use]
pub fn content_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A content-addressed store of previously computed embedding vectors.
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<f32>>;
    async fn put(&self, key: String, vector: Vec<f32>);
}

/// In-process, read-mostly cache. Never invalidated: the key is
/// content-addressed, so a hit is always correct.
#[derive(Default)]
pub struct InMemoryEmbeddingCache {
    map: DashMap<String, Vec<f32>>,
}

impl InMemoryEmbeddingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingCache for InMemoryEmbeddingCache {
    async fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.map.get(key).map(|v| v.clone())
    }

    async fn put(&self, key: String, vector: Vec<f32>) {
        self.map.insert(key, vector);
    }
}

/// Postgres-backed cache using the `pgvector` extension, with a plain
/// `PoolConfig`-tuned connection pool rather than a typed vector column.
pub struct PostgresEmbeddingCache {
    pool: PgPool,
}

impl PostgresEmbeddingCache {
    /// # Errors
    /// Returns an error if the pool cannot be established or the cache
    /// table cannot be created.
    pub async fn connect(database_url: &str, pool_config: &PoolConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(pool_config.min_connections)
            .max_connections(pool_config.max_connections)
            .acquire_timeout(pool_config.acquire_timeout)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embedding_cache (\
                content_hash TEXT PRIMARY KEY, \
                embedding DOUBLE PRECISION[] NOT NULL, \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()\
            )",
        )
        .execute(&pool)
        .await?;

        info!("connected to embedding cache database");
        Ok(Self { pool })
    }
}

#[async_trait]
impl EmbeddingCache for PostgresEmbeddingCache {
    async fn get(&self, key: &str) -> Option<Vec<f32>> {
        let row: Option<(Vec<f64>,)> = sqlx::query_as("SELECT embedding FROM embedding_cache WHERE content_hash = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "embedding cache read failed");
                None
            });
        row.map(|(v,)| v.into_iter().map(|f| f as f32).collect())
    }

    async fn put(&self, key: String, vector: Vec<f32>) {
        let as_f64: Vec<f64> = vector.into_iter().map(f64::from).collect();
        if let Err(e) = sqlx::query(
            "INSERT INTO embedding_cache (content_hash, embedding) VALUES ($1, $2) \
             ON CONFLICT (content_hash) DO NOTHING",
        )
        .bind(&key)
        .bind(&as_f64)
        .execute(&self.pool)
        .await
        {
            warn!(error = %e, "embedding cache write failed");
        }
    }
}

/// Build the process-wide cache: Postgres if `DATABASE_URL` is set,
/// in-memory otherwise.
pub async fn build_embedding_cache(config: &DistillConfig) -> Arc<dyn EmbeddingCache> {
    if let Some(url) = &config.database_url {
        match PostgresEmbeddingCache::connect(url, &config.pool).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => warn!(error = %e, "failed to connect embedding cache database, falling back to in-memory"),
        }
    }
    Arc::new(InMemoryEmbeddingCache::new())
}

/// Decorates an [`EmbeddingClient`] with the content-addressed cache:
/// cache hits short-circuit the provider call entirely.
pub struct CachingEmbeddingClient<C> {
    inner: C,
    cache: Arc<dyn EmbeddingCache>,
}

impl<C: EmbeddingClient> CachingEmbeddingClient<C> {
    #[must_use]
    pub fn new(inner: C, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl<C: EmbeddingClient> EmbeddingClient for CachingEmbeddingClient<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let key = content_key(text);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }
        let vector = self.inner.embed(text).await?;
        self.cache.put(key, vector.clone()).await;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let keys: Vec<String> = texts.iter().map(|t| content_key(t)).collect();
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        for key in &keys {
            out.push(self.cache.get(key).await);
        }

        let misses: Vec<usize> = out.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(i, _)| i).collect();
        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let computed = self.inner.embed_batch(&miss_texts).await?;
            for (&idx, vector) in misses.iter().zip(computed.into_iter()) {
                self.cache.put(keys[idx].clone(), vector.clone()).await;
                out[idx] = Some(vector);
            }
        }

        Ok(out.into_iter().map(Option::unwrap).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed::MockEmbeddingClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        inner: MockEmbeddingClient,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingClient {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }
    }

    #[tokio::test]
    async fn repeated_text_hits_cache_on_second_call() {
        let cache: Arc<dyn EmbeddingCache> = Arc::new(InMemoryEmbeddingCache::new());
        let client = CachingEmbeddingClient::new(
            CountingClient {
                inner: MockEmbeddingClient::new(4),
                calls: AtomicUsize::new(0),
            },
            cache,
        );

        let a = client.embed("same text").await.unwrap();
        let b = client.embed("same text").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_only_computes_misses() {
        let cache: Arc<dyn EmbeddingCache> = Arc::new(InMemoryEmbeddingCache::new());
        cache.put(content_key("known"), vec![1.0, 2.0]).await;
        let client = CachingEmbeddingClient::new(MockEmbeddingClient::new(2), cache);

        let out = client
            .embed_batch(&["known".to_string(), "unknown".to_string()])
            .await
            .unwrap();
        assert_eq!(out[0], vec![1.0, 2.0]);
        assert_eq!(out.len(), 2);
    }
}
