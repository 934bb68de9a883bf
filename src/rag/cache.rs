//! Embedding Cache for RAG Pipeline
//!
//! Re-ingesting a document or repeating a query should not pay for the same
//! embedding twice. [`CachedEmbedder`] sits in front of any [`Embedder`] and
//! only forwards texts it has not seen.
//!
//! # Cache Key Strategy
//!
//! Keys are the hex SHA-256 of `model \0 text`, so the same text embedded by
//! two models never collides and keys are stable across restarts.
//!
//! # Example
//!
//! ```ignore
//! use ragchain::rag::cache::{CachedEmbedder, LruEmbeddingCache};
//!
//! let cache = Arc::new(LruEmbeddingCache::new(10_000)?);
//! let embedder = CachedEmbedder::new(openai_embedder, cache);
//!
//! let first = embedder.embed("hello world").await?;  // remote call
//! let again = embedder.embed("hello world").await?;  // served from cache
//! assert_eq!(embedder.stats().hits, 1);
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::rag::embeddings::Embedder;
use crate::types::{AppError, Result};

// ============================================================================
// Cache Types
// ============================================================================

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Number of entries in cache
    pub entry_count: usize,
    /// Entries dropped to make room for new ones
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

// ============================================================================
// Cache Trait
// ============================================================================

pub trait EmbeddingCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<f32>>;

    fn set(&self, key: &str, embedding: Vec<f32>);

    fn invalidate(&self, key: &str);

    fn clear(&self);

    fn stats(&self) -> CacheStats;

    fn is_enabled(&self) -> bool;

    /// Compute a cache key for the given text and model
    fn compute_key(&self, text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

// ============================================================================
// LRU Embedding Cache
// ============================================================================

/// In-memory LRU cache bounded by entry count.
pub struct LruEmbeddingCache {
    cache: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LruEmbeddingCache {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            AppError::InvalidInput("Embedding cache capacity must be at least 1".to_string())
        })?;
        Ok(Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl EmbeddingCache for LruEmbeddingCache {
    fn get(&self, key: &str) -> Option<Vec<f32>> {
        let found = self.cache.lock().get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn set(&self, key: &str, embedding: Vec<f32>) {
        let displaced = self.cache.lock().push(key.to_string(), embedding);
        // `push` hands back either the old value for this key or the evicted LRU entry.
        if matches!(displaced, Some((old_key, _)) if old_key != key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn invalidate(&self, key: &str) {
        self.cache.lock().pop(key);
    }

    fn clear(&self) {
        self.cache.lock().clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.cache.lock().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

// ============================================================================
// No-Op Cache
// ============================================================================

/// A cache that stores nothing; used when `cache_capacity = 0`.
#[derive(Debug, Default)]
pub struct NoOpCache;

impl EmbeddingCache for NoOpCache {
    fn get(&self, _key: &str) -> Option<Vec<f32>> {
        None
    }

    fn set(&self, _key: &str, _embedding: Vec<f32>) {}

    fn invalidate(&self, _key: &str) {}

    fn clear(&self) {}

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the cache described by a capacity: LRU when positive, no-op at 0.
pub fn cache_for_capacity(capacity: usize) -> Result<Arc<dyn EmbeddingCache>> {
    if capacity == 0 {
        Ok(Arc::new(NoOpCache))
    } else {
        Ok(Arc::new(LruEmbeddingCache::new(capacity)?))
    }
}

// ============================================================================
// Cached Embedder
// ============================================================================

/// Wraps an embedder so repeated texts are served from cache.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Arc<dyn EmbeddingCache>,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    /// Misses are sent to the inner embedder in a single batch, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.inner.model_name();
        let keys: Vec<String> = texts
            .iter()
            .map(|text| self.cache.compute_key(text, model))
            .collect();

        let mut results: Vec<Option<Vec<f32>>> =
            keys.iter().map(|key| self.cache.get(key)).collect();
        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, hit)| hit.is_none())
            .map(|(i, _)| i)
            .collect();

        debug!(
            total = texts.len(),
            misses = missing.len(),
            "embedding cache lookup"
        );

        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&batch).await?;
            if fresh.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "Embedder returned {} vectors for {} inputs",
                    fresh.len(),
                    batch.len()
                )));
            }
            for (&i, embedding) in missing.iter().zip(fresh) {
                self.cache.set(&keys[i], embedding.clone());
                results[i] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| AppError::Internal("Embedding slot left empty".into())))
            .collect()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

// ============================================================================
// Tests
// ============================================================================
