//! LRU cache in front of a retriever.
//!
//! Every voter retrieves for the same question at every generation step, so
//! a committee of `m` voters emitting `n` tokens issues `m · n` identical
//! searches. The cache collapses them to one per `(query, k)`.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use super::Retriever;
use crate::voter::CapabilityError;

/// Configuration for the retrieval cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached `(query, k)` entries.
    pub max_entries: usize,
    /// Whether to cache at all.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: crate::config::run::DEFAULT_CACHE_ENTRIES,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Config with `max_entries` capacity; 0 disables the cache.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            max_entries,
            enabled: max_entries > 0,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries.
    pub len: usize,
    /// Capacity (0 when disabled).
    pub cap: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups forwarded to the inner retriever.
    pub misses: u64,
}

/// Retriever wrapper that memoizes results per `(query, k)`.
///
/// Errors from the inner retriever are not cached.
pub struct CachingRetriever<R: ?Sized> {
    inner: Arc<R>,
    cache: Option<Mutex<LruCache<(String, usize), Vec<String>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<R: Retriever + ?Sized> CachingRetriever<R> {
    /// Wrap `inner` with the default cache configuration.
    pub fn new(inner: Arc<R>) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    /// Wrap `inner` with a custom cache configuration.
    pub fn with_config(inner: Arc<R>, config: CacheConfig) -> Self {
        let cache = NonZeroUsize::new(config.max_entries)
            .filter(|_| config.enabled)
            .map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let (len, cap) = self
            .cache
            .as_ref()
            .map(|c| {
                let c = c.lock();
                (c.len(), c.cap().get())
            })
            .unwrap_or((0, 0));
        CacheStats {
            len,
            cap,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }
}

#[async_trait]
impl<R: Retriever + ?Sized> Retriever for CachingRetriever<R> {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, CapabilityError> {
        let key = (query.to_string(), k);

        if let Some(cache) = &self.cache {
            let hit = cache.lock().get(&key).cloned();
            if let Some(hit) = hit {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let passages = self.inner.similarity_search(query, k).await?;

        if let Some(cache) = &self.cache {
            cache.lock().put(key, passages.clone());
        }
        Ok(passages)
    }
}
