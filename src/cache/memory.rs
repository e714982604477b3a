//! Process-local in-memory cache backend.
//!
//! Backed by a concurrent map; entries carry an optional expiration deadline
//! and are evicted lazily when a lookup finds them expired. Suitable for
//! tests and single-process deployments where a shared backend would be
//! overkill.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::CacheBackend;

#[derive(Debug)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|deadline| Instant::now() < deadline)
    }
}

/// In-memory [`CacheBackend`] with per-entry TTL.
///
/// # Examples
///
/// ```
/// use shardcache::cache::{CacheBackend, InMemoryCache};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = InMemoryCache::new();
///     cache.set("greeting", "hello".into(), None).await;
///     assert_eq!(cache.get("greeting").await.as_deref(), Some(&b"hello"[..]));
/// }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, counting expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let (value, expired) = match self.entries.get(key) {
            Some(entry) if entry.is_live() => (Some(entry.value.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            self.entries.remove(key);
        }
        value
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: Option<u64>) {
        let expires_at = ttl_seconds
            .filter(|&secs| secs > 0)
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.insert(key.to_owned(), Entry { value, expires_at });
    }

    async fn delete(&self, keys: &[&str]) {
        for key in keys {
            self.entries.remove(*key);
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live() => return true,
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        false
    }

    async fn clear(&self) {
        self.entries.clear();
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
