//! Null cache backend — accepts every operation, stores nothing.
//!
//! Swapping this in disables caching without touching any call site, which
//! is useful in tests and for running an application with caching turned off.

use async_trait::async_trait;
use bytes::Bytes;

use super::CacheBackend;

/// A [`CacheBackend`] that never stores anything.
///
/// Every `get` is a miss, every `exists` is `false`, and writes are accepted
/// and discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl NullCache {
    /// Creates a null cache.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for NullCache {
    async fn get(&self, _key: &str) -> Option<Bytes> {
        None
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl_seconds: Option<u64>) {}

    async fn delete(&self, _keys: &[&str]) {}

    async fn exists(&self, _key: &str) -> bool {
        false
    }

    async fn clear(&self) {}

    fn backend_name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_are_discarded() {
        let cache = NullCache::new();
        cache.set("k", "v".into(), Some(60)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.exists("k").await);
    }
}
