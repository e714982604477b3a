//! # shardcache
//!
//! Consistent-hash sharded cache routing with response-caching middleware
//! for async Rust services.
//!
//! Given a cache key, shardcache deterministically selects one of N backend
//! cache nodes over a [`HashRing`](sharding::HashRing), dispatches
//! `get`/`set`/`delete`/`exists` to it, and keeps the mapping stable as nodes
//! come and go. Layered on top,
//! [`CacheMiddleware`](cache::CacheMiddleware) derives a key from each
//! inbound request (URL + locale, optional namespace), short-circuits with
//! the stored response on a hit, and stores the produced response on a miss.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shardcache::cache::{CacheBackend, ShardedCacheConfig, ShardedRedisCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = ShardedRedisCache::new(ShardedCacheConfig::with_nodes([
//!         "redis://cache-a:6379/0",
//!         "redis://cache-b:6379/0",
//!         "redis://cache-c:6379/0",
//!     ]))?;
//!
//!     cache.set("session:42", "hello".into(), Some(300)).await;
//!     assert_eq!(cache.get("session:42").await.as_deref(), Some(&b"hello"[..]));
//!     Ok(())
//! }
//! ```
//!
//! Cache operations are advisory: a node outage degrades the affected slice
//! of the keyspace to misses/no-ops instead of failing requests. See the
//! [`cache`] module docs for the exact rules.

pub mod cache;
pub mod http;
pub mod middleware;
pub mod sharding;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{
    CacheBackend, CacheError, CacheMiddleware, CachePolicyConfig, InMemoryCache, NullCache,
    ShardedCacheConfig, ShardedRedisCache,
};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use sharding::HashRing;
