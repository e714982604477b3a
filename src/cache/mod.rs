//! Caching layer — the uniform cache capability and its backends.
//!
//! The heart of this module is [`CacheBackend`], a small capability trait
//! (`get`/`set`/`delete`/`exists`/`clear`) that all application code and the
//! [`CacheMiddleware`] response policy program against. Three implementations
//! ship with the crate:
//!
//! - [`ShardedRedisCache`] — routes each key through a
//!   [`HashRing`](crate::sharding::HashRing) to one of several Redis nodes.
//! - [`InMemoryCache`] — process-local cache with per-entry TTL, for tests
//!   and single-process deployments.
//! - [`NullCache`] — stores nothing; disables caching without touching call
//!   sites.
//!
//! ## Failure semantics
//!
//! Caching here is *advisory*: a backend outage degrades performance, never
//! correctness. The trait encodes this directly — `get` returns `None` on
//! any failure, `set`/`delete`/`clear` silently drop the operation, and
//! `exists` answers `false`. Implementations log each degradation with
//! `tracing::warn!`. The only fatal errors are construction-time
//! [`CacheError::Configuration`] and [`CacheError::Connection`], which are
//! operator feedback, not per-request concerns.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod key;
pub mod memory;
pub mod null;
pub mod policy;
pub mod redis;

pub use key::derive_cache_key;
pub use memory::InMemoryCache;
pub use null::NullCache;
pub use policy::{CacheMiddleware, CachePolicyConfig};
pub use self::redis::{ShardedCacheConfig, ShardedRedisCache};

/// Errors surfaced by cache construction and internal backend operations.
///
/// Only the construction variants ([`Configuration`](Self::Configuration),
/// [`Connection`](Self::Connection)) ever reach callers of the public API;
/// per-operation failures are logged and degraded at the [`CacheBackend`]
/// boundary.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid parameters at construction (zero replicas, empty node list).
    #[error("invalid cache configuration: {0}")]
    Configuration(String),

    /// A node's connection handle could not be opened at construction.
    #[error("failed to open connection for node {node}: {source}")]
    Connection {
        node: String,
        #[source]
        source: ::redis::RedisError,
    },

    /// A transient per-operation failure talking to a node.
    #[error("cache backend unavailable: {0}")]
    Backend(#[from] ::redis::RedisError),

    /// A backend operation exceeded its configured time bound.
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// The uniform cache capability.
///
/// All operations are best-effort: backend failures never propagate past this
/// boundary (see the [module docs](self) for the degradation rules). Values
/// are opaque byte payloads; key derivation and payload serialization are the
/// caller's concern (see [`derive_cache_key`] and [`CacheMiddleware`]).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the value stored under `key`, or `None` on a miss, an expired
    /// entry, an unroutable key, or a backend failure.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Stores `value` under `key`.
    ///
    /// A positive `ttl_seconds` expires the entry after that many seconds;
    /// `None` (or zero) stores it without expiration. Unroutable keys and
    /// backend failures drop the write silently — losing a cache write must
    /// never fail the caller.
    async fn set(&self, key: &str, value: Bytes, ttl_seconds: Option<u64>);

    /// Deletes each key independently; in a sharded backend the keys may fan
    /// out to multiple nodes. Missing keys and failures are skipped.
    async fn delete(&self, keys: &[&str]);

    /// Returns `true` if `key` currently holds a live entry, `false` on a
    /// miss, an unroutable key, or a backend failure.
    async fn exists(&self, key: &str) -> bool;

    /// Removes every entry from every node, best-effort.
    async fn clear(&self);

    /// Short identifier for logs (`"sharded-redis"`, `"memory"`, `"null"`).
    fn backend_name(&self) -> &'static str;
}
