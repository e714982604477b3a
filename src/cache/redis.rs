//! Sharded Redis cache backend.
//!
//! Routes every key through a [`HashRing`] to one of several Redis nodes and
//! speaks to that node over a lazily-established multiplexed connection. Each
//! node is independent: a slow or dead node degrades only the slice of the
//! keyspace it owns, never routing to the others.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CacheBackend, CacheError};
use crate::sharding::{DEFAULT_REPLICAS, HashRing};

/// Configuration for [`ShardedRedisCache`].
///
/// # Examples
///
/// ```
/// use shardcache::cache::ShardedCacheConfig;
///
/// let config = ShardedCacheConfig::with_nodes([
///     "redis://cache-a:6379/0",
///     "redis://cache-b:6379/0",
/// ]);
/// assert_eq!(config.replicas, 128);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardedCacheConfig {
    /// Connection URLs, one per backend node
    /// (`scheme://[credentials@]host:port[/db]`).
    pub nodes: Vec<String>,
    /// Virtual ring points per node.
    pub replicas: usize,
    /// Upper bound on any single backend operation, connect included.
    pub op_timeout: Duration,
}

impl Default for ShardedCacheConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            replicas: DEFAULT_REPLICAS,
            op_timeout: Duration::from_secs(1),
        }
    }
}

impl ShardedCacheConfig {
    /// Convenience constructor: the given node URLs with default tuning.
    pub fn with_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// A [`CacheBackend`] sharded across multiple Redis nodes.
///
/// ## Connection policy
///
/// Connections are lazy: construction only validates each node URL and builds
/// a client handle. TCP connects happen per operation through the client's
/// multiplexed connection, so a cold or unreachable node never blocks startup
/// — its operations degrade to misses/no-ops until it comes back.
///
/// ## Topology changes
///
/// [`add_node`](Self::add_node) and [`remove_node`](Self::remove_node)
/// publish a fresh immutable ring snapshot; in-flight lookups keep reading
/// the previous snapshot and never observe a partially-updated ring. Removing
/// a node also drops its client handle, closing the connection.
pub struct ShardedRedisCache {
    /// Current ring snapshot. Readers clone the `Arc` out and release the
    /// lock before hashing.
    ring: RwLock<Arc<HashRing>>,
    /// Node URL → client handle, created once per node.
    connections: RwLock<HashMap<String, Client>>,
    op_timeout: Duration,
}

impl ShardedRedisCache {
    /// Builds the ring and opens one client handle per configured node.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Configuration`] if the node list is empty or
    ///   `replicas` is zero.
    /// - [`CacheError::Connection`] if a node URL cannot be parsed into a
    ///   client handle.
    pub fn new(config: ShardedCacheConfig) -> Result<Self, CacheError> {
        if config.nodes.is_empty() {
            return Err(CacheError::Configuration(
                "sharded cache requires at least one node".to_owned(),
            ));
        }

        let ring = HashRing::new(&config.nodes, config.replicas)?;
        let mut connections = HashMap::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let client = Client::open(node.as_str()).map_err(|source| CacheError::Connection {
                node: node.clone(),
                source,
            })?;
            connections.insert(node.clone(), client);
        }

        info!(nodes = config.nodes.len(), replicas = config.replicas, "sharded cache ready");
        Ok(Self {
            ring: RwLock::new(Arc::new(ring)),
            connections: RwLock::new(connections),
            op_timeout: config.op_timeout,
        })
    }

    /// Returns the node URL that `key` routes to, or `None` on an empty ring.
    pub fn node_for(&self, key: &str) -> Option<String> {
        let ring = self.ring.read().ok()?.clone();
        ring.lookup(key).map(str::to_owned)
    }

    /// Current node membership, sorted.
    pub fn nodes(&self) -> Vec<String> {
        self.ring
            .read()
            .map(|ring| ring.nodes().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Number of member nodes.
    pub fn node_count(&self) -> usize {
        self.ring.read().map(|ring| ring.node_count()).unwrap_or(0)
    }

    /// Adds a node to the ring and opens its client handle.
    ///
    /// Keys that now route to the new node will start missing until it warms
    /// up; keys owned by other nodes are unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL cannot be parsed; the
    /// ring is left unchanged in that case.
    pub fn add_node(&self, node: &str) -> Result<(), CacheError> {
        let client = Client::open(node).map_err(|source| CacheError::Connection {
            node: node.to_owned(),
            source,
        })?;

        if let (Ok(mut ring), Ok(mut connections)) = (self.ring.write(), self.connections.write()) {
            let mut next = (**ring).clone();
            next.add_node(node);
            *ring = Arc::new(next);
            connections.insert(node.to_owned(), client);
            info!(node, "node added to sharded cache");
        }
        Ok(())
    }

    /// Removes a node from the ring and tears down its connection.
    ///
    /// The new ring snapshot is published first, then the node's client
    /// handle is dropped, which closes the underlying connection. Removing a
    /// node that is not a member is a no-op.
    pub fn remove_node(&self, node: &str) {
        if let (Ok(mut ring), Ok(mut connections)) = (self.ring.write(), self.connections.write()) {
            let mut next = (**ring).clone();
            next.remove_node(node);
            *ring = Arc::new(next);
            if connections.remove(node).is_some() {
                info!(node, "node removed from sharded cache");
            }
        }
    }

    /// Resolves `key` to its node and client handle.
    ///
    /// `None` means the ring is empty or the node has no connection entry —
    /// callers treat both as a routing miss, never an error.
    fn route(&self, key: &str) -> Option<(String, Client)> {
        let ring = self.ring.read().ok()?.clone();
        let node = ring.lookup(key)?.to_owned();
        let client = self.connections.read().ok()?.get(&node).cloned();
        if client.is_none() {
            warn!(%node, "ring node has no connection entry");
        }
        client.map(|client| (node, client))
    }

    /// Runs a backend operation under the configured time bound.
    async fn bound<T>(
        &self,
        op: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(CacheError::Backend(source)),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let Some((node, client)) = self.route(key) else {
            return Ok(None);
        };
        let value: Option<Vec<u8>> = self
            .bound(async move {
                let mut conn = client.get_multiplexed_async_connection().await?;
                conn.get(key).await
            })
            .await?;
        debug!(key, %node, hit = value.is_some(), "sharded get");
        Ok(value.map(Bytes::from))
    }

    async fn try_set(
        &self,
        key: &str,
        value: Bytes,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CacheError> {
        let Some((node, client)) = self.route(key) else {
            return Ok(());
        };
        self.bound(async move {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let result: redis::RedisResult<()> = match ttl_seconds {
                Some(secs) if secs > 0 => conn.set_ex(key, value.as_ref(), secs).await,
                // No TTL means the entry never expires.
                _ => conn.set(key, value.as_ref()).await,
            };
            result
        })
        .await?;
        debug!(key, %node, "sharded set");
        Ok(())
    }

    async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        let Some((node, client)) = self.route(key) else {
            return Ok(());
        };
        let _removed: i64 = self
            .bound(async move {
                let mut conn = client.get_multiplexed_async_connection().await?;
                conn.del(key).await
            })
            .await?;
        debug!(key, %node, "sharded delete");
        Ok(())
    }

    async fn try_exists(&self, key: &str) -> Result<bool, CacheError> {
        let Some((_node, client)) = self.route(key) else {
            return Ok(false);
        };
        let found: i64 = self
            .bound(async move {
                let mut conn = client.get_multiplexed_async_connection().await?;
                conn.exists(key).await
            })
            .await?;
        Ok(found > 0)
    }

    async fn try_clear_node(&self, node: &str, client: Client) -> Result<(), CacheError> {
        self.bound(async move {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let result: redis::RedisResult<()> = redis::cmd("FLUSHDB").query_async(&mut conn).await;
            result
        })
        .await?;
        debug!(node, "flushed node");
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for ShardedRedisCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(key, %error, "cache get degraded to miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: Option<u64>) {
        if let Err(error) = self.try_set(key, value, ttl_seconds).await {
            warn!(key, %error, "cache set dropped");
        }
    }

    async fn delete(&self, keys: &[&str]) {
        // Each key resolves its own node; one bad node must not stop the rest.
        for key in keys {
            if let Err(error) = self.try_delete(key).await {
                warn!(key, %error, "cache delete dropped");
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.try_exists(key).await {
            Ok(found) => found,
            Err(error) => {
                warn!(key, %error, "cache exists degraded to false");
                false
            }
        }
    }

    async fn clear(&self) {
        let connections: Vec<(String, Client)> = self
            .connections
            .read()
            .map(|map| map.iter().map(|(n, c)| (n.clone(), c.clone())).collect())
            .unwrap_or_default();
        for (node, client) in connections {
            if let Err(error) = self.try_clear_node(&node, client).await {
                warn!(%node, %error, "cache clear skipped node");
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "sharded-redis"
    }
}

impl std::fmt::Debug for ShardedRedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedRedisCache")
            .field("nodes", &self.nodes())
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nodes on ports nothing listens on: routing works, I/O degrades.
    fn unreachable_cache() -> ShardedRedisCache {
        let mut config = ShardedCacheConfig::with_nodes([
            "redis://127.0.0.1:6390/0",
            "redis://127.0.0.1:6391/0",
            "redis://127.0.0.1:6392/0",
        ]);
        config.op_timeout = Duration::from_millis(250);
        ShardedRedisCache::new(config).unwrap()
    }

    #[test]
    fn empty_node_list_is_a_configuration_error() {
        let err = ShardedRedisCache::new(ShardedCacheConfig::default()).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn unparsable_node_url_is_a_connection_error() {
        let config = ShardedCacheConfig::with_nodes(["this is not a url"]);
        let err = ShardedRedisCache::new(config).unwrap_err();
        assert!(matches!(err, CacheError::Connection { .. }));
    }

    #[test]
    fn routing_is_deterministic() {
        let cache = unreachable_cache();
        let node = cache.node_for("user:42").unwrap();
        assert!(cache.nodes().contains(&node));
        for _ in 0..100 {
            assert_eq!(cache.node_for("user:42").as_ref(), Some(&node));
        }
    }

    #[tokio::test]
    async fn unreachable_node_degrades_instead_of_failing() {
        let cache = unreachable_cache();
        cache.set("k", "v".into(), Some(60)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.exists("k").await);
        cache.delete(&["k", "other"]).await;
        cache.clear().await;
    }

    #[tokio::test]
    async fn empty_ring_after_removal_is_a_routing_miss() {
        let cache = unreachable_cache();
        for node in cache.nodes() {
            cache.remove_node(&node);
        }
        assert_eq!(cache.node_count(), 0);
        assert_eq!(cache.node_for("k"), None);
        // Miss/no-op, not an error.
        assert_eq!(cache.get("k").await, None);
        cache.set("k", "v".into(), None).await;
        assert!(!cache.exists("k").await);
    }

    #[test]
    fn topology_changes_update_membership() {
        let cache = unreachable_cache();
        assert_eq!(cache.node_count(), 3);

        cache.add_node("redis://127.0.0.1:6393/0").unwrap();
        assert_eq!(cache.node_count(), 4);

        // Re-adding a member changes nothing.
        cache.add_node("redis://127.0.0.1:6393/0").unwrap();
        assert_eq!(cache.node_count(), 4);

        cache.remove_node("redis://127.0.0.1:6393/0");
        assert_eq!(cache.node_count(), 3);

        // Unknown node removal is a no-op.
        cache.remove_node("redis://127.0.0.1:9999/0");
        assert_eq!(cache.node_count(), 3);
    }

    #[test]
    fn removal_only_remaps_the_removed_nodes_keys() {
        let cache = unreachable_cache();
        let keys: Vec<String> = (0..1000).map(|i| format!("key-{i}")).collect();
        let before: Vec<String> = keys.iter().map(|k| cache.node_for(k).unwrap()).collect();

        let removed = "redis://127.0.0.1:6391/0";
        cache.remove_node(removed);

        for (key, owner) in keys.iter().zip(&before) {
            let after = cache.node_for(key).unwrap();
            if owner == removed {
                assert_ne!(&after, removed);
            } else {
                assert_eq!(&after, owner, "{key} should not have moved");
            }
        }
    }
}
