//! Consistent-hash sharding — deterministic key→node placement.
//!
//! [`HashRing`] maps arbitrary keys onto a set of named nodes. Each node is
//! projected onto the ring as many virtual points (CRC32 of `"{node}:{i}"`),
//! which smooths the distribution so that removing one of N nodes remaps only
//! roughly 1/N of the keyspace instead of reshuffling everything — the reason
//! to use a ring rather than `hash(key) % N`.
//!
//! The ring owns no I/O; [`ShardedRedisCache`](crate::cache::ShardedRedisCache)
//! layers connections on top of it.

use std::collections::BTreeSet;

use tracing::debug;

use crate::cache::CacheError;

/// Default number of virtual points per node.
///
/// 128 points per node keeps the per-node keyspace share within a few percent
/// of even for small clusters while keeping lookups cheap.
pub const DEFAULT_REPLICAS: usize = 128;

/// A consistent-hash ring mapping keys to named nodes.
///
/// Node identifiers are opaque strings (typically connection URLs). Lookups
/// hash the key with CRC32 and select the first ring point at or after that
/// hash, wrapping around to the smallest point when the hash exceeds every
/// point on the ring.
///
/// The ring is a plain value: topology changes mutate it in place, and callers
/// that need concurrent readers publish immutable snapshots (see
/// [`ShardedRedisCache`](crate::cache::ShardedRedisCache)).
///
/// # Examples
///
/// ```
/// use shardcache::sharding::HashRing;
///
/// let ring = HashRing::new(["cache-a:6379", "cache-b:6379"], 128).unwrap();
/// let node = ring.lookup("user:42").unwrap();
/// assert!(node == "cache-a:6379" || node == "cache-b:6379");
/// // Same key, same node — every time.
/// assert_eq!(ring.lookup("user:42"), Some(node));
/// ```
#[derive(Debug, Clone)]
pub struct HashRing {
    /// Node membership set.
    nodes: BTreeSet<String>,
    /// Virtual points per node.
    replicas: usize,
    /// `(hash, node)` pairs sorted ascending by hash.
    points: Vec<(u32, String)>,
}

impl HashRing {
    /// Builds a ring containing `replicas` virtual points for each node.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Configuration`] if `replicas` is zero.
    pub fn new<I, S>(nodes: I, replicas: usize) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if replicas == 0 {
            return Err(CacheError::Configuration(
                "hash ring requires at least one replica point per node".to_owned(),
            ));
        }

        let mut ring = Self {
            nodes: BTreeSet::new(),
            replicas,
            points: Vec::new(),
        };
        for node in nodes {
            ring.add_node(node.as_ref());
        }
        Ok(ring)
    }

    /// Adds `node` to the ring with its full set of virtual points.
    ///
    /// Re-adding a node that is already a member is a no-op. A point whose
    /// hash value is already occupied on the ring is skipped rather than
    /// silently duplicated.
    pub fn add_node(&mut self, node: &str) {
        if !self.nodes.insert(node.to_owned()) {
            return;
        }

        for i in 0..self.replicas {
            let hash = point_hash(node, i);
            match self.points.binary_search_by_key(&hash, |(h, _)| *h) {
                // Exact hash already present (collision): skip, never duplicate.
                Ok(_) => debug!(node, hash, "skipping colliding ring point"),
                Err(idx) => self.points.insert(idx, (hash, node.to_owned())),
            }
        }
        debug!(node, points = self.points.len(), "added node to ring");
    }

    /// Removes `node` and exactly its virtual points from the ring.
    ///
    /// Removing a node that is not a member is a no-op.
    pub fn remove_node(&mut self, node: &str) {
        if !self.nodes.remove(node) {
            return;
        }
        self.points.retain(|(_, n)| n != node);
        debug!(node, points = self.points.len(), "removed node from ring");
    }

    /// Returns the node owning `key`, or `None` if the ring is empty.
    ///
    /// Never panics and never indexes past the end of the point list: the
    /// search position is wrapped back to the first point when the key's hash
    /// exceeds every point on the ring.
    pub fn lookup<K: AsRef<[u8]>>(&self, key: K) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.position(key_hash(key.as_ref()));
        Some(self.points[idx].1.as_str())
    }

    /// Returns an iterator over node names starting at `key`'s ring position
    /// and walking forward, wrapping once through every point.
    ///
    /// The iterator is finite (one entry per ring point, so nodes repeat) and
    /// restartable per call. Useful for fallback or replica reads: the first
    /// yielded node is the [`lookup`](Self::lookup) owner, subsequent entries
    /// are the nodes that would own the key if their predecessors vanished.
    pub fn nodes_from<K: AsRef<[u8]>>(&self, key: K) -> impl Iterator<Item = &str> {
        let start = if self.points.is_empty() {
            0
        } else {
            self.position(key_hash(key.as_ref()))
        };
        self.points[start..]
            .iter()
            .chain(&self.points[..start])
            .map(|(_, n)| n.as_str())
    }

    /// Returns `true` if `node` is a member of the ring.
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Returns the member node names in sorted order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    /// Returns the number of member nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the total number of virtual points on the ring.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Returns the configured number of virtual points per node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Returns `true` if the ring has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the first point with hash ≥ `hash`, wrapping to 0 past the end.
    ///
    /// Callers must ensure the point list is non-empty.
    fn position(&self, hash: u32) -> usize {
        let idx = self.points.partition_point(|(h, _)| *h < hash);
        if idx == self.points.len() { 0 } else { idx }
    }
}

/// Ring position of virtual point `i` for `node`: CRC32 of `"{node}:{i}"`.
fn point_hash(node: &str, i: usize) -> u32 {
    crc32fast::hash(format!("{node}:{i}").as_bytes())
}

/// Ring position of a lookup key: CRC32 of the key bytes.
fn key_hash(key: &[u8]) -> u32 {
    crc32fast::hash(key)
}
