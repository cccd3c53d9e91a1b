//! Activation result cache
//!
//! Memoizes evaluator results under structural keys. A head node is keyed
//! by its type and a hash of its own data; a downstream node by its id and
//! a hash of the slice it reads (own data, inbound connections, and the
//! data of each connected source). When any of that changes the key
//! changes, so stale entries are simply orphaned and later swept.
//!
//! # Key Concepts
//!
//! - **Immutable entries**: a write replaces the whole entry
//! - **Fast deactivation**: the evaluator re-checks cached `true` results
//!   cheaply and bypasses the cache when the re-check fails
//! - **Bounded memory**: `sweep` drops stale entries and caps the size,
//!   `invalidate_node` drops a deleted node's downstream entries

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::types::{Connection, NodeSnapshot};

/// Fields the engine writes back itself; they never feed a node's own key
const SELF_WRITTEN_FIELDS: &[&str] = &["isActive"];

/// Which key family an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeyKind {
    Head,
    Downstream,
}

/// A cached activation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// The cached activation
    pub result: bool,
    /// When the entry was written
    pub timestamp: Instant,
    /// Cache-wide write counter at the time of writing
    pub generation: u64,
}

/// Process-wide activation cache
pub struct ActivationCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    max_entries: usize,
    stale_after: Duration,
}

impl ActivationCache {
    /// Create a cache sized from the engine config
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_limits(config.cache_max_entries, config.cache_stale_after())
    }

    /// Create a cache with explicit limits
    pub fn with_limits(max_entries: usize, stale_after: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bypasses: AtomicU64::new(0),
            max_entries: max_entries.max(1),
            stale_after,
        }
    }

    /// Build a cache key
    ///
    /// `identity` is the node type for head keys and the node id for
    /// downstream keys. The optional parts are folded into one hash.
    pub fn cache_key(
        kind: CacheKeyKind,
        identity: &str,
        data: Option<&Value>,
        connections: Option<&[&Connection]>,
        neighbors: Option<&[&NodeSnapshot]>,
    ) -> String {
        let mut hasher = DefaultHasher::new();
        if let Some(data) = data {
            hash_own_data(data, &mut hasher);
        }
        if let Some(connections) = connections {
            for connection in connections {
                connection.hash(&mut hasher);
            }
        }
        if let Some(neighbors) = neighbors {
            for neighbor in neighbors {
                neighbor.id.hash(&mut hasher);
                neighbor.node_type.hash(&mut hasher);
                neighbor.data.to_string().hash(&mut hasher);
            }
        }

        let prefix = match kind {
            CacheKeyKind::Head => "head",
            CacheKeyKind::Downstream => "downstream",
        };
        format!("{}:{}:{:016x}", prefix, identity, hasher.finish())
    }

    /// Key for a head node
    pub fn head_key(node_type: &str, data: &Value) -> String {
        Self::cache_key(CacheKeyKind::Head, node_type, Some(data), None, None)
    }

    /// Key for a downstream node
    pub fn downstream_key(
        node_id: &str,
        node_type: &str,
        data: &Value,
        connections: &[&Connection],
        neighbors: &[&NodeSnapshot],
    ) -> String {
        let identity = format!("{}@{}", node_id, node_type);
        Self::cache_key(
            CacheKeyKind::Downstream,
            &identity,
            Some(data),
            Some(connections),
            Some(neighbors),
        )
    }

    /// Look up an entry
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.read().get(key).copied();
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    /// Store a result, replacing any previous entry for the key
    pub fn set(&self, key: &str, result: bool) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = CacheEntry {
            result,
            timestamp: Instant::now(),
            generation,
        };

        let mut entries = self.entries.write();
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let excess = entries.len() + 1 - self.max_entries;
            evict_oldest(&mut entries, excess);
        }
        entries.insert(key.to_string(), entry);
    }

    /// Whether an entry may be returned without recomputing
    pub fn is_valid(&self, entry: Option<&CacheEntry>, bypass: bool) -> bool {
        match entry {
            Some(entry) => !bypass && entry.timestamp.elapsed() <= self.stale_after,
            None => false,
        }
    }

    /// Count a fast-deactivation bypass
    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop downstream entries for a deleted node
    pub fn invalidate_node(&self, node_id: &str) -> usize {
        let prefix = format!("downstream:{}@", node_id);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        before - entries.len()
    }

    /// Evict entries older than the staleness threshold; returns the number removed
    pub fn sweep(&self, now: Instant) -> usize {
        let stale_after = self.stale_after;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.timestamp) <= stale_after);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            evict_oldest(&mut entries, excess);
        }
        before - entries.len()
    }

    /// Clear the entire cache
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get statistics about the cache
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            generation: self.generation.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the activation cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of live entries
    pub entries: usize,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Cached `true` results discarded by the fast-deactivation re-check
    pub bypasses: u64,
    /// Total writes so far
    pub generation: u64,
}

fn evict_oldest(entries: &mut HashMap<String, CacheEntry>, count: usize) {
    let mut by_age: Vec<(Instant, String)> = entries
        .iter()
        .map(|(key, entry)| (entry.timestamp, key.clone()))
        .collect();
    by_age.sort();
    for (_, key) in by_age.into_iter().take(count) {
        entries.remove(&key);
    }
}

/// Hash node data, skipping the fields the engine writes back itself
fn hash_own_data(data: &Value, hasher: &mut DefaultHasher) {
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                if SELF_WRITTEN_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                key.hash(hasher);
                value.to_string().hash(hasher);
            }
        }
        other => other.to_string().hash(hasher),
    }
}
