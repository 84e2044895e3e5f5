//! Sharded Map Implementation
//!
//! Concurrent hashmap backing the hot tier. Each shard has its own
//! `RwLock`, so reads of unrelated keys never contend.
//!
//! # Design
//!
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - Values report their own weight so byte accounting stays exact on
//!   replacement

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Value stored in a [`ShardedMap`] with a byte weight
pub trait Weighted {
    /// Bytes accounted against capacity
    fn weight(&self) -> u64;
}

/// Single shard containing a hashmap and its accounting
pub struct Shard<K, V> {
    map: RwLock<HashMap<K, V>>,
    size_bytes: AtomicU64,
}

impl<K, V> Default for Shard<K, V> {
    fn default() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            size_bytes: AtomicU64::new(0),
        }
    }
}

impl<K: Eq + Hash, V: Weighted> Shard<K, V> {
    fn len(&self) -> usize {
        self.map.read().len()
    }

    fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    fn insert(&self, key: K, value: V) -> Option<V> {
        let added = value.weight();
        let mut guard = self.map.write();
        let old = guard.insert(key, value);
        let removed = old.as_ref().map(Weighted::weight).unwrap_or(0);

        // Adjust under the write lock so size tracks map contents
        self.size_bytes.fetch_add(added, Ordering::Relaxed);
        self.size_bytes.fetch_sub(removed, Ordering::Relaxed);
        old
    }

    fn remove(&self, key: &K) -> Option<V> {
        let mut guard = self.map.write();
        let removed = guard.remove(key);
        if let Some(v) = &removed {
            self.size_bytes.fetch_sub(v.weight(), Ordering::Relaxed);
        }
        removed
    }

    fn clear(&self) {
        let mut guard = self.map.write();
        guard.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
    }
}

/// Sharded map with a compile-time shard count
pub struct ShardedMap<K, V, const N: usize = 64> {
    shards: Vec<Shard<K, V>>,
}

impl<K, V, const N: usize> Default for ShardedMap<K, V, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, const N: usize> ShardedMap<K, V, N> {
    /// Create a new sharded map
    pub fn new() -> Self {
        assert!(N.is_power_of_two(), "shard count must be a power of two");
        Self {
            shards: (0..N).map(|_| Shard::default()).collect(),
        }
    }

    /// Get the shard count
    #[inline]
    pub const fn shard_count(&self) -> usize {
        N
    }
}

impl<K: Eq + Hash, V: Weighted, const N: usize> ShardedMap<K, V, N> {
    #[inline]
    fn shard_for<Q: Hash + ?Sized>(&self, key: &Q) -> &Shard<K, V> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & (N - 1)]
    }

    /// Get a clone of a value
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shard_for(key).map.read().get(key).cloned()
    }

    /// Check if a key exists
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key).map.read().contains_key(key)
    }

    /// Insert a value, returning the old value if present
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.shard_for(&key).insert(key, value)
    }

    /// Remove a value, returning it if present
    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard_for(key).remove(key)
    }

    /// Mutate a value in place under the shard's write lock.
    ///
    /// The closure must not change the value's weight.
    pub fn update<R, F>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut guard = self.shard_for(key).map.write();
        guard.get_mut(key).map(f)
    }

    /// Total entries across all shards
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total weight across all shards
    pub fn size_bytes(&self) -> u64 {
        self.shards.iter().map(Shard::size_bytes).sum()
    }

    /// Snapshot of all entries, mapped through `f` while each shard is locked
    pub fn collect<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(&K, &V) -> T,
    {
        let mut out = Vec::with_capacity(self.len());
        for shard in &self.shards {
            let guard = shard.map.read();
            out.extend(guard.iter().map(|(k, v)| f(k, v)));
        }
        out
    }

    /// Clear all shards
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.clear();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
