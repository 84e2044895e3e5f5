//! Hot Tier - In-Memory Store
//!
//! Holds full payloads in a sharded in-memory map. Capacity is enforced by
//! the cache facade, which demotes the least-recently-accessed entry to the
//! warm tier whenever a write pushes the tier over its byte budget.
//!
//! # Design
//!
//! - `ShardedMap` with per-shard `RwLock`s for concurrent reads
//! - Every access stamps a logical sequence number so LRU order is total
//!   even when wall-clock timestamps tie
//! - The hot index lives only in memory

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::entry::{ContentEntry, ContentMetadata, Tier};
use super::shard::{ShardedMap, Weighted};
use super::HOT_SHARD_COUNT;
use crate::domain::ports::TierStore;
use crate::error::Result;

#[derive(Clone)]
struct HotEntry {
    content: Bytes,
    metadata: ContentMetadata,
    /// Logical recency stamp (higher = more recent)
    touched: u64,
}

impl Weighted for HotEntry {
    fn weight(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Hot tier store
pub struct HotStore {
    entries: ShardedMap<String, HotEntry, HOT_SHARD_COUNT>,
    capacity_bytes: u64,
    sequence: AtomicU64,
}

impl HotStore {
    /// Create a hot store with a byte budget
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            entries: ShardedMap::new(),
            capacity_bytes,
            sequence: AtomicU64::new(0),
        }
    }

    #[inline]
    fn next_stamp(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get capacity in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Check if the tier holds more than its budget
    pub fn over_capacity(&self) -> bool {
        self.entries.size_bytes() > self.capacity_bytes
    }

    /// Insert (or replace) an entry
    pub fn insert(&self, key: &str, content: Bytes, metadata: ContentMetadata) {
        let entry = HotEntry {
            content,
            metadata: metadata.in_tier(Tier::Hot),
            touched: self.next_stamp(),
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Record a read and return the payload with its updated metadata
    pub fn touch(&self, key: &str, now: DateTime<Utc>) -> Option<(Bytes, ContentMetadata)> {
        let stamp = self.next_stamp();
        self.entries.update(&key.to_string(), |entry| {
            entry.metadata.base.record_access(now);
            entry.touched = stamp;
            (entry.content.clone(), entry.metadata.clone())
        })
    }

    /// Get an entry without recording an access
    pub fn get(&self, key: &str) -> Option<ContentEntry> {
        self.entries.get(key).map(|e| ContentEntry {
            key: key.to_string(),
            content: e.content,
            metadata: e.metadata,
        })
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> Option<ContentEntry> {
        self.entries.remove(&key.to_string()).map(|e| ContentEntry {
            key: key.to_string(),
            content: e.content,
            metadata: e.metadata,
        })
    }

    /// Least-recently-accessed key, optionally skipping one key
    pub fn lru_candidate(&self, exclude: Option<&str>) -> Option<String> {
        self.entries
            .collect(|key, entry| (key.clone(), entry.metadata.base.last_accessed, entry.touched))
            .into_iter()
            .filter(|(key, _, _)| Some(key.as_str()) != exclude)
            .min_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)))
            .map(|(key, _, _)| key)
    }

    /// Remove everything
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl TierStore for HotStore {
    fn tier(&self) -> Tier {
        Tier::Hot
    }

    async fn write(&self, key: &str, content: Bytes, metadata: ContentMetadata) -> Result<()> {
        self.insert(key, content, metadata);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.get(key).map(|e| e.content))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.remove(key).is_some())
    }

    fn metadata(&self, key: &str) -> Option<ContentMetadata> {
        self.entries.get(key).map(|e| e.metadata)
    }

    fn set_metadata(&self, key: &str, metadata: ContentMetadata) -> bool {
        self.entries
            .update(&key.to_string(), |e| e.metadata = metadata.in_tier(Tier::Hot))
            .is_some()
    }

    fn entries(&self) -> Vec<(String, ContentMetadata)> {
        self.entries
            .collect(|key, entry| (key.clone(), entry.metadata.clone()))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn size_bytes(&self) -> u64 {
        self.entries.size_bytes()
    }
}

// =============================================================================
// Tests
// =============================================================================
