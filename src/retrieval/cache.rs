//! Retrieval Cache
//!
//! Caches query results keyed by fingerprint, with a fallback cosine
//! similarity scan over the stored query embeddings. Entries carry a tier
//! label driven by their access count, and each tier has its own TTL
//! measured from the last access.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::fingerprint::QueryDescriptor;
use super::metrics::{HitKind, RetrievalMetrics, RetrievalMetricsSnapshot};
use super::similarity::{is_valid_embedding, SimilarityIndex};
use crate::cache::{write_atomic, AccessTierPolicy, EntryKind, EntryMetadata, LatencyTracker, RetrievalMetadata, Tier};
use crate::domain::events::CacheEvent;
use crate::domain::ports::{CacheEventListener, Clock, SystemClock};
use crate::error::{Error, Result};

const SNAPSHOT_VERSION: u32 = 1;

// =============================================================================
// Configuration
// =============================================================================

/// Per-tier time-to-live in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTtl {
    pub hot: u64,
    pub warm: u64,
    pub cold: u64,
}

impl Default for TierTtl {
    fn default() -> Self {
        Self {
            hot: 3600,
            warm: 1800,
            cold: 600,
        }
    }
}

impl TierTtl {
    /// TTL for `tier` in seconds
    pub fn seconds(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Hot => self.hot,
            Tier::Warm => self.warm,
            Tier::Cold => self.cold,
        }
    }

    /// TTLs must be positive and shrink with tier depth
    pub fn validate(&self) -> Result<()> {
        if self.hot == 0 || self.warm == 0 || self.cold == 0 {
            return Err(Error::Config("tier TTLs must be positive".into()));
        }
        if !(self.hot >= self.warm && self.warm >= self.cold) {
            return Err(Error::Config(format!(
                "tier TTLs must satisfy hot >= warm >= cold (got {}/{}/{})",
                self.hot, self.warm, self.cold
            )));
        }
        Ok(())
    }
}

/// Retrieval cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum entries before LRU eviction
    pub max_entries: usize,
    /// Minimum cosine similarity for a similarity hit
    pub similarity_threshold: f32,
    /// Access-count tier thresholds
    #[serde(flatten)]
    pub tiers: AccessTierPolicy,
    /// Per-tier TTL
    pub ttl: TierTtl,
    /// Required embedding length, if fixed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            similarity_threshold: 0.9,
            tiers: AccessTierPolicy::default(),
            ttl: TierTtl::default(),
            dimensions: None,
        }
    }
}

impl RetrievalConfig {
    /// Set maximum entries
    #[must_use]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set similarity threshold
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Require embeddings of a fixed length
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::Config("max_entries must be positive".into()));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.dimensions == Some(0) {
            return Err(Error::Config("dimensions must be positive".into()));
        }
        self.tiers.validate()?;
        self.ttl.validate()
    }
}

// =============================================================================
// Entries
// =============================================================================

/// A cached query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalEntry {
    /// Fingerprint
    pub key: String,
    /// Query that produced the result
    pub descriptor: QueryDescriptor,
    /// Opaque result payload
    pub result: Value,
    /// Query embedding
    pub embedding: Vec<f32>,
    /// Timestamps, access count, tier label and backend
    pub metadata: RetrievalMetadata,
}

impl RetrievalEntry {
    fn tier(&self) -> Tier {
        self.metadata.base.tier
    }

    fn is_expired(&self, ttl: &TierTtl, now: DateTime<Utc>) -> bool {
        self.metadata.base.idle_seconds(now) > ttl.seconds(self.tier()) as f64
    }
}

/// A successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    /// Cached result
    pub result: Value,
    /// Key of the entry that matched
    pub key: String,
    /// 1.0 for fingerprint matches, cosine similarity otherwise
    pub similarity: f32,
    /// Tier label after this access
    pub tier: Tier,
}

/// Which entries `invalidate` removes.
///
/// An entry matches when any populated criterion matches it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationCriteria {
    /// Remove everything
    pub all: bool,
    pub owner_id: Option<String>,
    pub backend_label: Option<String>,
    /// Any overlap with the entry's tags
    pub tags: Vec<String>,
}

impl InvalidationCriteria {
    pub fn all() -> Self {
        Self {
            all: true,
            ..Default::default()
        }
    }

    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Default::default()
        }
    }

    pub fn backend(label: impl Into<String>) -> Self {
        Self {
            backend_label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    fn matches(&self, entry: &RetrievalEntry) -> bool {
        if self.all {
            return true;
        }
        let owner = self
            .owner_id
            .as_deref()
            .is_some_and(|o| entry.descriptor.owner_id.as_deref() == Some(o));
        let backend = self
            .backend_label
            .as_deref()
            .is_some_and(|b| entry.metadata.backend_label == b);
        let tagged = self.tags.iter().any(|t| entry.descriptor.tags.contains(t));
        owner || backend || tagged
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: Vec<&'a RetrievalEntry>,
}

#[derive(Deserialize)]
struct SnapshotFile {
    version: u32,
    entries: Vec<Value>,
}

// =============================================================================
// Cache
// =============================================================================

/// Similarity-aware retrieval cache
pub struct RetrievalCache {
    config: RetrievalConfig,
    index: SimilarityIndex,
    entries: RwLock<HashMap<String, RetrievalEntry>>,
    clock: Arc<dyn Clock>,
    metrics: RetrievalMetrics,
    listeners: RwLock<Vec<Arc<dyn CacheEventListener>>>,
}

impl RetrievalCache {
    /// Create a cache with the system clock
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit time source
    pub fn with_clock(config: RetrievalConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index: SimilarityIndex::new(config.similarity_threshold),
            config,
            entries: RwLock::new(HashMap::new()),
            clock,
            metrics: RetrievalMetrics::new(),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Register a listener for cache events
    pub fn subscribe(&self, listener: Arc<dyn CacheEventListener>) {
        self.listeners.write().push(listener);
    }

    fn emit_all(&self, events: Vec<CacheEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for event in &events {
            for listener in &listeners {
                listener.on_event(event);
            }
        }
    }

    /// Look up a result by fingerprint, falling back to a similarity scan
    /// when `embedding` is given
    pub fn get(&self, key: &str, embedding: Option<&[f32]>) -> Option<Value> {
        self.get_with_similarity(key, embedding, None)
            .map(|hit| hit.result)
    }

    /// Look up a result and report how it matched.
    ///
    /// `owner_id` attributes the lookup, hit or miss, in the per-owner
    /// metrics; anonymous lookups only count globally.
    pub fn get_with_similarity(
        &self,
        key: &str,
        embedding: Option<&[f32]>,
        owner_id: Option<&str>,
    ) -> Option<RetrievalHit> {
        let tracker = LatencyTracker::start();
        let now = self.clock.now();
        let mut events = Vec::new();

        let outcome = {
            let mut entries = self.entries.write();

            // Exact fingerprint match
            let exact = entries
                .get(key)
                .map(|e| (e.is_expired(&self.config.ttl, now), e.tier()));
            let mut found = match exact {
                Some((true, tier)) => {
                    entries.remove(key);
                    self.metrics.record_expirations(1);
                    events.push(CacheEvent::expired(key, EntryKind::Retrieval, tier));
                    None
                }
                Some((false, _)) => Some((key.to_string(), 1.0, HitKind::Exact)),
                None => None,
            };

            // Similarity scan over live entries
            if found.is_none() {
                if let Some(query) = embedding {
                    let ttl = self.config.ttl;
                    let scan = self.index.best_match(
                        query,
                        entries
                            .values()
                            .filter(|e| !e.is_expired(&ttl, now))
                            .map(|e| (e.key.as_str(), e.embedding.as_slice())),
                    );
                    if scan.skipped > 0 {
                        debug!(skipped = scan.skipped, "Similarity scan skipped incomparable entries");
                        self.metrics.record_skipped(scan.skipped);
                    }
                    found = scan
                        .best
                        .map(|(matched, similarity)| (matched, similarity, HitKind::Similarity));
                }
            }

            found.and_then(|(matched, similarity, kind)| {
                let entry = entries.get_mut(&matched)?;
                let from = entry.tier();
                entry.metadata.base.record_access(now);
                let to = self.config.tiers.tier_for(entry.metadata.base.access_count);
                entry.metadata.base.tier = to;
                if to != from {
                    events.push(CacheEvent::promoted(
                        matched.clone(),
                        EntryKind::Retrieval,
                        from,
                        to,
                    ));
                }
                Some((
                    RetrievalHit {
                        result: entry.result.clone(),
                        key: matched,
                        similarity,
                        tier: to,
                    },
                    kind,
                ))
            })
        };

        self.emit_all(events);

        match outcome {
            Some((hit, kind)) => {
                self.metrics.record_hit(kind, owner_id, tracker.elapsed());
                debug!(key, matched = %hit.key, similarity = hit.similarity, tier = %hit.tier, "Retrieval cache hit");
                Some(hit)
            }
            None => {
                self.metrics.record_miss(owner_id, tracker.elapsed());
                None
            }
        }
    }

    /// Cache a result.
    ///
    /// New entries start in the cold tier. When the cache is full the
    /// globally least-recently-accessed entry is evicted first.
    pub fn set(
        &self,
        key: &str,
        descriptor: QueryDescriptor,
        result: Value,
        embedding: Vec<f32>,
        backend_label: &str,
    ) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey(key.to_string()));
        }
        self.check_embedding(&embedding)?;

        let now = self.clock.now();
        let size_bytes = serde_json::to_vec(&result)?.len() as u64;
        let entry = RetrievalEntry {
            key: key.to_string(),
            descriptor,
            result,
            embedding,
            metadata: RetrievalMetadata {
                base: EntryMetadata::new(size_bytes, Tier::Cold, now),
                backend_label: backend_label.to_string(),
            },
        };

        let mut events = Vec::new();
        self.insert_entry(entry, &mut events);
        events.push(CacheEvent::stored(key, EntryKind::Retrieval, Tier::Cold, size_bytes));
        self.emit_all(events);
        Ok(())
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<()> {
        if !is_valid_embedding(embedding) {
            return Err(Error::InvalidEmbedding(
                "embedding must be non-empty with finite components".into(),
            ));
        }
        if let Some(expected) = self.config.dimensions {
            if embedding.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        Ok(())
    }

    fn insert_entry(&self, entry: RetrievalEntry, events: &mut Vec<CacheEvent>) {
        let mut entries = self.entries.write();
        if !entries.contains_key(&entry.key) {
            while entries.len() >= self.config.max_entries {
                let Some(victim) = entries
                    .values()
                    .min_by(|a, b| {
                        a.metadata
                            .base
                            .last_accessed
                            .cmp(&b.metadata.base.last_accessed)
                            .then_with(|| a.key.cmp(&b.key))
                    })
                    .map(|e| e.key.clone())
                else {
                    break;
                };
                if let Some(evicted) = entries.remove(&victim) {
                    debug!(key = %victim, tier = %evicted.tier(), "Evicted LRU retrieval entry");
                    self.metrics.record_eviction();
                    events.push(CacheEvent::evicted(victim, EntryKind::Retrieval, evicted.tier()));
                }
            }
        }
        entries.insert(entry.key.clone(), entry);
    }

    /// Remove entries matching `criteria`, returning how many were removed
    pub fn invalidate(&self, criteria: &InvalidationCriteria) -> usize {
        let count = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !criteria.matches(entry));
            before - entries.len()
        };

        if count > 0 {
            info!(count, "Invalidated retrieval entries");
            self.metrics.record_invalidations(count);
            self.emit_all(vec![CacheEvent::invalidated(count)]);
        }
        count
    }

    /// Drop every entry past its tier TTL
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.ttl;
        let expired: Vec<(String, Tier)> = {
            let mut entries = self.entries.write();
            let doomed: Vec<(String, Tier)> = entries
                .values()
                .filter(|e| e.is_expired(&ttl, now))
                .map(|e| (e.key.clone(), e.tier()))
                .collect();
            for (key, _) in &doomed {
                entries.remove(key);
            }
            doomed
        };

        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired retrieval entries");
            self.metrics.record_expirations(expired.len());
        }
        let count = expired.len();
        self.emit_all(
            expired
                .into_iter()
                .map(|(key, tier)| CacheEvent::expired(key, EntryKind::Retrieval, tier))
                .collect(),
        );
        count
    }

    /// Number of entries (including expired ones not yet purged)
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tier label of an entry
    pub fn entry_tier(&self, key: &str) -> Option<Tier> {
        self.entries.read().get(key).map(RetrievalEntry::tier)
    }

    /// Copy of an entry, without recording an access
    pub fn entry(&self, key: &str) -> Option<RetrievalEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> RetrievalMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Get configuration
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Write every entry to a JSON snapshot file
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let (encoded, count) = {
            let entries = self.entries.read();
            let snapshot = SnapshotRef {
                version: SNAPSHOT_VERSION,
                entries: entries.values().collect(),
            };
            (serde_json::to_vec(&snapshot)?, entries.len())
        };
        write_atomic(path.as_ref(), &encoded).await?;
        info!(path = %path.as_ref().display(), count, "Saved retrieval snapshot");
        Ok(count)
    }

    /// Load entries from a snapshot file, returning how many were accepted.
    ///
    /// Entries that fail to decode or carry unusable embeddings are skipped.
    /// Loaded entries replace existing ones with the same key.
    pub async fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let file: SnapshotFile = serde_json::from_slice(&raw)?;
        if file.version != SNAPSHOT_VERSION {
            return Err(Error::Internal(format!(
                "unsupported snapshot version {}",
                file.version
            )));
        }

        let mut loaded = 0;
        let mut skipped = 0;
        let mut events = Vec::new();
        for value in file.entries {
            let entry = match serde_json::from_value::<RetrievalEntry>(value) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable snapshot entry");
                    skipped += 1;
                    continue;
                }
            };
            if entry.key.is_empty() || self.check_embedding(&entry.embedding).is_err() {
                warn!(key = %entry.key, "Skipping snapshot entry with unusable embedding");
                skipped += 1;
                continue;
            }
            self.insert_entry(entry, &mut events);
            loaded += 1;
        }
        self.emit_all(events);

        info!(path = %path.as_ref().display(), loaded, skipped, "Loaded retrieval snapshot");
        Ok(loaded)
    }
}

// =============================================================================
// Tests
// =============================================================================
