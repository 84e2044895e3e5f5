//! Cache Manager - Unified Three-Tier Content Cache
//!
//! Orchestrates the hot (RAM), warm (disk) and cold (compressed disk) tiers.
//! Writes always land in hot; reads probe hot → warm → cold and may promote
//! the entry back to hot. Hot capacity is enforced during every write by
//! demoting the least-recently-accessed entry to warm.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::cold::ColdStore;
use super::compression::{CompressionConfig, CompressionManager};
use super::entry::{ContentMetadata, EntryKind, Tier};
use super::hot::HotStore;
use super::index::file_stem;
use super::metrics::{
    CacheMetrics, CacheStatistics, LatencyTracker, MetricsSnapshot, PromotionCounters,
    TierStatistics,
};
use super::migration::MigrationReport;
use super::policy::{MigrationPolicy, PromotionPolicy};
use super::warm::WarmStore;
use super::DEFAULT_HOT_CAPACITY_BYTES;
use crate::domain::events::CacheEvent;
use crate::domain::ports::{CacheEventListener, Clock, SystemClock, TierStore};
use crate::error::{Error, Result};

/// Content cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory; tiers live in `hot/`, `warm/` and `cold/` below it
    pub base_dir: PathBuf,
    /// Hot tier byte budget
    pub hot_capacity_bytes: u64,
    /// Read-time promotion heuristic
    pub promotion: PromotionPolicy,
    /// Age thresholds for `run_migration`
    pub migration: MigrationPolicy,
    /// Cold tier compression
    pub compression: CompressionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./tiercache"),
            hot_capacity_bytes: DEFAULT_HOT_CAPACITY_BYTES,
            promotion: PromotionPolicy::default(),
            migration: MigrationPolicy::default(),
            compression: CompressionConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Set the hot tier byte budget
    pub fn with_hot_capacity(mut self, bytes: u64) -> Self {
        self.hot_capacity_bytes = bytes;
        self
    }

    /// Parse a YAML document; missing fields keep their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Fail fast on settings the cache cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.hot_capacity_bytes == 0 {
            return Err(Error::Config("hot_capacity_bytes must be positive".into()));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(Error::Config("base_dir must not be empty".into()));
        }
        self.promotion.validate()?;
        self.migration.validate()
    }
}

/// Unified three-tier content cache
pub struct TieredCache {
    pub(super) config: CacheConfig,
    pub(super) hot: HotStore,
    pub(super) warm: WarmStore,
    pub(super) cold: ColdStore,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) metrics: CacheMetrics,
    listeners: RwLock<Vec<Arc<dyn CacheEventListener>>>,
    /// Serializes tier-mutating operations; hot hits bypass it
    pub(super) op_lock: tokio::sync::Mutex<()>,
}

impl TieredCache {
    /// Open a cache with the system clock
    pub async fn open(config: CacheConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Open a cache with an explicit time source.
    ///
    /// Creates `base_dir/{hot,warm,cold}` and loads the warm and cold
    /// indexes left by a previous run.
    pub async fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let base = &config.base_dir;
        tokio::fs::create_dir_all(base.join(Tier::Hot.name())).await?;
        let warm = WarmStore::open(base.join(Tier::Warm.name())).await?;
        let compression = Arc::new(CompressionManager::with_config(config.compression.clone()));
        let cold = ColdStore::open(base.join(Tier::Cold.name()), compression).await?;

        info!(
            base_dir = %base.display(),
            hot_capacity_bytes = config.hot_capacity_bytes,
            warm_entries = warm.len(),
            cold_entries = cold.len(),
            "Opened tiered cache"
        );

        Ok(Self {
            hot: HotStore::new(config.hot_capacity_bytes),
            warm,
            cold,
            clock,
            metrics: CacheMetrics::new(),
            listeners: RwLock::new(Vec::new()),
            op_lock: tokio::sync::Mutex::new(()),
            config,
        })
    }

    /// Register a listener for cache events
    pub fn subscribe(&self, listener: Arc<dyn CacheEventListener>) {
        self.listeners.write().push(listener);
    }

    pub(super) fn emit(&self, event: CacheEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    pub(super) fn tier_store(&self, tier: Tier) -> &dyn TierStore {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    /// Store content under `key`.
    ///
    /// The write lands in the hot tier and replaces any copy held by a
    /// slower tier. When an older disk copy cannot be removed it is
    /// overwritten in place instead, so the key never resolves to two
    /// different payloads. Demotion failures are logged and counted, never
    /// returned.
    pub async fn store(
        &self,
        key: &str,
        content: impl Into<Bytes>,
        owner_id: Option<&str>,
    ) -> Result<()> {
        file_stem(key)?;
        let content = content.into();

        let _guard = self.op_lock.lock().await;
        let now = self.clock.now();
        let metadata =
            ContentMetadata::for_content(&content, owner_id.map(str::to_string), Tier::Hot, now);
        let size = content.len() as u64;

        let mut landed = Tier::Hot;
        for tier in [Tier::Warm, Tier::Cold] {
            let Err(e) = self.drop_copy(tier, key).await else {
                continue;
            };
            warn!(key, tier = %tier, error = %e, "Failed to drop stale copy, overwriting it");
            self.metrics.record_io_error();
            if landed != Tier::Hot {
                return Err(e);
            }
            self.tier_store(tier)
                .write(key, content.clone(), metadata.in_tier(tier))
                .await?;
            landed = tier;
        }

        if landed != Tier::Hot {
            self.hot.remove(key);
            debug!(key, tier = %landed, bytes = size, "Stored entry in place of stale copy");
            self.emit(CacheEvent::stored(key, EntryKind::Content, landed, size));
            return Ok(());
        }

        self.hot.insert(key, content, metadata);
        debug!(key, bytes = size, "Stored entry in hot tier");
        self.emit(CacheEvent::stored(key, EntryKind::Content, Tier::Hot, size));

        self.enforce_hot_capacity(Some(key), &mut MigrationReport::default())
            .await;
        Ok(())
    }

    /// Remove `key` from one tier.
    ///
    /// A delete that fails after the entry already left the tier (only its
    /// index write failed) counts as a removal; the next flush retries the
    /// index.
    pub(super) async fn drop_copy(&self, tier: Tier, key: &str) -> Result<bool> {
        let store = self.tier_store(tier);
        match store.delete(key).await {
            Ok(removed) => Ok(removed),
            Err(e) if !store.contains(key) => {
                warn!(key, tier = %tier, error = %e, "Entry removed but index not persisted");
                self.metrics.record_io_error();
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Read content, probing hot → warm → cold.
    ///
    /// A warm or cold hit that satisfies the promotion policy is moved back
    /// to hot before returning. I/O failures resolve to `Ok(None)`; only
    /// [`Error::Corruption`] is returned as an error.
    pub async fn retrieve(&self, key: &str) -> Result<Option<Bytes>> {
        let tracker = LatencyTracker::start();

        if let Some((content, _)) = self.hot.touch(key, self.clock.now()) {
            self.metrics.record_hit(Tier::Hot, tracker.elapsed());
            return Ok(Some(content));
        }

        let _guard = self.op_lock.lock().await;
        let now = self.clock.now();

        // A promotion may have completed while we waited
        if let Some((content, _)) = self.hot.touch(key, now) {
            self.metrics.record_hit(Tier::Hot, tracker.elapsed());
            return Ok(Some(content));
        }

        for tier in [Tier::Warm, Tier::Cold] {
            let store = self.tier_store(tier);
            let Some(mut metadata) = store.metadata(key) else {
                continue;
            };

            match store.read(key).await {
                Ok(Some(content)) => {
                    metadata.base.record_access(now);
                    store.set_metadata(key, metadata.clone());
                    self.metrics.record_hit(tier, tracker.elapsed());

                    if self.config.promotion.should_promote(&metadata.base, now) {
                        if let Err(e) = self.promote(key, content.clone(), metadata, tier).await {
                            warn!(key, from = %tier, error = %e, "Promotion failed, entry stays put");
                            self.metrics.record_io_error();
                        }
                    }
                    return Ok(Some(content));
                }
                Ok(None) => continue,
                Err(e) if e.is_corruption() => {
                    error!(key, tier = %tier, error = %e, "Corrupted cache entry");
                    self.metrics.record_corruption();
                    self.emit(CacheEvent::corruption(key, tier, e.to_string()));
                    return Err(e);
                }
                Err(e) => {
                    warn!(key, tier = %tier, error = %e, "Read failed, treating as miss");
                    self.metrics.record_io_error();
                    self.metrics.record_miss();
                    return Ok(None);
                }
            }
        }

        self.metrics.record_miss();
        Ok(None)
    }

    /// Locate an entry without recording an access or promoting it
    pub fn peek(&self, key: &str) -> Option<(Tier, ContentMetadata)> {
        Tier::ALL
            .iter()
            .find_map(|tier| self.tier_store(*tier).metadata(key).map(|m| (*tier, m)))
    }

    /// Check if any tier holds `key`
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Tier currently holding `key`
    pub fn tier_of(&self, key: &str) -> Option<Tier> {
        self.peek(key).map(|(tier, _)| tier)
    }

    /// Remove `key` from every tier holding it.
    ///
    /// Every tier is tried even when one fails; the first failure is
    /// returned after the others were cleared.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.op_lock.lock().await;

        let mut removed = false;
        let mut failure = None;
        for tier in Tier::ALL {
            match self.drop_copy(tier, key).await {
                Ok(true) => {
                    debug!(key, tier = %tier, "Deleted entry");
                    self.emit(CacheEvent::deleted(key, EntryKind::Content, tier));
                    removed = true;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(key, tier = %tier, error = %e, "Delete failed");
                    self.metrics.record_io_error();
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Per-tier counts, sizes and access times plus movement totals
    pub fn statistics(&self) -> CacheStatistics {
        let snapshot = self.metrics.snapshot();
        let tier_stats = |tier: Tier| {
            let store = self.tier_store(tier);
            TierStatistics {
                count: store.len(),
                total_size_bytes: store.size_bytes(),
                avg_access_time_ms: self.metrics.avg_access_time_ms(tier),
            }
        };

        CacheStatistics {
            hot: tier_stats(Tier::Hot),
            warm: tier_stats(Tier::Warm),
            cold: tier_stats(Tier::Cold),
            promotions: PromotionCounters::from(&snapshot),
        }
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Remove every entry from every tier
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.hot.clear();
        self.warm.clear().await?;
        self.cold.clear().await?;
        info!("Cleared all tiers");
        Ok(())
    }

    /// Persist pending warm/cold index changes (access counters)
    pub async fn flush(&self) -> Result<()> {
        self.warm.flush().await?;
        self.cold.flush().await
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get reference to the hot tier
    pub fn hot(&self) -> &HotStore {
        &self.hot
    }

    /// Get reference to the warm tier
    pub fn warm(&self) -> &WarmStore {
        &self.warm
    }

    /// Get reference to the cold tier
    pub fn cold(&self) -> &ColdStore {
        &self.cold
    }
}

// =============================================================================
// Tests
// =============================================================================
