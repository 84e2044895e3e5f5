//! Tier Migration Engine
//!
//! Moves entries between tiers: access-triggered promotion to hot,
//! capacity-triggered LRU demotion out of hot, and the externally scheduled
//! age sweep. Every move writes the target first and removes the source
//! only after the write succeeded, so a failed move leaves the entry where
//! it was.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::entry::{ContentMetadata, EntryKind, Tier};
use super::manager::TieredCache;
use crate::domain::events::{CacheEvent, DemotionReason};
use crate::error::Result;

/// Transition counts from one migration sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Hot entries demoted by age
    pub hot_to_warm: usize,
    /// Warm entries demoted by age
    pub warm_to_cold: usize,
    /// Cold entries promoted by reads since the previous sweep
    pub cold_to_hot: usize,
    /// Warm entries promoted by reads since the previous sweep
    pub warm_to_hot: usize,
    /// Demotions that failed and left the entry in place
    pub failed: usize,
}

impl MigrationReport {
    /// Total demotions performed by the sweep
    pub fn demoted(&self) -> usize {
        self.hot_to_warm + self.warm_to_cold
    }

    /// True when the sweep changed nothing
    pub fn is_empty(&self) -> bool {
        self.demoted() == 0 && self.failed == 0
    }
}

impl TieredCache {
    /// Demote idle entries: hot → warm past `hot_max_age_days`, then
    /// warm → cold past `warm_max_age_days`.
    ///
    /// The warm pass sees entries the hot pass just demoted, so a long-idle
    /// entry can reach cold in one sweep. A hot tier left over budget by an
    /// earlier failed demotion is brought back under it. Per-entry failures
    /// are counted in [`MigrationReport::failed`] and retried on the next
    /// sweep.
    pub async fn run_migration(&self) -> MigrationReport {
        let _guard = self.op_lock.lock().await;
        let now = self.clock.now();
        let policy = self.config.migration.clone();
        let mut report = MigrationReport::default();

        for from in [Tier::Hot, Tier::Warm] {
            let stale: Vec<(String, Tier)> = self
                .tier_store(from)
                .entries()
                .into_iter()
                .filter_map(|(key, meta)| {
                    policy
                        .demotion_target(from, meta.base.days_since_last_access(now))
                        .map(|to| (key, to))
                })
                .collect();

            for (key, to) in stale {
                match self.relocate(&key, from, to, DemotionReason::Age).await {
                    Ok(true) if from == Tier::Hot => report.hot_to_warm += 1,
                    Ok(true) => report.warm_to_cold += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(key = %key, from = %from, to = %to, error = %e, "Demotion failed, entry stays put");
                        if e.is_corruption() {
                            self.metrics.record_corruption();
                        } else {
                            self.metrics.record_io_error();
                        }
                        report.failed += 1;
                    }
                }
            }
        }

        // Retry capacity demotions that failed during earlier writes
        self.enforce_hot_capacity(None, &mut report).await;

        let (warm_to_hot, cold_to_hot) = self.metrics.take_promotions_since_sweep();
        report.warm_to_hot = warm_to_hot as usize;
        report.cold_to_hot = cold_to_hot as usize;

        if let Err(e) = self.flush().await {
            warn!(error = %e, "Failed to persist tier indexes after sweep");
            self.metrics.record_io_error();
        }

        info!(
            hot_to_warm = report.hot_to_warm,
            warm_to_cold = report.warm_to_cold,
            warm_to_hot = report.warm_to_hot,
            cold_to_hot = report.cold_to_hot,
            failed = report.failed,
            "Migration sweep complete"
        );
        report
    }

    /// Move one entry from `from` to the next slower tier `to`.
    ///
    /// Returns `Ok(false)` when the source no longer holds the key.
    pub(super) async fn relocate(
        &self,
        key: &str,
        from: Tier,
        to: Tier,
        reason: DemotionReason,
    ) -> Result<bool> {
        let source = self.tier_store(from);
        let target = self.tier_store(to);

        let Some(metadata) = source.metadata(key) else {
            return Ok(false);
        };
        let Some(content) = source.read(key).await? else {
            return Ok(false);
        };

        target.write(key, content, metadata.in_tier(to)).await?;
        if let Err(e) = self.drop_copy(from, key).await {
            if let Err(rollback) = target.delete(key).await {
                warn!(key, tier = %to, error = %rollback, "Rollback of partial move failed");
            }
            return Err(e);
        }

        self.metrics.record_demotion(from);
        debug!(key, from = %from, to = %to, ?reason, "Demoted entry");
        self.emit(CacheEvent::demoted(key, EntryKind::Content, from, to, reason));
        Ok(true)
    }

    /// Move a freshly read warm/cold entry into hot
    pub(super) async fn promote(
        &self,
        key: &str,
        content: Bytes,
        metadata: ContentMetadata,
        from: Tier,
    ) -> Result<()> {
        self.hot.insert(key, content, metadata);
        if let Err(e) = self.drop_copy(from, key).await {
            self.hot.remove(key);
            return Err(e);
        }

        self.metrics.record_promotion(from);
        debug!(key, from = %from, "Promoted entry to hot tier");
        self.emit(CacheEvent::promoted(key, EntryKind::Content, from, Tier::Hot));

        self.enforce_hot_capacity(Some(key), &mut MigrationReport::default())
            .await;
        Ok(())
    }

    /// Move every hot entry to warm and persist the disk indexes.
    ///
    /// Hot entries live only in memory; call this before dropping a cache
    /// whose contents should survive a restart. An entry that cannot be
    /// written out stays hot and is counted in [`MigrationReport::failed`];
    /// the rest are still spilled and the indexes still flushed.
    pub async fn spill_hot(&self) -> MigrationReport {
        let _guard = self.op_lock.lock().await;
        let mut report = MigrationReport::default();

        let mut keys = self.tier_store(Tier::Hot).entries();
        keys.sort_by_key(|(_, meta)| meta.base.last_accessed);

        for (key, _) in keys {
            match self
                .relocate(&key, Tier::Hot, Tier::Warm, DemotionReason::Shutdown)
                .await
            {
                Ok(true) => report.hot_to_warm += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Spill failed, entry stays in hot tier");
                    self.metrics.record_io_error();
                    report.failed += 1;
                }
            }
        }

        if let Err(e) = self.flush().await {
            warn!(error = %e, "Failed to persist tier indexes after spill");
            self.metrics.record_io_error();
        }
        info!(
            spilled = report.hot_to_warm,
            failed = report.failed,
            "Spilled hot tier to warm"
        );
        report
    }

    /// Demote LRU hot entries to warm until the hot tier fits its budget.
    ///
    /// `protect` is demoted last, only when it alone exceeds the budget.
    /// Stops at the first failed demotion; the tier then stays over budget
    /// until the next write or sweep. Moves and failures are added to
    /// `report`.
    pub(super) async fn enforce_hot_capacity(
        &self,
        protect: Option<&str>,
        report: &mut MigrationReport,
    ) {
        while self.hot.over_capacity() {
            let Some(victim) = self
                .hot
                .lru_candidate(protect)
                .or_else(|| protect.map(str::to_string))
            else {
                break;
            };

            match self
                .relocate(&victim, Tier::Hot, Tier::Warm, DemotionReason::Capacity)
                .await
            {
                Ok(true) => report.hot_to_warm += 1,
                Ok(false) => break,
                Err(e) => {
                    warn!(key = %victim, error = %e, "Capacity demotion failed, hot tier over budget");
                    self.metrics.record_io_error();
                    report.failed += 1;
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::manager::CacheConfig;
    use crate::domain::ports::ManualClock;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> (TieredCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = TieredCache::open_with_clock(CacheConfig::new(dir.path()), clock.clone())
            .await
            .unwrap();
        (cache, clock)
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_eligible_is_noop() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = open(&dir).await;
        cache.store("fresh", &b"data"[..], None).await.unwrap();

        let report = cache.run_migration().await;
        assert!(report.is_empty());
        assert_eq!(report, cache.run_migration().await);
        assert_eq!(cache.tier_of("fresh"), Some(Tier::Hot));
    }

    #[tokio::test]
    async fn test_sweep_demotes_by_age() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open(&dir).await;

        cache.store("stale", &b"stale payload"[..], None).await.unwrap();
        clock.advance(Duration::days(8));
        cache.store("recent", &b"recent payload"[..], None).await.unwrap();

        let report = cache.run_migration().await;
        assert_eq!(report.hot_to_warm, 1);
        assert_eq!(report.warm_to_cold, 0);
        assert_eq!(cache.tier_of("stale"), Some(Tier::Warm));
        assert_eq!(cache.tier_of("recent"), Some(Tier::Hot));

        clock.advance(Duration::days(31));
        let report = cache.run_migration().await;
        assert_eq!(report.hot_to_warm, 1);
        assert_eq!(report.warm_to_cold, 2);
        assert_eq!(cache.tier_of("stale"), Some(Tier::Cold));
        assert_eq!(cache.tier_of("recent"), Some(Tier::Cold));

        let stats = cache.statistics();
        assert_eq!(stats.promotions.hot_to_warm, 2);
        assert_eq!(stats.promotions.warm_to_cold, 2);
        assert_eq!(
            cache.retrieve("stale").await.unwrap().unwrap().as_ref(),
            b"stale payload"
        );
    }

    #[tokio::test]
    async fn test_sweep_reports_cold_promotions() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open(&dir).await;

        cache.store("k", &b"payload"[..], None).await.unwrap();
        clock.advance(Duration::days(40));
        cache.run_migration().await;
        assert_eq!(cache.tier_of("k"), Some(Tier::Cold));

        for _ in 0..3 {
            cache.retrieve("k").await.unwrap().unwrap();
        }
        assert_eq!(cache.tier_of("k"), Some(Tier::Hot));

        let report = cache.run_migration().await;
        assert_eq!(report.cold_to_hot, 1);
        assert_eq!(report.warm_to_hot, 0);
        assert_eq!(cache.run_migration().await.cold_to_hot, 0);
    }

    #[tokio::test]
    async fn test_corrupted_warm_entry_fails_without_aborting_sweep() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open(&dir).await;

        cache.store("bad", &b"will be tampered"[..], None).await.unwrap();
        cache.store("good", &b"stays intact"[..], None).await.unwrap();
        clock.advance(Duration::days(8));
        cache.run_migration().await;

        std::fs::write(cache.warm().data_path("bad").unwrap(), b"garbage").unwrap();

        clock.advance(Duration::days(31));
        let report = cache.run_migration().await;
        assert_eq!(report.warm_to_cold, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(cache.tier_of("bad"), Some(Tier::Warm));
        assert_eq!(cache.tier_of("good"), Some(Tier::Cold));
        assert_eq!(cache.metrics().corruptions, 1);
    }

    #[tokio::test]
    async fn test_spill_hot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (cache, _) = open(&dir).await;
            cache.store("a", &b"alpha"[..], None).await.unwrap();
            cache.store("b", &b"beta"[..], None).await.unwrap();
            let report = cache.spill_hot().await;
            assert_eq!(report.hot_to_warm, 2);
            assert_eq!(report.failed, 0);
            assert_eq!(cache.statistics().hot.count, 0);
        }

        let (reopened, _) = open(&dir).await;
        assert_eq!(reopened.tier_of("a"), Some(Tier::Warm));
        assert_eq!(
            reopened.retrieve("b").await.unwrap().unwrap().as_ref(),
            b"beta"
        );
    }

    #[tokio::test]
    async fn test_spill_continues_past_failing_entry() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open(&dir).await;
        cache.store("bad", &b"cannot land"[..], None).await.unwrap();
        clock.advance(Duration::seconds(1));
        cache.store("good", &b"lands fine"[..], None).await.unwrap();

        // A non-empty directory where the data file goes fails the rename
        let blocked = cache.warm().data_path("bad").unwrap();
        std::fs::create_dir_all(blocked.join("child")).unwrap();

        let report = cache.spill_hot().await;
        assert_eq!(report.hot_to_warm, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(cache.tier_of("bad"), Some(Tier::Hot));
        assert_eq!(cache.tier_of("good"), Some(Tier::Warm));
        assert_eq!(cache.metrics().io_errors, 1);

        std::fs::remove_dir_all(&blocked).unwrap();
        let report = cache.spill_hot().await;
        assert_eq!(report.hot_to_warm, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(
            cache.retrieve("bad").await.unwrap().unwrap().as_ref(),
            b"cannot land"
        );
    }

    #[test]
    fn test_report_helpers() {
        let report = MigrationReport {
            hot_to_warm: 2,
            warm_to_cold: 1,
            ..Default::default()
        };
        assert_eq!(report.demoted(), 3);
        assert!(!report.is_empty());
        assert!(MigrationReport::default().is_empty());

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["hotToWarm"], 2);
    }
}
