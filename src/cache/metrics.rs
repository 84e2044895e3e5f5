//! Cache Metrics Collection
//!
//! Counters and access-time averages for the content cache, plus the
//! serializable statistics report returned by `TieredCache::statistics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use super::entry::Tier;

/// Running arithmetic mean
#[derive(Debug, Default)]
pub struct RunningMean {
    inner: Mutex<(u64, f64)>,
}

impl RunningMean {
    /// Add a sample
    pub fn record(&self, value: f64) {
        let mut guard = self.inner.lock();
        guard.0 += 1;
        guard.1 += (value - guard.1) / guard.0 as f64;
    }

    /// Current mean (0 with no samples)
    pub fn mean(&self) -> f64 {
        self.inner.lock().1
    }

    /// Number of samples
    pub fn count(&self) -> u64 {
        self.inner.lock().0
    }

    pub fn reset(&self) {
        *self.inner.lock() = (0, 0.0);
    }
}

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    access_ms: RunningMean,
}

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hot: TierCounters,
    warm: TierCounters,
    cold: TierCounters,

    // Final misses (not found in any tier)
    misses: AtomicU64,

    // Tier movement
    promotions_warm_to_hot: AtomicU64,
    promotions_cold_to_hot: AtomicU64,
    demotions_hot_to_warm: AtomicU64,
    demotions_warm_to_cold: AtomicU64,
    // Drained by each migration sweep
    warm_to_hot_since_sweep: AtomicU64,
    cold_to_hot_since_sweep: AtomicU64,

    // Failures
    io_errors: AtomicU64,
    corruptions: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    fn tier(&self, tier: Tier) -> &TierCounters {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    /// Record a hit served by `tier`
    pub fn record_hit(&self, tier: Tier, elapsed: Duration) {
        let counters = self.tier(tier);
        counters.hits.fetch_add(1, Ordering::Relaxed);
        counters.access_ms.record(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a promotion into the hot tier
    pub fn record_promotion(&self, from: Tier) {
        match from {
            Tier::Warm => {
                self.promotions_warm_to_hot.fetch_add(1, Ordering::Relaxed);
                self.warm_to_hot_since_sweep.fetch_add(1, Ordering::Relaxed);
            }
            Tier::Cold => {
                self.promotions_cold_to_hot.fetch_add(1, Ordering::Relaxed);
                self.cold_to_hot_since_sweep.fetch_add(1, Ordering::Relaxed);
            }
            Tier::Hot => {}
        }
    }

    /// Record a demotion out of `from`
    pub fn record_demotion(&self, from: Tier) {
        match from {
            Tier::Hot => {
                self.demotions_hot_to_warm.fetch_add(1, Ordering::Relaxed);
            }
            Tier::Warm => {
                self.demotions_warm_to_cold.fetch_add(1, Ordering::Relaxed);
            }
            Tier::Cold => {}
        }
    }

    pub fn record_io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corruption(&self) {
        self.corruptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the (warm → hot, cold → hot) promotions seen since the previous call
    pub fn take_promotions_since_sweep(&self) -> (u64, u64) {
        (
            self.warm_to_hot_since_sweep.swap(0, Ordering::Relaxed),
            self.cold_to_hot_since_sweep.swap(0, Ordering::Relaxed),
        )
    }

    pub fn hits(&self, tier: Tier) -> u64 {
        self.tier(tier).hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Mean access time for hits served by `tier`, in milliseconds
    pub fn avg_access_time_ms(&self, tier: Tier) -> f64 {
        self.tier(tier).access_ms.mean()
    }

    /// Get overall cache hit ratio
    pub fn overall_hit_ratio(&self) -> f64 {
        let hits: u64 = Tier::ALL.iter().map(|t| self.hits(*t)).sum();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hot_hits: self.hits(Tier::Hot),
            warm_hits: self.hits(Tier::Warm),
            cold_hits: self.hits(Tier::Cold),
            misses: self.misses(),
            overall_hit_ratio: self.overall_hit_ratio(),
            promotions_warm_to_hot: self.promotions_warm_to_hot.load(Ordering::Relaxed),
            promotions_cold_to_hot: self.promotions_cold_to_hot.load(Ordering::Relaxed),
            demotions_hot_to_warm: self.demotions_hot_to_warm.load(Ordering::Relaxed),
            demotions_warm_to_cold: self.demotions_warm_to_cold.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            corruptions: self.corruptions.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for tier in Tier::ALL {
            let counters = self.tier(tier);
            counters.hits.store(0, Ordering::Relaxed);
            counters.access_ms.reset();
        }
        self.misses.store(0, Ordering::Relaxed);
        self.promotions_warm_to_hot.store(0, Ordering::Relaxed);
        self.promotions_cold_to_hot.store(0, Ordering::Relaxed);
        self.demotions_hot_to_warm.store(0, Ordering::Relaxed);
        self.demotions_warm_to_cold.store(0, Ordering::Relaxed);
        self.warm_to_hot_since_sweep.store(0, Ordering::Relaxed);
        self.cold_to_hot_since_sweep.store(0, Ordering::Relaxed);
        self.io_errors.store(0, Ordering::Relaxed);
        self.corruptions.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub overall_hit_ratio: f64,

    // Tier movement
    pub promotions_warm_to_hot: u64,
    pub promotions_cold_to_hot: u64,
    pub demotions_hot_to_warm: u64,
    pub demotions_warm_to_cold: u64,

    // Failures
    pub io_errors: u64,
    pub corruptions: u64,
}

/// Per-tier statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStatistics {
    pub count: usize,
    pub total_size_bytes: u64,
    pub avg_access_time_ms: f64,
}

/// Tier movement totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCounters {
    pub hot_to_warm: u64,
    pub warm_to_cold: u64,
    pub cold_to_hot: u64,
    pub warm_to_hot: u64,
}

/// Statistics report for the content cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub hot: TierStatistics,
    pub warm: TierStatistics,
    pub cold: TierStatistics,
    pub promotions: PromotionCounters,
}

impl CacheStatistics {
    /// Statistics for one tier
    pub fn tier(&self, tier: Tier) -> &TierStatistics {
        match tier {
            Tier::Hot => &self.hot,
            Tier::Warm => &self.warm,
            Tier::Cold => &self.cold,
        }
    }

    /// Entries across all tiers
    pub fn total_entries(&self) -> usize {
        self.hot.count + self.warm.count + self.cold.count
    }
}

impl From<&MetricsSnapshot> for PromotionCounters {
    fn from(snapshot: &MetricsSnapshot) -> Self {
        Self {
            hot_to_warm: snapshot.demotions_hot_to_warm,
            warm_to_cold: snapshot.demotions_warm_to_cold,
            cold_to_hot: snapshot.promotions_cold_to_hot,
            warm_to_hot: snapshot.promotions_warm_to_hot,
        }
    }
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mean = RunningMean::default();
        assert_eq!(mean.mean(), 0.0);

        mean.record(10.0);
        mean.record(20.0);
        mean.record(30.0);
        assert_eq!(mean.count(), 3);
        assert!((mean.mean() - 20.0).abs() < 1e-9);

        mean.reset();
        assert_eq!(mean.count(), 0);
    }

    #[test]
    fn test_hit_tracking() {
        let metrics = CacheMetrics::new();

        metrics.record_hit(Tier::Hot, Duration::from_millis(2));
        metrics.record_hit(Tier::Hot, Duration::from_millis(4));
        metrics.record_hit(Tier::Cold, Duration::from_millis(10));
        metrics.record_miss();

        assert_eq!(metrics.hits(Tier::Hot), 2);
        assert_eq!(metrics.hits(Tier::Warm), 0);
        assert_eq!(metrics.misses(), 1);
        assert!((metrics.avg_access_time_ms(Tier::Hot) - 3.0).abs() < 1e-6);
        assert!((metrics.overall_hit_ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_tier_movement_tracking() {
        let metrics = CacheMetrics::new();

        metrics.record_promotion(Tier::Cold);
        metrics.record_promotion(Tier::Warm);
        metrics.record_demotion(Tier::Hot);
        metrics.record_demotion(Tier::Warm);
        metrics.record_demotion(Tier::Warm);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.promotions_cold_to_hot, 1);
        assert_eq!(snapshot.promotions_warm_to_hot, 1);
        assert_eq!(snapshot.demotions_hot_to_warm, 1);
        assert_eq!(snapshot.demotions_warm_to_cold, 2);

        let counters = PromotionCounters::from(&snapshot);
        assert_eq!(counters.warm_to_cold, 2);
    }

    #[test]
    fn test_promotions_drain_per_sweep() {
        let metrics = CacheMetrics::new();
        metrics.record_promotion(Tier::Cold);
        metrics.record_promotion(Tier::Cold);
        metrics.record_promotion(Tier::Warm);

        assert_eq!(metrics.take_promotions_since_sweep(), (1, 2));
        assert_eq!(metrics.take_promotions_since_sweep(), (0, 0));
        assert_eq!(metrics.snapshot().promotions_cold_to_hot, 2);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();

        metrics.record_hit(Tier::Warm, Duration::from_millis(1));
        metrics.record_io_error();
        metrics.record_corruption();

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.warm_hits, 0);
        assert_eq!(snapshot.io_errors, 0);
        assert_eq!(snapshot.corruptions, 0);
        assert_eq!(metrics.avg_access_time_ms(Tier::Warm), 0.0);
    }

    #[test]
    fn test_statistics_serialize_camel_case() {
        let tier = TierStatistics {
            count: 1,
            total_size_bytes: 10,
            avg_access_time_ms: 0.5,
        };
        let stats = CacheStatistics {
            hot: tier.clone(),
            warm: tier.clone(),
            cold: tier,
            promotions: PromotionCounters::default(),
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["hot"]["totalSizeBytes"], 10);
        assert_eq!(json["promotions"]["coldToHot"], 0);
        assert_eq!(stats.total_entries(), 3);
    }
}
