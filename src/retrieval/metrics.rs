//! Retrieval Cache Metrics
//!
//! Query/hit/miss counters, running-mean latencies and a per-owner
//! breakdown. Updated on every `get`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::cache::RunningMean;

/// How a hit was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// Fingerprint matched
    Exact,
    /// Embedding scan matched
    Similarity,
}

#[derive(Debug, Default)]
struct OwnerCounters {
    queries: AtomicU64,
    hits: AtomicU64,
}

/// Retrieval metrics collector
#[derive(Debug, Default)]
pub struct RetrievalMetrics {
    total_queries: AtomicU64,
    exact_hits: AtomicU64,
    similarity_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    skipped_entries: AtomicU64,

    hit_latency_ms: RunningMean,
    miss_latency_ms: RunningMean,
    latency_ms: RunningMean,

    by_owner: DashMap<String, OwnerCounters>,
}

impl RetrievalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_query(&self, owner_id: Option<&str>, hit: bool, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.latency_ms.record(ms);
        if hit {
            self.hit_latency_ms.record(ms);
        } else {
            self.miss_latency_ms.record(ms);
        }

        if let Some(owner) = owner_id {
            let counters = self.by_owner.entry(owner.to_string()).or_default();
            counters.queries.fetch_add(1, Ordering::Relaxed);
            if hit {
                counters.hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record a hit
    pub fn record_hit(&self, kind: HitKind, owner_id: Option<&str>, elapsed: Duration) {
        match kind {
            HitKind::Exact => self.exact_hits.fetch_add(1, Ordering::Relaxed),
            HitKind::Similarity => self.similarity_hits.fetch_add(1, Ordering::Relaxed),
        };
        self.record_query(owner_id, true, elapsed);
    }

    /// Record a miss
    pub fn record_miss(&self, owner_id: Option<&str>, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_query(owner_id, false, elapsed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: usize) {
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, count: usize) {
        self.skipped_entries.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> RetrievalMetricsSnapshot {
        let exact_hits = self.exact_hits.load(Ordering::Relaxed);
        let similarity_hits = self.similarity_hits.load(Ordering::Relaxed);
        let hits = exact_hits + similarity_hits;
        let total_queries = self.total_queries.load(Ordering::Relaxed);

        let by_owner = self
            .by_owner
            .iter()
            .map(|entry| {
                let queries = entry.queries.load(Ordering::Relaxed);
                let hits = entry.hits.load(Ordering::Relaxed);
                (
                    entry.key().clone(),
                    OwnerMetrics {
                        queries,
                        hits,
                        hit_rate: ratio(hits, queries),
                    },
                )
            })
            .collect();

        RetrievalMetricsSnapshot {
            total_queries,
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            hit_rate: ratio(hits, total_queries),
            exact_hits,
            similarity_hits,
            avg_latency_ms: self.latency_ms.mean(),
            avg_hit_latency_ms: self.hit_latency_ms.mean(),
            avg_miss_latency_ms: self.miss_latency_ms.mean(),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            skipped_entries: self.skipped_entries.load(Ordering::Relaxed),
            by_owner,
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.total_queries,
            &self.exact_hits,
            &self.similarity_hits,
            &self.misses,
            &self.evictions,
            &self.expirations,
            &self.invalidations,
            &self.skipped_entries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.hit_latency_ms.reset();
        self.miss_latency_ms.reset();
        self.latency_ms.reset();
        self.by_owner.clear();
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Per-owner query counts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerMetrics {
    pub queries: u64,
    pub hits: u64,
    pub hit_rate: f64,
}

/// Snapshot of retrieval metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalMetricsSnapshot {
    pub total_queries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub exact_hits: u64,
    pub similarity_hits: u64,
    pub avg_latency_ms: f64,
    pub avg_hit_latency_ms: f64,
    pub avg_miss_latency_ms: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    /// Entries skipped by similarity scans (incomparable embeddings)
    pub skipped_entries: u64,
    pub by_owner: BTreeMap<String, OwnerMetrics>,
}

// =============================================================================
// Tests
// =============================================================================
