//! tiercache Integration Tests
//!
//! End-to-end behavior of both caches through the public API:
//! - Content cache: tier exclusivity, capacity bound, migration, failure isolation
//! - Retrieval cache: fingerprints, similarity hits, TTL, access-driven tiers

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Duration;
use tempfile::TempDir;

use tiercache::adapters::InMemoryEventCollector;
use tiercache::cache::{CacheConfig, CompressionAlgorithm, Tier, TieredCache};
use tiercache::domain::ManualClock;
use tiercache::Error;

const MB: usize = 1024 * 1024;

async fn open_cache(dir: &TempDir, hot_capacity: u64) -> (TieredCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let config = CacheConfig::new(dir.path()).with_hot_capacity(hot_capacity);
    let cache = TieredCache::open_with_clock(config, clock.clone())
        .await
        .expect("open cache");
    (cache, clock)
}

/// Number of tiers physically holding `key`
fn holders(cache: &TieredCache, key: &str) -> usize {
    let hot = cache.hot().get(key).is_some();
    let warm = cache.warm().data_path(key).map(|p| p.exists()).unwrap_or(false);
    let cold = cache.cold().record(key).is_some();
    [hot, warm, cold].into_iter().filter(|held| *held).count()
}

/// Replace a tier's index file with a non-empty directory so every index
/// write fails until [`unblock_index`] runs
fn block_index(tier_dir: &Path) {
    let index = tier_dir.join(".index.json");
    let _ = std::fs::remove_file(&index);
    std::fs::create_dir_all(index.join("blocker")).unwrap();
}

fn unblock_index(tier_dir: &Path) {
    std::fs::remove_dir_all(tier_dir.join(".index.json")).unwrap();
}

// =============================================================================
// Content Cache
// =============================================================================

mod content_cache {
    use super::*;

    #[tokio::test]
    async fn test_store_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024).await;

        cache.store("k", &b"first"[..], None).await.unwrap();
        clock.advance(Duration::days(10));
        cache.run_migration().await;
        assert_eq!(cache.tier_of("k"), Some(Tier::Warm));

        cache.store("k", &b"second"[..], None).await.unwrap();
        cache.store("k", &b"second"[..], None).await.unwrap();

        assert_eq!(cache.retrieve("k").await.unwrap().unwrap().as_ref(), b"second");
        assert_eq!(holders(&cache, "k"), 1);
        assert_eq!(cache.tier_of("k"), Some(Tier::Hot));
    }

    #[tokio::test]
    async fn test_scenario_a_capacity_demotes_oldest() {
        let dir = TempDir::new().unwrap();
        let capacity = (50 * MB) as u64;
        let (cache, clock) = open_cache(&dir, capacity).await;

        for key in ["one", "two", "three"] {
            cache
                .store(key, Bytes::from(vec![key.len() as u8; 20 * MB]), None)
                .await
                .unwrap();
            assert!(cache.statistics().hot.total_size_bytes <= capacity);
            clock.advance(Duration::seconds(1));
        }

        let stats = cache.statistics();
        assert_eq!(stats.warm.count, 1);
        assert_eq!(stats.hot.count, 2);
        assert_eq!(cache.tier_of("one"), Some(Tier::Warm));
        assert_eq!(stats.promotions.hot_to_warm, 1);

        // Evicted entry is still served, from warm
        let content = cache.retrieve("one").await.unwrap().unwrap();
        assert_eq!(content.len(), 20 * MB);
        assert!(content.iter().all(|b| *b == 3));
    }

    #[tokio::test]
    async fn test_every_key_resolves_from_one_tier() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 64).await;

        for i in 0..6 {
            cache
                .store(&format!("key-{i}"), vec![i as u8; 24], None)
                .await
                .unwrap();
            clock.advance(Duration::days(2));
        }
        clock.advance(Duration::days(35));
        cache.run_migration().await;
        for i in (0..6).step_by(2) {
            for _ in 0..3 {
                cache.retrieve(&format!("key-{i}")).await.unwrap().unwrap();
            }
        }

        for i in 0..6 {
            let key = format!("key-{i}");
            assert_eq!(holders(&cache, &key), 1, "{key}");
            let (tier, metadata) = cache.peek(&key).unwrap();
            assert_eq!(metadata.base.tier, tier);
        }
        assert!(cache.statistics().hot.total_size_bytes <= 64);
    }

    #[tokio::test]
    async fn test_scenario_c_truncated_cold_file() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024 * 1024).await;
        let body: Vec<u8> = b"context blob ".repeat(200);

        cache.store("victim", body.clone(), None).await.unwrap();
        cache.store("sibling", body.clone(), None).await.unwrap();
        clock.advance(Duration::days(8));
        cache.run_migration().await;
        clock.advance(Duration::days(31));
        cache.run_migration().await;
        assert_eq!(cache.tier_of("victim"), Some(Tier::Cold));

        let record = cache.cold().record("victim").unwrap();
        assert_eq!(record.algorithm, CompressionAlgorithm::Lz4);
        let path = cache.cold().data_path("victim", record.algorithm).unwrap();
        let on_disk = std::fs::read(&path).unwrap();
        std::fs::write(&path, &on_disk[..on_disk.len() / 2]).unwrap();

        let collector = Arc::new(InMemoryEventCollector::new());
        cache.subscribe(collector.clone());

        let err = cache.retrieve("victim").await.unwrap_err();
        assert!(matches!(err, Error::Corruption { ref key, .. } if key == "victim"));
        assert!(err.is_corruption());
        assert_eq!(collector.events_of_type("CorruptionDetected").len(), 1);

        let sibling = cache.retrieve("sibling").await.unwrap().unwrap();
        assert_eq!(sibling.as_ref(), body.as_slice());
        assert_eq!(cache.metrics().corruptions, 1);
    }

    #[tokio::test]
    async fn test_missing_warm_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024).await;

        cache.store("gone", &b"payload"[..], None).await.unwrap();
        clock.advance(Duration::days(8));
        cache.run_migration().await;
        std::fs::remove_file(cache.warm().data_path("gone").unwrap()).unwrap();

        assert_eq!(cache.retrieve("gone").await.unwrap(), None);
        assert_eq!(cache.metrics().io_errors, 1);
    }

    #[tokio::test]
    async fn test_warm_entry_promoted_after_repeated_reads() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024).await;

        cache.store("k", &b"payload"[..], Some("alice")).await.unwrap();
        clock.advance(Duration::days(8));
        cache.run_migration().await;

        cache.retrieve("k").await.unwrap().unwrap();
        cache.retrieve("k").await.unwrap().unwrap();
        assert_eq!(cache.tier_of("k"), Some(Tier::Warm));
        cache.retrieve("k").await.unwrap().unwrap();
        assert_eq!(cache.tier_of("k"), Some(Tier::Hot));

        let report = cache.run_migration().await;
        assert_eq!(report.warm_to_hot, 1);
        assert_eq!(cache.peek("k").unwrap().1.owner_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_indexes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let (cache, clock) = open_cache(&dir, 1024).await;
            cache.store("warm", &b"w"[..], None).await.unwrap();
            cache.store("cold", b"c".repeat(500), None).await.unwrap();
            clock.advance(Duration::days(8));
            cache.run_migration().await;
            clock.advance(Duration::days(31));
            cache.store("warm", &b"w"[..], None).await.unwrap();
            clock.advance(Duration::days(8));
            cache.run_migration().await;
            cache.flush().await.unwrap();
        }

        let (reopened, _) = open_cache(&dir, 1024).await;
        assert_eq!(reopened.tier_of("warm"), Some(Tier::Warm));
        assert_eq!(reopened.tier_of("cold"), Some(Tier::Cold));
        assert_eq!(
            reopened.retrieve("cold").await.unwrap().unwrap().as_ref(),
            b"c".repeat(500).as_slice()
        );
    }

    #[tokio::test]
    async fn test_delete_removes_from_holding_tier() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024).await;

        cache.store("k", &b"payload"[..], None).await.unwrap();
        clock.advance(Duration::days(8));
        cache.run_migration().await;

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(holders(&cache, "k"), 0);
        assert_eq!(cache.retrieve("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_index_write_never_resurrects_old_content() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024).await;

        cache.store("k", &b"old"[..], None).await.unwrap();
        clock.advance(Duration::days(8));
        cache.run_migration().await;
        assert_eq!(cache.tier_of("k"), Some(Tier::Warm));

        block_index(cache.warm().dir());
        cache.store("k", &b"new"[..], None).await.unwrap();
        assert_eq!(holders(&cache, "k"), 1);
        assert_eq!(cache.retrieve("k").await.unwrap().unwrap().as_ref(), b"new");

        assert!(cache.delete("k").await.unwrap());
        assert_eq!(holders(&cache, "k"), 0);
        assert_eq!(cache.retrieve("k").await.unwrap(), None);

        // The stale persisted index entry is dropped once the tier reopens
        unblock_index(cache.warm().dir());
        drop(cache);
        let (reopened, _) = open_cache(&dir, 1024).await;
        assert_eq!(reopened.retrieve("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_age_demotion_stays_hot_until_next_sweep() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024).await;

        cache.store("k", &b"payload"[..], None).await.unwrap();
        clock.advance(Duration::days(8));

        block_index(cache.warm().dir());
        let report = cache.run_migration().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.hot_to_warm, 0);
        assert_eq!(cache.tier_of("k"), Some(Tier::Hot));
        assert_eq!(holders(&cache, "k"), 1);

        unblock_index(cache.warm().dir());
        let report = cache.run_migration().await;
        assert_eq!(report.failed, 0);
        assert_eq!(report.hot_to_warm, 1);
        assert_eq!(cache.tier_of("k"), Some(Tier::Warm));
        assert_eq!(cache.retrieve("k").await.unwrap().unwrap().as_ref(), b"payload");
    }

    #[tokio::test]
    async fn test_failed_capacity_demotion_keeps_entry_and_retries() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open_cache(&dir, 1024).await;

        cache.store("a", vec![b'a'; 600], None).await.unwrap();
        clock.advance(Duration::seconds(1));

        block_index(cache.warm().dir());
        cache.store("b", vec![b'b'; 600], None).await.unwrap();
        assert_eq!(cache.tier_of("a"), Some(Tier::Hot));
        assert_eq!(cache.tier_of("b"), Some(Tier::Hot));
        assert_eq!(cache.metrics().io_errors, 1);

        unblock_index(cache.warm().dir());
        let report = cache.run_migration().await;
        assert_eq!(report.hot_to_warm, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(cache.tier_of("a"), Some(Tier::Warm));
        assert_eq!(cache.tier_of("b"), Some(Tier::Hot));
        assert!(cache.statistics().hot.total_size_bytes <= 1024);
    }

    #[tokio::test]
    async fn test_long_keys_move_through_every_tier() {
        let dir = TempDir::new().unwrap();
        let key = format!("session/{}", "q".repeat(1000));
        let payload = b"long-key payload ".repeat(20);
        {
            let (cache, clock) = open_cache(&dir, 1024).await;
            cache.store(&key, payload.clone(), None).await.unwrap();

            clock.advance(Duration::days(8));
            cache.run_migration().await;
            assert_eq!(cache.tier_of(&key), Some(Tier::Warm));
            assert_eq!(holders(&cache, &key), 1);

            clock.advance(Duration::days(31));
            cache.run_migration().await;
            assert_eq!(cache.tier_of(&key), Some(Tier::Cold));
        }

        let (reopened, _) = open_cache(&dir, 1024).await;
        assert_eq!(reopened.tier_of(&key), Some(Tier::Cold));
        assert_eq!(
            reopened.retrieve(&key).await.unwrap().unwrap().as_ref(),
            payload.as_slice()
        );
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let dir = TempDir::new().unwrap();
        let mut config = CacheConfig::new(dir.path());
        config.migration.warm_max_age_days = 1.0;

        let result = TieredCache::open(config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

// =============================================================================
// Retrieval Cache
// =============================================================================

mod retrieval_cache {
    use super::*;
    use serde_json::json;
    use tiercache::retrieval::{
        cosine_similarity, InvalidationCriteria, QueryDescriptor, RetrievalCache, RetrievalConfig,
    };

    fn cache() -> (RetrievalCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = RetrievalCache::with_clock(RetrievalConfig::default(), clock.clone()).unwrap();
        (cache, clock)
    }

    /// Embedding at exactly `cosine` similarity to `[0.1, 0.2, 0.3, 0.4]`
    fn rotated(cosine: f32) -> (Vec<f32>, Vec<f32>) {
        let e = vec![0.1, 0.2, 0.3, 0.4];
        let orthogonal = [0.2, -0.1, 0.4, -0.3];
        let sine = (1.0 - cosine * cosine).sqrt();
        let e2 = e
            .iter()
            .zip(orthogonal)
            .map(|(a, b)| cosine * a + sine * b)
            .collect();
        (e, e2)
    }

    #[test]
    fn test_scenario_b_similar_query_hits() {
        let (cache, _) = cache();
        let (e, e2) = rotated(0.95);
        assert!((cosine_similarity(&e, &e2).unwrap() - 0.95).abs() < 1e-4);

        let first = QueryDescriptor::new("what is X");
        let k1 = first.fingerprint();
        cache
            .set(&k1, first, json!({"answer": "X is a thing"}), e, "docs")
            .unwrap();

        let mut upstream_calls = 0;
        let k2 = QueryDescriptor::new("please explain X").fingerprint();
        assert_ne!(k1, k2);
        let result = match cache.get(&k2, Some(&e2)) {
            Some(result) => result,
            None => {
                upstream_calls += 1;
                json!(null)
            }
        };

        assert_eq!(result, json!({"answer": "X is a thing"}));
        assert_eq!(upstream_calls, 0);
        assert_eq!(cache.metrics().similarity_hits, 1);
    }

    #[test]
    fn test_below_threshold_is_a_miss() {
        let (cache, _) = cache();
        let (e, e2) = rotated(0.8);
        let d = QueryDescriptor::new("what is X");
        cache.set(&d.fingerprint(), d, json!(1), e, "docs").unwrap();

        assert_eq!(cache.get("other", Some(&e2)), None);
        assert_eq!(cache.metrics().misses, 1);
    }

    #[test]
    fn test_equivalent_descriptors_share_a_key() {
        let a = QueryDescriptor::new("What Is X")
            .with_filter("repos", json!(["b", "a"]))
            .with_top_k(5);
        let b = QueryDescriptor::new(" what is x ")
            .with_top_k(5)
            .with_filter("repos", json!(["A", "B"]));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_hot_after_threshold_reads() {
        let (cache, _) = cache();
        let d = QueryDescriptor::new("q");
        let key = d.fingerprint();
        cache.set(&key, d, json!("r"), vec![1.0, 0.0], "docs").unwrap();

        for _ in 0..10 {
            cache.get(&key, None).unwrap();
        }
        let hit = cache.get_with_similarity(&key, None, None).unwrap();
        assert_eq!(hit.tier, Tier::Hot);
        assert_eq!(hit.similarity, 1.0);
    }

    #[test]
    fn test_ttl_expiry_is_a_miss_while_present() {
        let (cache, clock) = cache();
        let d = QueryDescriptor::new("q");
        let key = d.fingerprint();
        cache.set(&key, d, json!("r"), vec![1.0, 0.0], "docs").unwrap();

        clock.advance(Duration::seconds(599));
        assert!(cache.get(&key, None).is_some());

        clock.advance(Duration::seconds(601));
        assert_eq!(cache.get(&key, Some(&[1.0, 0.0])), None);
    }

    #[test]
    fn test_invalidate_all() {
        let (cache, _) = cache();
        for text in ["a", "b", "c"] {
            let d = QueryDescriptor::new(text).with_owner("alice");
            cache.set(&d.fingerprint(), d, json!(text), vec![1.0], "docs").unwrap();
        }

        assert_eq!(cache.invalidate(&InvalidationCriteria::all()), 3);
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().invalidations, 3);
    }
}
