//! Three-Tier Content Cache
//!
//! Holds opaque payloads across a memory tier and two disk tiers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           TieredCache                                     │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Hot (RAM)            │ Warm (disk)         │ Cold (compressed disk)     │
//! │  ┌────────────────┐   │ ┌────────────────┐  │ ┌────────────────────┐     │
//! │  │ ShardedMap     │   │ │ file per key   │  │ │ LZ4 file per key   │     │
//! │  │ (64-way)       │   │ │ + .index.json  │  │ │ + .index.json      │     │
//! │  └────────────────┘   │ └────────────────┘  │ └────────────────────┘     │
//! │         │             │         │           │           │                │
//! │         └─────────────┴─────────┴───────────┴───────────┘                │
//! │                              │                                            │
//! │                      Tier Migration Engine                                │
//! │       (read-time promotion, LRU capacity demotion, age sweep)            │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tiercache::cache::{CacheConfig, TieredCache};
//!
//! # async fn demo() -> tiercache::Result<()> {
//! let cache = TieredCache::open(CacheConfig::new("/tmp/tiercache")).await?;
//! cache.store("session-42", &b"context blob"[..], Some("alice")).await?;
//!
//! if let Some(content) = cache.retrieve("session-42").await? {
//!     assert_eq!(content.as_ref(), b"context blob");
//! }
//!
//! let report = cache.run_migration().await;
//! println!("demoted {} entries", report.demoted());
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod entry;
mod cold;
mod hot;
mod index;
mod manager;
mod metrics;
mod migration;
mod policy;
mod shard;
mod warm;

pub use cold::{ColdRecord, ColdStore};
pub use compression::{
    CompressionAlgorithm, CompressionConfig, CompressionManager, Compressor, Lz4FrameCodec,
};
pub use entry::{ContentEntry, ContentMetadata, EntryKind, EntryMetadata, RetrievalMetadata, Tier};
pub use hot::HotStore;
pub use index::{file_stem, write_atomic, TierIndex, INDEX_FILE_NAME};
pub use manager::{CacheConfig, TieredCache};
pub use metrics::{
    CacheMetrics, CacheStatistics, LatencyTracker, MetricsSnapshot, PromotionCounters,
    RunningMean, TierStatistics,
};
pub use migration::MigrationReport;
pub use policy::{AccessTierPolicy, MigrationPolicy, PromotionPolicy};
pub use shard::{ShardedMap, Weighted};
pub use warm::WarmStore;

/// Number of shards in the hot tier map
pub const HOT_SHARD_COUNT: usize = 64;

/// Default hot tier capacity (256MB)
pub const DEFAULT_HOT_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;

// =============================================================================
// Tests
// =============================================================================
