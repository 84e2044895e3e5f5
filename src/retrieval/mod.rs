//! Similarity-Aware Retrieval Cache
//!
//! Caches query results by normalized fingerprint, with a cosine
//! similarity fallback over query embeddings.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tiercache::retrieval::{QueryDescriptor, RetrievalCache, RetrievalConfig};
//!
//! # fn demo() -> tiercache::Result<()> {
//! let cache = RetrievalCache::new(RetrievalConfig::default())?;
//! let query = QueryDescriptor::new("How do I rotate keys?").with_owner("alice");
//! let key = query.fingerprint();
//!
//! cache.set(&key, query, json!({"docs": ["rotation.md"]}), vec![0.1, 0.2, 0.3, 0.4], "docs")?;
//!
//! // A different key with a near-identical embedding still hits
//! let hit = cache.get_with_similarity("other", Some(&[0.1, 0.2, 0.3, 0.41]), None);
//! assert!(hit.is_some());
//! # Ok(())
//! # }
//! # demo().unwrap();
//! ```

mod cache;
mod fingerprint;
mod metrics;
mod similarity;

#[cfg(test)]
mod proptest;

pub use cache::{
    InvalidationCriteria, RetrievalCache, RetrievalConfig, RetrievalEntry, RetrievalHit, TierTtl,
};
pub use fingerprint::{generate_key, normalize_value, QueryDescriptor};
pub use metrics::{HitKind, OwnerMetrics, RetrievalMetrics, RetrievalMetricsSnapshot};
pub use similarity::{cosine_similarity, is_valid_embedding, ScanOutcome, SimilarityIndex};
