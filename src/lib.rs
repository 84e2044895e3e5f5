//! tiercache - Tiered Context Cache
//!
//! Two caches behind one crate:
//!
//! - A three-tier content cache ([`cache::TieredCache`]) that keeps opaque
//!   payloads in RAM, on disk, and LZ4-compressed on disk, moving entries
//!   between tiers on access patterns and age.
//! - A retrieval cache ([`retrieval::RetrievalCache`]) that memoizes query
//!   results by normalized fingerprint with a cosine-similarity fallback.
//!
//! # Architecture
//!
//! ```text
//! store/retrieve → TieredCache → Hot (RAM) → Warm (disk) → Cold (LZ4)
//!                        ↑                ↓ run_migration
//!                        └── promotion ───┘
//!
//! get/set → RetrievalCache → fingerprint lookup → similarity scan
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Event listener adapters
//! - [`cache`] - Three-tier content cache and migration engine
//! - [`domain`] - Ports (tier store, clock, listeners) and events
//! - [`error`] - Error types
//! - [`retrieval`] - Similarity-aware retrieval cache

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod error;
pub mod retrieval;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheStatistics, MigrationReport, Tier, TieredCache};
pub use domain::{CacheEvent, CacheEventListener, Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use retrieval::{QueryDescriptor, RetrievalCache, RetrievalConfig};
