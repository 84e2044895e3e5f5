//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the cache engine depends on. Tier stores, event listeners
//! and the clock are all injected, so the engine carries no hidden global
//! state and can be driven deterministically in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cache Engine                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │    TierStore   │  CacheEventListener  │    Clock     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  HotStore / WarmStore / ColdStore │ LoggingEventListener    │
//! │  SystemClock / ManualClock        │ InMemoryEventCollector  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::events::CacheEvent;
use crate::cache::entry::{ContentMetadata, Tier};
use crate::error::Result;

// =============================================================================
// Tier Store Port
// =============================================================================

/// Physical storage for one tier.
///
/// Implementations own both the payloads and the key → metadata index for
/// their tier. A read that hits a missing or unreadable payload returns an
/// error; callers decide whether that is a miss or a corruption.
#[async_trait]
pub trait TierStore: Send + Sync {
    /// Tier served by this store
    fn tier(&self) -> Tier;

    /// Write a payload and its metadata
    async fn write(&self, key: &str, content: Bytes, metadata: ContentMetadata) -> Result<()>;

    /// Read a payload without touching its metadata
    async fn read(&self, key: &str) -> Result<Option<Bytes>>;

    /// Remove an entry, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Metadata for a key, if indexed
    fn metadata(&self, key: &str) -> Option<ContentMetadata>;

    /// Replace the metadata of an indexed key
    fn set_metadata(&self, key: &str, metadata: ContentMetadata) -> bool;

    /// Snapshot of all indexed entries
    fn entries(&self) -> Vec<(String, ContentMetadata)>;

    /// Number of indexed entries
    fn len(&self) -> usize;

    /// Total uncompressed bytes held
    fn size_bytes(&self) -> u64;

    /// Check if the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a key is indexed
    fn contains(&self, key: &str) -> bool {
        self.metadata(key).is_some()
    }

    /// Persist any pending index changes
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Event Listener Port
// =============================================================================

/// Receives cache state transitions.
///
/// Called synchronously on the thread performing the operation.
pub trait CacheEventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &CacheEvent);
}

// =============================================================================
// Clock Port
// =============================================================================

/// Time source for age and TTL arithmetic.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// System time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests and replay
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the current system time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// =============================================================================
// Tests
// =============================================================================
