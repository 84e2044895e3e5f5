//! Cache Entry Types
//!
//! Tier identifiers and per-entry metadata. Both cache variants share
//! [`EntryMetadata`]; each entry kind wraps it with its own fields.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage tier holding an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// In-memory, smallest capacity
    Hot,
    /// On-disk, uncompressed
    Warm,
    /// On-disk, compressed
    Cold,
}

impl Tier {
    /// All tiers in probe order (fastest first)
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Warm, Tier::Cold];

    /// Get tier name (also the directory name under the cache root)
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    /// Next slower tier, if any
    pub fn colder(&self) -> Option<Tier> {
        match self {
            Tier::Hot => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Cold),
            Tier::Cold => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Kind of entry an event or record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Opaque content blob stored by key
    Content,
    /// Cached query result with an embedding
    Retrieval,
}

/// Metadata shared by every entry kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last successful read (or write)
    pub last_accessed: DateTime<Utc>,
    /// Successful reads since creation
    pub access_count: u32,
    /// Payload size in bytes (uncompressed)
    pub size_bytes: u64,
    /// Tier physically holding the payload
    pub tier: Tier,
}

impl EntryMetadata {
    /// Create metadata for a freshly written entry
    pub fn new(size_bytes: u64, tier: Tier, now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_accessed: now,
            access_count: 0,
            size_bytes,
            tier,
        }
    }

    /// Record a successful read and return the new count
    pub fn record_access(&mut self, now: DateTime<Utc>) -> u32 {
        self.last_accessed = now;
        self.access_count = self.access_count.saturating_add(1);
        self.access_count
    }

    /// Seconds since the last access (never negative)
    pub fn idle_seconds(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.last_accessed).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    /// Days since the last access (fractional)
    pub fn days_since_last_access(&self, now: DateTime<Utc>) -> f64 {
        self.idle_seconds(now) / 86_400.0
    }
}

/// Metadata for a content-cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// Common metadata
    #[serde(flatten)]
    pub base: EntryMetadata,
    /// Owner that stored the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Content hash of the uncompressed payload (for integrity)
    pub content_hash: u64,
}

impl ContentMetadata {
    /// Create metadata describing `content`
    pub fn for_content(
        content: &[u8],
        owner_id: Option<String>,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            base: EntryMetadata::new(content.len() as u64, tier, now),
            owner_id,
            content_hash: content_hash(content),
        }
    }

    /// Tier currently holding the payload
    #[inline]
    pub fn tier(&self) -> Tier {
        self.base.tier
    }

    /// Payload size in bytes
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.base.size_bytes
    }

    /// Copy of this metadata relocated to `tier`
    pub fn in_tier(&self, tier: Tier) -> Self {
        let mut moved = self.clone();
        moved.base.tier = tier;
        moved
    }

    /// Check a payload against the recorded length and hash
    pub fn verify(&self, content: &[u8]) -> bool {
        content.len() as u64 == self.base.size_bytes && content_hash(content) == self.content_hash
    }
}

/// Metadata for a retrieval-cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    /// Common metadata (`created_at` is the result timestamp)
    #[serde(flatten)]
    pub base: EntryMetadata,
    /// Label of the backend that produced the result
    pub backend_label: String,
}

/// A content entry with its payload, as returned by tier stores
#[derive(Clone)]
pub struct ContentEntry {
    /// Entry key
    pub key: String,
    /// Payload (zero-copy)
    pub content: Bytes,
    /// Entry metadata
    pub metadata: ContentMetadata,
}

impl std::fmt::Debug for ContentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentEntry")
            .field("key", &self.key)
            .field("size", &self.content.len())
            .field("tier", &self.metadata.tier())
            .field("access_count", &self.metadata.base.access_count)
            .finish()
    }
}

/// Fast non-cryptographic hash (FxHash algorithm) used for integrity checks
#[inline]
pub fn content_hash(bytes: &[u8]) -> u64 {
    const SEED: u64 = 0x517cc1b727220a95;
    let mut hash = SEED;
    for &byte in bytes {
        hash = hash.rotate_left(5) ^ (byte as u64);
        hash = hash.wrapping_mul(SEED);
    }
    hash
}

// =============================================================================
// Tests
// =============================================================================
