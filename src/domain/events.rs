//! Cache Events
//!
//! Immutable records of cache state transitions, delivered to registered
//! [`CacheEventListener`](super::ports::CacheEventListener)s.
//!
//! # Example
//!
//! ```
//! use tiercache::cache::{EntryKind, Tier};
//! use tiercache::domain::events::{CacheEvent, DemotionReason};
//!
//! let event = CacheEvent::demoted("report-1", EntryKind::Content, Tier::Hot, Tier::Warm, DemotionReason::Capacity);
//! assert_eq!(event.event_type(), "Demoted");
//! assert_eq!(event.key(), Some("report-1"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::entry::{EntryKind, Tier};

/// Why an entry moved to a slower tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemotionReason {
    /// Idle longer than the tier's maximum age
    Age,
    /// Hot tier over capacity
    Capacity,
    /// Hot tier written out before the process exits
    Shutdown,
}

/// Event describing a cache state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    /// An entry was written.
    Stored {
        key: String,
        kind: EntryKind,
        tier: Tier,
        size_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// An entry moved to a faster tier.
    Promoted {
        key: String,
        kind: EntryKind,
        from: Tier,
        to: Tier,
        timestamp: DateTime<Utc>,
    },

    /// An entry moved to a slower tier.
    Demoted {
        key: String,
        kind: EntryKind,
        from: Tier,
        to: Tier,
        reason: DemotionReason,
        timestamp: DateTime<Utc>,
    },

    /// An entry was dropped to make room.
    Evicted {
        key: String,
        kind: EntryKind,
        tier: Tier,
        timestamp: DateTime<Utc>,
    },

    /// An entry outlived its tier TTL and was dropped.
    Expired {
        key: String,
        kind: EntryKind,
        tier: Tier,
        timestamp: DateTime<Utc>,
    },

    /// An entry was explicitly deleted.
    Deleted {
        key: String,
        kind: EntryKind,
        tier: Tier,
        timestamp: DateTime<Utc>,
    },

    /// Entries were removed by an invalidation request.
    Invalidated {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Stored data failed to decode.
    CorruptionDetected {
        key: String,
        tier: Tier,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl CacheEvent {
    /// Create a Stored event.
    pub fn stored(key: impl Into<String>, kind: EntryKind, tier: Tier, size_bytes: u64) -> Self {
        CacheEvent::Stored {
            key: key.into(),
            kind,
            tier,
            size_bytes,
            timestamp: Utc::now(),
        }
    }

    /// Create a Promoted event.
    pub fn promoted(key: impl Into<String>, kind: EntryKind, from: Tier, to: Tier) -> Self {
        CacheEvent::Promoted {
            key: key.into(),
            kind,
            from,
            to,
            timestamp: Utc::now(),
        }
    }

    /// Create a Demoted event.
    pub fn demoted(
        key: impl Into<String>,
        kind: EntryKind,
        from: Tier,
        to: Tier,
        reason: DemotionReason,
    ) -> Self {
        CacheEvent::Demoted {
            key: key.into(),
            kind,
            from,
            to,
            reason,
            timestamp: Utc::now(),
        }
    }

    /// Create an Evicted event.
    pub fn evicted(key: impl Into<String>, kind: EntryKind, tier: Tier) -> Self {
        CacheEvent::Evicted {
            key: key.into(),
            kind,
            tier,
            timestamp: Utc::now(),
        }
    }

    /// Create an Expired event.
    pub fn expired(key: impl Into<String>, kind: EntryKind, tier: Tier) -> Self {
        CacheEvent::Expired {
            key: key.into(),
            kind,
            tier,
            timestamp: Utc::now(),
        }
    }

    /// Create a Deleted event.
    pub fn deleted(key: impl Into<String>, kind: EntryKind, tier: Tier) -> Self {
        CacheEvent::Deleted {
            key: key.into(),
            kind,
            tier,
            timestamp: Utc::now(),
        }
    }

    /// Create an Invalidated event.
    pub fn invalidated(count: usize) -> Self {
        CacheEvent::Invalidated {
            count,
            timestamp: Utc::now(),
        }
    }

    /// Create a CorruptionDetected event.
    pub fn corruption(key: impl Into<String>, tier: Tier, reason: impl Into<String>) -> Self {
        CacheEvent::CorruptionDetected {
            key: key.into(),
            tier,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheEvent::Stored { timestamp, .. } => *timestamp,
            CacheEvent::Promoted { timestamp, .. } => *timestamp,
            CacheEvent::Demoted { timestamp, .. } => *timestamp,
            CacheEvent::Evicted { timestamp, .. } => *timestamp,
            CacheEvent::Expired { timestamp, .. } => *timestamp,
            CacheEvent::Deleted { timestamp, .. } => *timestamp,
            CacheEvent::Invalidated { timestamp, .. } => *timestamp,
            CacheEvent::CorruptionDetected { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Stored { .. } => "Stored",
            CacheEvent::Promoted { .. } => "Promoted",
            CacheEvent::Demoted { .. } => "Demoted",
            CacheEvent::Evicted { .. } => "Evicted",
            CacheEvent::Expired { .. } => "Expired",
            CacheEvent::Deleted { .. } => "Deleted",
            CacheEvent::Invalidated { .. } => "Invalidated",
            CacheEvent::CorruptionDetected { .. } => "CorruptionDetected",
        }
    }

    /// Get the entry key if applicable.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Stored { key, .. }
            | CacheEvent::Promoted { key, .. }
            | CacheEvent::Demoted { key, .. }
            | CacheEvent::Evicted { key, .. }
            | CacheEvent::Expired { key, .. }
            | CacheEvent::Deleted { key, .. }
            | CacheEvent::CorruptionDetected { key, .. } => Some(key),
            CacheEvent::Invalidated { .. } => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let events = vec![
            CacheEvent::stored("k", EntryKind::Content, Tier::Hot, 10),
            CacheEvent::promoted("k", EntryKind::Content, Tier::Cold, Tier::Hot),
            CacheEvent::demoted("k", EntryKind::Content, Tier::Hot, Tier::Warm, DemotionReason::Age),
            CacheEvent::evicted("k", EntryKind::Retrieval, Tier::Cold),
            CacheEvent::expired("k", EntryKind::Retrieval, Tier::Warm),
            CacheEvent::deleted("k", EntryKind::Content, Tier::Warm),
            CacheEvent::invalidated(3),
            CacheEvent::corruption("k", Tier::Cold, "bad frame"),
        ];

        let names: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            names,
            vec![
                "Stored",
                "Promoted",
                "Demoted",
                "Evicted",
                "Expired",
                "Deleted",
                "Invalidated",
                "CorruptionDetected"
            ]
        );
    }

    #[test]
    fn test_event_key() {
        assert_eq!(
            CacheEvent::deleted("abc", EntryKind::Content, Tier::Hot).key(),
            Some("abc")
        );
        assert_eq!(CacheEvent::invalidated(1).key(), None);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event =
            CacheEvent::demoted("k1", EntryKind::Content, Tier::Warm, Tier::Cold, DemotionReason::Age);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Demoted");
        assert_eq!(json["from"], "warm");
        assert_eq!(json["to"], "cold");
        assert_eq!(json["reason"], "age");

        let back: CacheEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
