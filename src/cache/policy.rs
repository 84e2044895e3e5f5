//! Tier Movement Policies
//!
//! Read-time promotion, age-based demotion, and the access-count tier rule
//! used by the retrieval cache.

use serde::{Deserialize, Serialize};

use super::entry::{EntryMetadata, Tier};
use crate::error::{Error, Result};

/// Promotion heuristic applied on warm/cold hits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionPolicy {
    /// Promote on read at all
    pub enabled: bool,
    /// Minimum access count (after the current read)
    pub min_access_count: u32,
    /// Maximum days since last access, exclusive
    pub recency_window_days: f64,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self::balanced()
    }
}

impl PromotionPolicy {
    /// Balanced promotion policy (default)
    pub fn balanced() -> Self {
        Self {
            enabled: true,
            min_access_count: 3,
            recency_window_days: 1.0,
        }
    }

    /// Promote on the first read
    pub fn aggressive() -> Self {
        Self {
            enabled: true,
            min_access_count: 1,
            recency_window_days: 7.0,
        }
    }

    /// Never promote on read
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::balanced()
        }
    }

    /// Evaluate the heuristic against freshly refreshed metadata
    pub fn should_promote(&self, metadata: &EntryMetadata, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.enabled
            && metadata.access_count >= self.min_access_count
            && metadata.days_since_last_access(now) < self.recency_window_days
    }

    /// Reject settings that can never promote or never stop promoting
    pub fn validate(&self) -> Result<()> {
        if self.min_access_count == 0 {
            return Err(Error::Config(
                "promotion.min_access_count must be at least 1".into(),
            ));
        }
        if !(self.recency_window_days > 0.0) {
            return Err(Error::Config(format!(
                "promotion.recency_window_days must be positive, got {}",
                self.recency_window_days
            )));
        }
        Ok(())
    }
}

/// Age thresholds for the migration sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationPolicy {
    /// Hot entries idle longer than this move to warm
    pub hot_max_age_days: f64,
    /// Warm entries idle longer than this move to cold
    pub warm_max_age_days: f64,
}

impl Default for MigrationPolicy {
    fn default() -> Self {
        Self {
            hot_max_age_days: 7.0,
            warm_max_age_days: 30.0,
        }
    }
}

impl MigrationPolicy {
    /// Tier an idle entry should move to, if it is stale
    pub fn demotion_target(&self, tier: Tier, days_idle: f64) -> Option<Tier> {
        match tier {
            Tier::Hot if days_idle > self.hot_max_age_days => Some(Tier::Warm),
            Tier::Warm if days_idle > self.warm_max_age_days => Some(Tier::Cold),
            _ => None,
        }
    }

    /// Ages must be positive and increase with tier depth
    pub fn validate(&self) -> Result<()> {
        if !(self.hot_max_age_days > 0.0) || !(self.warm_max_age_days > 0.0) {
            return Err(Error::Config(format!(
                "migration ages must be positive (hot {}, warm {})",
                self.hot_max_age_days, self.warm_max_age_days
            )));
        }
        if self.warm_max_age_days <= self.hot_max_age_days {
            return Err(Error::Config(format!(
                "migration.warm_max_age_days ({}) must exceed hot_max_age_days ({})",
                self.warm_max_age_days, self.hot_max_age_days
            )));
        }
        Ok(())
    }
}

/// Access-count tier rule for retrieval entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessTierPolicy {
    /// Accesses needed for the hot tier
    pub hot_threshold: u32,
    /// Accesses needed for the warm tier
    pub warm_threshold: u32,
}

impl Default for AccessTierPolicy {
    fn default() -> Self {
        Self {
            hot_threshold: 10,
            warm_threshold: 3,
        }
    }
}

impl AccessTierPolicy {
    /// Tier for an entry with `access_count` reads
    pub fn tier_for(&self, access_count: u32) -> Tier {
        if access_count >= self.hot_threshold {
            Tier::Hot
        } else if access_count >= self.warm_threshold {
            Tier::Warm
        } else {
            Tier::Cold
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.warm_threshold == 0 {
            return Err(Error::Config("warm_threshold must be at least 1".into()));
        }
        if self.hot_threshold <= self.warm_threshold {
            return Err(Error::Config(format!(
                "hot_threshold ({}) must exceed warm_threshold ({})",
                self.hot_threshold, self.warm_threshold
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn accessed(count: u32, idle: Duration) -> (EntryMetadata, chrono::DateTime<Utc>) {
        let now = Utc::now();
        let mut meta = EntryMetadata::new(10, Tier::Warm, now - idle);
        meta.access_count = count;
        (meta, now)
    }

    #[test]
    fn test_promotion_requires_count_and_recency() {
        let policy = PromotionPolicy::balanced();

        let (meta, now) = accessed(3, Duration::hours(2));
        assert!(policy.should_promote(&meta, now));

        let (meta, now) = accessed(2, Duration::hours(2));
        assert!(!policy.should_promote(&meta, now));

        let (meta, now) = accessed(5, Duration::days(2));
        assert!(!policy.should_promote(&meta, now));
    }

    #[test]
    fn test_aggressive_promotes_on_first_read() {
        let policy = PromotionPolicy::aggressive();
        let (meta, now) = accessed(1, Duration::days(3));
        assert!(policy.should_promote(&meta, now));
        assert!(!PromotionPolicy::balanced().should_promote(&meta, now));
    }

    #[test]
    fn test_promotion_disabled() {
        let policy = PromotionPolicy::disabled();
        let (meta, now) = accessed(100, Duration::zero());
        assert!(!policy.should_promote(&meta, now));
    }

    #[test]
    fn test_promotion_validation() {
        assert!(PromotionPolicy::balanced().validate().is_ok());
        assert!(PromotionPolicy {
            min_access_count: 0,
            ..PromotionPolicy::balanced()
        }
        .validate()
        .is_err());
        assert!(PromotionPolicy {
            recency_window_days: f64::NAN,
            ..PromotionPolicy::balanced()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_demotion_targets() {
        let policy = MigrationPolicy::default();

        assert_eq!(policy.demotion_target(Tier::Hot, 8.0), Some(Tier::Warm));
        assert_eq!(policy.demotion_target(Tier::Hot, 7.0), None);
        assert_eq!(policy.demotion_target(Tier::Warm, 31.0), Some(Tier::Cold));
        assert_eq!(policy.demotion_target(Tier::Warm, 10.0), None);
        assert_eq!(policy.demotion_target(Tier::Cold, 1000.0), None);
    }

    #[test]
    fn test_migration_validation() {
        assert!(MigrationPolicy::default().validate().is_ok());

        let inverted = MigrationPolicy {
            hot_max_age_days: 30.0,
            warm_max_age_days: 7.0,
        };
        assert!(inverted.validate().is_err());

        let zero = MigrationPolicy {
            hot_max_age_days: 0.0,
            warm_max_age_days: 7.0,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_access_tier_rule() {
        let policy = AccessTierPolicy::default();

        assert_eq!(policy.tier_for(0), Tier::Cold);
        assert_eq!(policy.tier_for(2), Tier::Cold);
        assert_eq!(policy.tier_for(3), Tier::Warm);
        assert_eq!(policy.tier_for(9), Tier::Warm);
        assert_eq!(policy.tier_for(10), Tier::Hot);

        assert!(AccessTierPolicy {
            hot_threshold: 3,
            warm_threshold: 3
        }
        .validate()
        .is_err());
    }
}
