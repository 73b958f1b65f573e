/// STAKING TIER CATALOG
///
/// Duration-indexed multiplier brackets. The catalog is immutable once built and is
/// ordered strictly by minimum duration, so lookups resolve to the highest tier whose
/// threshold the committed duration reaches.

use crate::types::{Timestamp, SECONDS_PER_DAY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multiplier applied when a duration falls below every tier (1.0x)
pub const BASE_MULTIPLIER: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Minimum commitment length in seconds
    pub min_duration: Timestamp,
    /// Yield multiplier in percent (150 = 1.5x)
    pub multiplier: u32,
    /// Whether stake in this tier counts toward governance voting power
    pub has_voting_rights: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCatalog {
    tiers: Vec<Tier>,
}

impl TierCatalog {
    /// Build a catalog, rejecting unordered or non-monotonic tables.
    pub fn new(tiers: Vec<Tier>) -> Result<Self, TierError> {
        if tiers.is_empty() {
            return Err(TierError::Empty);
        }

        for (index, pair) in tiers.windows(2).enumerate() {
            if pair[1].min_duration <= pair[0].min_duration {
                return Err(TierError::UnorderedDurations(index + 1));
            }
            if pair[1].multiplier < pair[0].multiplier {
                return Err(TierError::DecreasingMultiplier(index + 1));
            }
        }

        if tiers.iter().any(|t| t.multiplier == 0) {
            return Err(TierError::ZeroMultiplier);
        }

        Ok(TierCatalog { tiers })
    }

    /// Index of the applicable tier for `duration`, if any tier applies.
    pub fn tier_index_for(&self, duration: Timestamp) -> Option<usize> {
        // Durations are strictly increasing, so the partition point is the count of
        // tiers whose threshold is reached.
        let reached = self.tiers.partition_point(|t| t.min_duration <= duration);
        reached.checked_sub(1)
    }

    pub fn tier_for(&self, duration: Timestamp) -> Option<&Tier> {
        self.tier_index_for(duration).map(|i| &self.tiers[i])
    }

    pub fn multiplier_for(&self, duration: Timestamp) -> u32 {
        self.tier_for(duration)
            .map(|t| t.multiplier)
            .unwrap_or(BASE_MULTIPLIER)
    }

    pub fn has_voting_rights(&self, duration: Timestamp) -> bool {
        self.tier_for(duration)
            .map(|t| t.has_voting_rights)
            .unwrap_or(false)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        TierCatalog {
            tiers: default_tiers(),
        }
    }
}

/// Genesis tier table: 7d 1.0x, 30d 1.25x, 90d 1.5x, 180d 2x, 365d 3x.
pub fn default_tiers() -> Vec<Tier> {
    vec![
        Tier { min_duration: 7 * SECONDS_PER_DAY, multiplier: 100, has_voting_rights: false },
        Tier { min_duration: 30 * SECONDS_PER_DAY, multiplier: 125, has_voting_rights: false },
        Tier { min_duration: 90 * SECONDS_PER_DAY, multiplier: 150, has_voting_rights: true },
        Tier { min_duration: 180 * SECONDS_PER_DAY, multiplier: 200, has_voting_rights: true },
        Tier { min_duration: 365 * SECONDS_PER_DAY, multiplier: 300, has_voting_rights: true },
    ]
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TierError {
    #[error("Tier catalog must contain at least one tier")]
    Empty,
    #[error("Tier {0} does not strictly increase min_duration")]
    UnorderedDurations(usize),
    #[error("Tier {0} lowers the multiplier")]
    DecreasingMultiplier(usize),
    #[error("Tier multiplier cannot be zero")]
    ZeroMultiplier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_lookup() {
        let catalog = TierCatalog::default();

        assert_eq!(catalog.multiplier_for(7 * SECONDS_PER_DAY), 100);
        assert_eq!(catalog.multiplier_for(89 * SECONDS_PER_DAY), 125);
        assert_eq!(catalog.multiplier_for(90 * SECONDS_PER_DAY), 150);
        assert_eq!(catalog.multiplier_for(10_000 * SECONDS_PER_DAY), 300);
    }

    #[test]
    fn test_duration_below_first_tier() {
        let catalog = TierCatalog::default();
        assert!(catalog.tier_for(SECONDS_PER_DAY).is_none());
        assert_eq!(catalog.multiplier_for(SECONDS_PER_DAY), BASE_MULTIPLIER);
        assert!(!catalog.has_voting_rights(SECONDS_PER_DAY));
    }

    #[test]
    fn test_voting_rights_follow_tier() {
        let catalog = TierCatalog::default();
        assert!(!catalog.has_voting_rights(30 * SECONDS_PER_DAY));
        assert!(catalog.has_voting_rights(90 * SECONDS_PER_DAY));
    }

    #[test]
    fn test_rejects_unordered_durations() {
        let tiers = vec![
            Tier { min_duration: 100, multiplier: 100, has_voting_rights: false },
            Tier { min_duration: 100, multiplier: 120, has_voting_rights: false },
        ];
        assert_eq!(TierCatalog::new(tiers), Err(TierError::UnorderedDurations(1)));
    }

    #[test]
    fn test_rejects_decreasing_multiplier() {
        let tiers = vec![
            Tier { min_duration: 100, multiplier: 150, has_voting_rights: false },
            Tier { min_duration: 200, multiplier: 120, has_voting_rights: false },
        ];
        assert_eq!(TierCatalog::new(tiers), Err(TierError::DecreasingMultiplier(1)));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(TierCatalog::new(vec![]), Err(TierError::Empty));
    }
}
