/// GOVERNANCE VOTE SYNC
///
/// Mirrors stake into voting power for the external governance engine. Only
/// positions whose tier carries voting rights count, and only for accounts at or
/// above the voting threshold that are not flagged as violators.

use crate::stake_ledger::StakePosition;
use crate::tier_catalog::TierCatalog;
use crate::types::{AccountId, ONE_TOKEN};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceParameters {
    /// Minimum balance for any voting power
    pub voting_threshold: u128,
}

impl Default for GovernanceParameters {
    fn default() -> Self {
        GovernanceParameters {
            voting_threshold: 1_000 * ONE_TOKEN,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceVoteSync {
    pub params: GovernanceParameters,
    voting_power: BTreeMap<AccountId, u128>,
    violators: BTreeSet<AccountId>,
    total_voting_power: u128,
}

impl GovernanceVoteSync {
    pub fn new(params: GovernanceParameters) -> Self {
        GovernanceVoteSync {
            params,
            ..Default::default()
        }
    }

    /// Voting power `account` should hold given its positions.
    pub fn compute_power<'a, I>(
        &self,
        account: &str,
        positions: I,
        catalog: &TierCatalog,
        balance: u128,
    ) -> u128
    where
        I: IntoIterator<Item = &'a StakePosition>,
    {
        if balance < self.params.voting_threshold || self.is_violator(account) {
            return 0;
        }
        positions
            .into_iter()
            .filter(|p| catalog.has_voting_rights(p.duration))
            .fold(0u128, |acc, p| acc.saturating_add(p.amount))
    }

    /// Recompute and store voting power for `account`. Returns the new power.
    pub fn sync<'a, I>(
        &mut self,
        account: &str,
        positions: I,
        catalog: &TierCatalog,
        balance: u128,
    ) -> u128
    where
        I: IntoIterator<Item = &'a StakePosition>,
    {
        let power = self.compute_power(account, positions, catalog, balance);
        let previous = if power == 0 {
            self.voting_power.remove(account).unwrap_or(0)
        } else {
            self.voting_power.insert(account.to_string(), power).unwrap_or(0)
        };

        self.total_voting_power = self
            .total_voting_power
            .saturating_sub(previous)
            .saturating_add(power);

        if previous != power {
            debug!("Voting power of {}: {} -> {}", account, previous, power);
        }
        power
    }

    /// Flag or clear an account. Returns true if the flag changed.
    pub fn set_violator(&mut self, account: &str, flagged: bool) -> bool {
        let changed = if flagged {
            self.violators.insert(account.to_string())
        } else {
            self.violators.remove(account)
        };
        if changed {
            info!("Governance violator flag for {} set to {}", account, flagged);
        }
        changed
    }

    pub fn set_voting_threshold(&mut self, threshold: u128) {
        self.params.voting_threshold = threshold;
    }

    pub fn is_violator(&self, account: &str) -> bool {
        self.violators.contains(account)
    }

    pub fn voting_power(&self, account: &str) -> u128 {
        self.voting_power.get(account).copied().unwrap_or(0)
    }

    pub fn total_voting_power(&self) -> u128 {
        self.total_voting_power
    }

    pub fn verify(&self) -> Result<(), GovernanceError> {
        let sum = self
            .voting_power
            .values()
            .fold(0u128, |acc, p| acc.saturating_add(*p));
        if sum != self.total_voting_power {
            return Err(GovernanceError::InvariantViolation(format!(
                "voting power sums to {} but total is {}",
                sum, self.total_voting_power
            )));
        }
        if let Some(flagged) = self.violators.iter().find(|v| self.voting_power(v) > 0) {
            return Err(GovernanceError::InvariantViolation(format!(
                "violator {} holds voting power",
                flagged
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("Governance invariant violated: {0}")]
    InvariantViolation(String),
}
