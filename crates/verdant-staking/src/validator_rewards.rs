/// VALIDATOR REWARD DISTRIBUTOR
///
/// Holds the validator reward pool and computes each validator's share of it by
/// weighted stake (own balance plus delegations). Shares are deducted from the pool
/// before any payout is attempted; a failed payout aborts the enclosing operation,
/// whose rollback restores the pool.

use crate::types::{apply_bps, mul_div};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accounting outcome of a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRewardClaim {
    /// Amount deducted from the pool
    pub share: u128,
    /// Part of the share kept by the validator as commission
    pub commission: u128,
    /// Part of the share forwarded through the payout sink
    pub payout: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRewardDistributor {
    pool: u128,
    total_funded: u128,
    total_distributed: u128,
}

impl ValidatorRewardDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add funds to the pool (external funding or redistributed penalties).
    pub fn credit(&mut self, amount: u128) -> Result<(), RewardPoolError> {
        self.pool = self
            .pool
            .checked_add(amount)
            .ok_or(RewardPoolError::Overflow)?;
        self.total_funded = self.total_funded.saturating_add(amount);
        Ok(())
    }

    /// Share of the pool owed to a validator of `weight` out of `total_weight`.
    /// Falls back to an equal split across `validator_count` when total weight is zero.
    pub fn compute_share(
        &self,
        weight: u128,
        total_weight: u128,
        validator_count: usize,
    ) -> Result<u128, RewardPoolError> {
        if self.pool == 0 {
            return Err(RewardPoolError::InsufficientRewardPool);
        }
        if total_weight == 0 {
            if validator_count == 0 {
                return Err(RewardPoolError::DistributionFailed(
                    "no active validators".to_string(),
                ));
            }
            return Ok(self.pool / validator_count as u128);
        }
        Ok(mul_div(self.pool, weight.min(total_weight), total_weight))
    }

    /// Deduct a validator's share and split it into commission and payout.
    /// Commission is only charged when the validator has delegations.
    pub fn claim(
        &mut self,
        weight: u128,
        total_weight: u128,
        validator_count: usize,
        commission_bps: u32,
        has_delegations: bool,
    ) -> Result<ValidatorRewardClaim, RewardPoolError> {
        let share = self.compute_share(weight, total_weight, validator_count)?;
        if share == 0 {
            return Err(RewardPoolError::DistributionFailed(
                "computed share is zero".to_string(),
            ));
        }

        self.pool = self
            .pool
            .checked_sub(share)
            .ok_or(RewardPoolError::InsufficientRewardPool)?;
        self.total_distributed = self.total_distributed.saturating_add(share);

        let commission = if has_delegations {
            apply_bps(share, commission_bps)
        } else {
            0
        };
        let claim = ValidatorRewardClaim {
            share,
            commission,
            payout: share - commission,
        };
        info!(
            "Validator reward share {} (commission {}, payout {}), pool now {}",
            claim.share, claim.commission, claim.payout, self.pool
        );
        Ok(claim)
    }

    pub fn pool(&self) -> u128 {
        self.pool
    }

    pub fn total_funded(&self) -> u128 {
        self.total_funded
    }

    pub fn total_distributed(&self) -> u128 {
        self.total_distributed
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RewardPoolError {
    #[error("Validator reward pool is empty")]
    InsufficientRewardPool,
    #[error("Reward distribution failed: {0}")]
    DistributionFailed(String),
    #[error("Reward pool overflow")]
    Overflow,
}
