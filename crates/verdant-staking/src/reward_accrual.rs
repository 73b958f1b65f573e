/// REWARD ACCRUAL ENGINE
///
/// Time-weighted yield for stake positions. The annual rate is a dynamic base rate
/// (or the boosted rate while total stake is below the low-stake threshold), plus
/// NFT and LP boosts, scaled by the tier multiplier of the committed duration.
///
/// Rates halve on a fixed schedule; between halvings a slow adjustment pass nudges
/// them toward a target total stake. All rates are basis points.

use crate::stake_ledger::StakePosition;
use crate::tier_catalog::TierCatalog;
use crate::types::{
    apply_bps, mul_div, Timestamp, BPS_DENOMINATOR, MULTIPLIER_DENOMINATOR, ONE_TOKEN,
    SECONDS_PER_DAY, SECONDS_PER_YEAR,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling for any configured APR (50%)
pub const MAX_APR_CEILING_BPS: u32 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardParameters {
    /// Base APR at genesis
    pub initial_base_apr_bps: u32,
    /// APR paid while total stake is under `low_stake_threshold`
    pub initial_boosted_apr_bps: u32,
    /// Added to the base rate for positions holding an NFT boost
    pub nft_boost_bps: u32,
    /// Added to the base rate for liquidity-provider positions
    pub lp_boost_bps: u32,
    pub low_stake_threshold: u128,
    /// Interval between halvings
    pub halving_period: Timestamp,
    /// Halving floors
    pub min_base_apr_bps: u32,
    pub min_boosted_apr_bps: u32,
    /// Ceiling for the dynamic adjustment pass and governance updates
    pub max_apr_bps: u32,
    /// Total stake the adjustment pass steers toward
    pub target_total_stake: u128,
    pub rate_adjustment_interval: Timestamp,
    /// Relative step per adjustment (100 = rates move by 1% of themselves)
    pub rate_adjustment_step_bps: u32,
    /// Share of settled yield re-staked for auto-compounding positions
    pub compound_fraction_bps: u32,
}

impl Default for RewardParameters {
    fn default() -> Self {
        RewardParameters {
            initial_base_apr_bps: 1_000,    // 10%
            initial_boosted_apr_bps: 1_500, // 15%
            nft_boost_bps: 200,
            lp_boost_bps: 300,
            low_stake_threshold: 1_000_000 * ONE_TOKEN,
            halving_period: 365 * SECONDS_PER_DAY,
            min_base_apr_bps: 100,
            min_boosted_apr_bps: 150,
            max_apr_bps: MAX_APR_CEILING_BPS,
            target_total_stake: 10_000_000 * ONE_TOKEN,
            rate_adjustment_interval: SECONDS_PER_DAY,
            rate_adjustment_step_bps: 100,
            compound_fraction_bps: 8_000, // 80% re-staked
        }
    }
}

impl RewardParameters {
    pub fn validate(&self) -> Result<(), RewardError> {
        if self.max_apr_bps > MAX_APR_CEILING_BPS {
            return Err(RewardError::InvalidParameters(format!(
                "max_apr_bps {} exceeds ceiling {}",
                self.max_apr_bps, MAX_APR_CEILING_BPS
            )));
        }
        if self.min_base_apr_bps > self.initial_base_apr_bps
            || self.initial_base_apr_bps > self.max_apr_bps
        {
            return Err(RewardError::InvalidParameters(
                "initial base APR must lie within [min, max]".to_string(),
            ));
        }
        if self.min_boosted_apr_bps > self.initial_boosted_apr_bps
            || self.initial_boosted_apr_bps > self.max_apr_bps
        {
            return Err(RewardError::InvalidParameters(
                "initial boosted APR must lie within [min, max]".to_string(),
            ));
        }
        if self.halving_period == 0 {
            return Err(RewardError::InvalidParameters(
                "halving_period must be non-zero".to_string(),
            ));
        }
        if self.compound_fraction_bps as u128 > BPS_DENOMINATOR
            || self.rate_adjustment_step_bps as u128 > BPS_DENOMINATOR
        {
            return Err(RewardError::InvalidParameters(
                "fractions cannot exceed 10000 bps".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which schedule steps ran during a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateScheduleOutcome {
    pub halved: bool,
    pub adjusted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAccrualEngine {
    pub params: RewardParameters,
    dynamic_base_apr_bps: u32,
    dynamic_boosted_apr_bps: u32,
    halving_epoch: u32,
    last_halving_time: Timestamp,
    last_rate_adjustment: Timestamp,
}

impl RewardAccrualEngine {
    /// Initialize the rate schedule starting at `genesis_time`.
    pub fn genesis(params: RewardParameters, genesis_time: Timestamp) -> Self {
        RewardAccrualEngine {
            dynamic_base_apr_bps: params.initial_base_apr_bps,
            dynamic_boosted_apr_bps: params.initial_boosted_apr_bps,
            halving_epoch: 0,
            last_halving_time: genesis_time,
            last_rate_adjustment: genesis_time,
            params,
        }
    }

    /// Base rate in force for the given total stake.
    pub fn base_rate_bps(&self, total_staked: u128) -> u32 {
        if total_staked < self.params.low_stake_threshold {
            self.dynamic_boosted_apr_bps
        } else {
            self.dynamic_base_apr_bps
        }
    }

    /// Annual rate for a position, in basis points after the tier multiplier.
    pub fn effective_rate_bps(
        &self,
        position: &StakePosition,
        total_staked: u128,
        catalog: &TierCatalog,
    ) -> u128 {
        self.scaled_rate(position, total_staked, catalog) / MULTIPLIER_DENOMINATOR
    }

    /// Boosted rate times the tier multiplier, still scaled by 100.
    fn scaled_rate(&self, position: &StakePosition, total_staked: u128, catalog: &TierCatalog) -> u128 {
        let mut rate = self.base_rate_bps(total_staked) as u128;
        if position.has_nft_boost {
            rate += self.params.nft_boost_bps as u128;
        }
        if position.is_lp_staker {
            rate += self.params.lp_boost_bps as u128;
        }
        rate * catalog.multiplier_for(position.duration) as u128
    }

    /// Yield accrued since the position's last checkpoint.
    ///
    /// `amount * rate * elapsed / (10_000 * SECONDS_PER_YEAR)`; the multiplier is
    /// applied before dividing so tier scaling does not lose precision.
    pub fn pending_reward(
        &self,
        position: &StakePosition,
        now: Timestamp,
        total_staked: u128,
        catalog: &TierCatalog,
    ) -> u128 {
        let elapsed = now.saturating_sub(position.last_checkpoint) as u128;
        if elapsed == 0 || position.amount == 0 {
            return 0;
        }

        let scaled_rate = self.scaled_rate(position, total_staked, catalog);
        mul_div(
            position.amount,
            scaled_rate * elapsed,
            BPS_DENOMINATOR * MULTIPLIER_DENOMINATOR * SECONDS_PER_YEAR as u128,
        )
    }

    /// Halve both dynamic rates if a full halving period has passed since the last
    /// halving. Returns true when a halving was applied.
    pub fn check_halving(&mut self, now: Timestamp) -> bool {
        if now.saturating_sub(self.last_halving_time) < self.params.halving_period {
            return false;
        }

        self.dynamic_base_apr_bps = (self.dynamic_base_apr_bps / 2).max(self.params.min_base_apr_bps);
        self.dynamic_boosted_apr_bps =
            (self.dynamic_boosted_apr_bps / 2).max(self.params.min_boosted_apr_bps);
        self.halving_epoch += 1;
        self.last_halving_time = now;

        info!(
            "Reward halving #{}: base {} bps, boosted {} bps",
            self.halving_epoch, self.dynamic_base_apr_bps, self.dynamic_boosted_apr_bps
        );
        true
    }

    /// Nudge rates toward the target total stake, at most once per interval.
    /// Returns true when the pass ran.
    pub fn adjust_dynamic_rates(&mut self, total_staked: u128, now: Timestamp) -> bool {
        if now.saturating_sub(self.last_rate_adjustment) < self.params.rate_adjustment_interval {
            return false;
        }
        self.last_rate_adjustment = now;

        let step = self.params.rate_adjustment_step_bps;
        let target = self.params.target_total_stake;
        let max = self.params.max_apr_bps;
        let nudge = |rate: u32, floor: u32| -> u32 {
            let delta = (apply_bps(rate as u128, step) as u32).max(1);
            if total_staked < target {
                rate.saturating_add(delta).min(max)
            } else if total_staked > target {
                rate.saturating_sub(delta).max(floor)
            } else {
                rate
            }
        };

        self.dynamic_base_apr_bps = nudge(self.dynamic_base_apr_bps, self.params.min_base_apr_bps);
        self.dynamic_boosted_apr_bps =
            nudge(self.dynamic_boosted_apr_bps, self.params.min_boosted_apr_bps);

        debug!(
            "Dynamic rates adjusted (total staked {}): base {} bps, boosted {} bps",
            total_staked, self.dynamic_base_apr_bps, self.dynamic_boosted_apr_bps
        );
        true
    }

    /// Run the rate schedule for a settlement. A halving suppresses the adjustment
    /// pass for the same settlement.
    pub fn run_schedule(&mut self, total_staked: u128, now: Timestamp) -> RateScheduleOutcome {
        if self.check_halving(now) {
            return RateScheduleOutcome {
                halved: true,
                adjusted: false,
            };
        }
        RateScheduleOutcome {
            halved: false,
            adjusted: self.adjust_dynamic_rates(total_staked, now),
        }
    }

    /// Split settled yield into (compounded, payable) for auto-compounding positions.
    pub fn split_compound(&self, reward: u128) -> (u128, u128) {
        let compounded = apply_bps(reward, self.params.compound_fraction_bps);
        (compounded, reward - compounded)
    }

    /// Governance override of the dynamic rates.
    pub fn set_dynamic_rates(&mut self, base_bps: u32, boosted_bps: u32) -> Result<(), RewardError> {
        if base_bps < self.params.min_base_apr_bps || base_bps > self.params.max_apr_bps {
            return Err(RewardError::RateOutOfBounds(base_bps));
        }
        if boosted_bps < self.params.min_boosted_apr_bps || boosted_bps > self.params.max_apr_bps {
            return Err(RewardError::RateOutOfBounds(boosted_bps));
        }
        if boosted_bps < base_bps {
            return Err(RewardError::BoostedBelowBase);
        }
        self.dynamic_base_apr_bps = base_bps;
        self.dynamic_boosted_apr_bps = boosted_bps;
        Ok(())
    }

    pub fn dynamic_base_apr_bps(&self) -> u32 {
        self.dynamic_base_apr_bps
    }

    pub fn dynamic_boosted_apr_bps(&self) -> u32 {
        self.dynamic_boosted_apr_bps
    }

    pub fn halving_epoch(&self) -> u32 {
        self.halving_epoch
    }

    pub fn last_halving_time(&self) -> Timestamp {
        self.last_halving_time
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error("Invalid reward parameters: {0}")]
    InvalidParameters(String),
    #[error("Rate {0} bps is outside the permitted bounds")]
    RateOutOfBounds(u32),
    #[error("Boosted rate cannot be below the base rate")]
    BoostedBelowBase,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(amount: u128, duration_days: u64) -> StakePosition {
        StakePosition {
            amount,
            staking_start: 0,
            last_checkpoint: 0,
            duration: duration_days * SECONDS_PER_DAY,
            is_lp_staker: false,
            has_nft_boost: false,
            auto_compounding: false,
            accrued_rewards: 0,
        }
    }

    fn engine() -> RewardAccrualEngine {
        let params = RewardParameters {
            low_stake_threshold: 0,
            ..RewardParameters::default()
        };
        RewardAccrualEngine::genesis(params, 0)
    }

    #[test]
    fn test_pending_reward_ninety_day_tier() {
        let engine = engine();
        let catalog = TierCatalog::default();
        let pos = position(1_000, 90);

        // 1000 * (10% * 1.5) * 30/365 = 12.33
        let reward = engine.pending_reward(&pos, 30 * SECONDS_PER_DAY, 1_000, &catalog);
        assert_eq!(reward, 12);
    }

    #[test]
    fn test_boosted_rate_below_low_stake_threshold() {
        let mut params = RewardParameters::default();
        params.low_stake_threshold = 10_000;
        let engine = RewardAccrualEngine::genesis(params, 0);

        assert_eq!(engine.base_rate_bps(9_999), 1_500);
        assert_eq!(engine.base_rate_bps(10_000), 1_000);
    }

    #[test]
    fn test_boosts_add_to_rate() {
        let engine = engine();
        let catalog = TierCatalog::default();
        let mut pos = position(1_000_000, 7);
        pos.has_nft_boost = true;
        pos.is_lp_staker = true;

        assert_eq!(engine.effective_rate_bps(&pos, 1, &catalog), 1_500);
    }

    #[test]
    fn test_no_reward_without_elapsed_time() {
        let engine = engine();
        let catalog = TierCatalog::default();
        let pos = position(1_000, 90);
        assert_eq!(engine.pending_reward(&pos, 0, 1_000, &catalog), 0);
    }

    #[test]
    fn test_halving_applies_once_per_period() {
        let mut engine = engine();
        let period = engine.params.halving_period;

        assert!(!engine.check_halving(period - 1));
        assert!(engine.check_halving(period));
        assert!(!engine.check_halving(period + 10));

        assert_eq!(engine.halving_epoch(), 1);
        assert_eq!(engine.dynamic_base_apr_bps(), 500);
        assert_eq!(engine.dynamic_boosted_apr_bps(), 750);
    }

    #[test]
    fn test_halving_respects_floors() {
        let mut engine = engine();
        let period = engine.params.halving_period;
        for i in 1..=10 {
            engine.check_halving(period * i);
        }
        assert_eq!(engine.dynamic_base_apr_bps(), engine.params.min_base_apr_bps);
        assert_eq!(engine.dynamic_boosted_apr_bps(), engine.params.min_boosted_apr_bps);
    }

    #[test]
    fn test_halving_suppresses_adjustment() {
        let mut engine = engine();
        let period = engine.params.halving_period;

        let outcome = engine.run_schedule(0, period);
        assert!(outcome.halved);
        assert!(!outcome.adjusted);
        assert_eq!(engine.dynamic_base_apr_bps(), 500);

        // Next interval the adjustment runs again (under target -> rates rise)
        let outcome = engine.run_schedule(0, period + SECONDS_PER_DAY);
        assert!(outcome.adjusted);
        assert_eq!(engine.dynamic_base_apr_bps(), 505);
    }

    #[test]
    fn test_adjustment_lowers_rates_above_target() {
        let mut engine = engine();
        let target = engine.params.target_total_stake;
        assert!(engine.adjust_dynamic_rates(target + 1, SECONDS_PER_DAY));
        assert_eq!(engine.dynamic_base_apr_bps(), 990);
        assert!(!engine.adjust_dynamic_rates(target + 1, SECONDS_PER_DAY + 1));
    }

    #[test]
    fn test_split_compound() {
        let engine = engine();
        assert_eq!(engine.split_compound(1_000), (800, 200));
        assert_eq!(engine.split_compound(1), (0, 1));
    }

    #[test]
    fn test_set_dynamic_rates_bounds() {
        let mut engine = engine();
        assert_eq!(engine.set_dynamic_rates(50, 1_000), Err(RewardError::RateOutOfBounds(50)));
        assert_eq!(engine.set_dynamic_rates(1_200, 1_000), Err(RewardError::BoostedBelowBase));
        assert!(engine.set_dynamic_rates(800, 1_200).is_ok());
        assert_eq!(engine.dynamic_base_apr_bps(), 800);
    }

    #[test]
    fn test_default_parameters_validate() {
        assert!(RewardParameters::default().validate().is_ok());
    }
}
