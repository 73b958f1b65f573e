/// PENALTY DISTRIBUTOR
///
/// Early-withdrawal penalty curve and routing of penalized or slashed funds.
///
/// Penalty rate decays linearly from `max_penalty_bps` at lock start to
/// `base_penalty_bps` just before unlock, and is zero once the lock expires.
///
/// Routing splits funds into burn / redistribute / liquidity shares. A share whose
/// destination fails cascades to the next one: burn -> redistribute -> liquidity ->
/// burn. Redistribution credits the validator reward pool and is unavailable while
/// no validator is active. Only when every destination fails is the routing an error.

use crate::collaborators::PenaltySinks;
use crate::stake_ledger::StakePosition;
use crate::types::{apply_bps, mul_div, AccountId, ProjectId, Timestamp, BPS_DENOMINATOR};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltySplit {
    pub burn_bps: u32,
    pub redistribute_bps: u32,
    pub liquidity_bps: u32,
}

impl Default for PenaltySplit {
    fn default() -> Self {
        PenaltySplit {
            burn_bps: 4_000,
            redistribute_bps: 4_000,
            liquidity_bps: 2_000,
        }
    }
}

impl PenaltySplit {
    pub fn validate(&self) -> Result<(), PenaltyError> {
        let sum = self.burn_bps as u128 + self.redistribute_bps as u128 + self.liquidity_bps as u128;
        if sum != BPS_DENOMINATOR {
            return Err(PenaltyError::InvalidSplit(sum));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyParameters {
    /// Penalty just before unlock
    pub base_penalty_bps: u32,
    /// Penalty at lock start
    pub max_penalty_bps: u32,
    pub split: PenaltySplit,
}

impl Default for PenaltyParameters {
    fn default() -> Self {
        PenaltyParameters {
            base_penalty_bps: 500,
            max_penalty_bps: 2_500,
            split: PenaltySplit::default(),
        }
    }
}

impl PenaltyParameters {
    pub fn validate(&self) -> Result<(), PenaltyError> {
        if self.base_penalty_bps > self.max_penalty_bps
            || self.max_penalty_bps as u128 > BPS_DENOMINATOR
        {
            return Err(PenaltyError::InvalidCurve {
                base: self.base_penalty_bps,
                max: self.max_penalty_bps,
            });
        }
        self.split.validate()
    }
}

/// Where routed funds ended up. Always sums to the routed total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PenaltyBreakdown {
    pub burned: u128,
    pub redistributed: u128,
    pub to_liquidity: u128,
}

impl PenaltyBreakdown {
    pub fn total(&self) -> u128 {
        self.burned + self.redistributed + self.to_liquidity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyEvent {
    pub project_id: ProjectId,
    pub timestamp: Timestamp,
    pub total_penalty: u128,
    pub burned: u128,
    pub redistributed: u128,
    pub to_liquidity: u128,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PenaltyDistributor {
    pub params: PenaltyParameters,
    history: BTreeMap<AccountId, Vec<PenaltyEvent>>,
    total_burned: u128,
    total_redistributed: u128,
    total_to_liquidity: u128,
}

impl PenaltyDistributor {
    pub fn new(params: PenaltyParameters) -> Self {
        PenaltyDistributor {
            params,
            ..Default::default()
        }
    }

    /// Early-withdrawal rate for a position at `now`, in basis points.
    pub fn penalty_rate_bps(&self, position: &StakePosition, now: Timestamp) -> u32 {
        if !position.is_locked(now) || position.duration == 0 {
            return 0;
        }
        let base = self.params.base_penalty_bps;
        let span = self.params.max_penalty_bps.saturating_sub(base) as u128;
        let remaining = position.time_until_unlock(now).min(position.duration) as u128;
        base + mul_div(remaining, span, position.duration as u128) as u32
    }

    pub fn penalty_for(&self, position: &StakePosition, amount: u128, now: Timestamp) -> u128 {
        apply_bps(amount, self.penalty_rate_bps(position, now))
    }

    /// Route `total` through the sinks with cascading fallback.
    ///
    /// The redistributed part is not moved here; the caller credits it to the
    /// validator reward pool.
    pub fn route(
        &mut self,
        total: u128,
        sinks: &mut dyn PenaltySinks,
        redistribution_open: bool,
    ) -> Result<PenaltyBreakdown, PenaltyError> {
        let mut breakdown = PenaltyBreakdown::default();
        if total == 0 {
            return Ok(breakdown);
        }

        let split = self.params.split;
        let burn_share = apply_bps(total, split.burn_bps);
        let redistribute_share = apply_bps(total, split.redistribute_bps);
        let liquidity_share = total - burn_share - redistribute_share;

        let mut carry = 0u128;

        if burn_share > 0 {
            match sinks.burn(burn_share) {
                Ok(()) => breakdown.burned += burn_share,
                Err(e) => {
                    warn!("Burn of {} failed, cascading to redistribution: {}", burn_share, e);
                    carry += burn_share;
                }
            }
        }

        let to_redistribute = redistribute_share + carry;
        carry = 0;
        if to_redistribute > 0 {
            if redistribution_open {
                breakdown.redistributed += to_redistribute;
            } else {
                warn!(
                    "No active validators, cascading {} to liquidity",
                    to_redistribute
                );
                carry = to_redistribute;
            }
        }

        let to_liquidity = liquidity_share + carry;
        carry = 0;
        if to_liquidity > 0 {
            match sinks.inject_liquidity(to_liquidity) {
                Ok(()) => breakdown.to_liquidity += to_liquidity,
                Err(e) => {
                    warn!("Liquidity injection of {} failed, burning instead: {}", to_liquidity, e);
                    carry = to_liquidity;
                }
            }
        }

        if carry > 0 {
            match sinks.burn(carry) {
                Ok(()) => breakdown.burned += carry,
                Err(e) => {
                    return Err(PenaltyError::SinksExhausted {
                        stranded: carry,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.total_burned += breakdown.burned;
        self.total_redistributed += breakdown.redistributed;
        self.total_to_liquidity += breakdown.to_liquidity;

        Ok(breakdown)
    }

    /// Append a penalty event for `account`.
    pub fn record_penalty(
        &mut self,
        account: &str,
        project: ProjectId,
        now: Timestamp,
        breakdown: &PenaltyBreakdown,
    ) -> &PenaltyEvent {
        let event = PenaltyEvent {
            project_id: project,
            timestamp: now,
            total_penalty: breakdown.total(),
            burned: breakdown.burned,
            redistributed: breakdown.redistributed,
            to_liquidity: breakdown.to_liquidity,
        };
        info!(
            "Early withdrawal penalty for {} on project {}: {} (burned {}, redistributed {}, liquidity {})",
            account, project, event.total_penalty, event.burned, event.redistributed, event.to_liquidity
        );
        let events = self.history.entry(account.to_string()).or_default();
        events.push(event);
        &events[events.len() - 1]
    }

    pub fn penalty_history(&self, account: &str) -> &[PenaltyEvent] {
        self.history.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_burned(&self) -> u128 {
        self.total_burned
    }

    pub fn total_redistributed(&self) -> u128 {
        self.total_redistributed
    }

    pub fn total_to_liquidity(&self) -> u128 {
        self.total_to_liquidity
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PenaltyError {
    /// Every destination, including the last-resort burn, refused the funds
    #[error("All penalty sinks failed, {stranded} undistributed: {reason}")]
    SinksExhausted { stranded: u128, reason: String },
    #[error("Penalty split must sum to 10000 bps, got {0}")]
    InvalidSplit(u128),
    #[error("Invalid penalty curve: base {base} bps, max {max} bps")]
    InvalidCurve { base: u32, max: u32 },
}
