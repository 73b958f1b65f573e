/// STAKING ERRORS
///
/// Every component error converts into `StakingError`. Any error returned from an
/// engine operation means the operation was rolled back in full.

use crate::access_control::AccessError;
use crate::collaborators::CollaboratorError;
use crate::config::ConfigError;
use crate::governance_sync::GovernanceError;
use crate::penalty_distributor::PenaltyError;
use crate::reward_accrual::RewardError;
use crate::slashing_engine::SlashError;
use crate::stake_ledger::LedgerError;
use crate::tier_catalog::TierError;
use crate::types::{ProjectId, Timestamp};
use crate::validator_registry::ValidatorError;
use crate::validator_rewards::RewardPoolError;
use thiserror::Error;

/// Coarse classification for callers that only need to branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input
    Validation,
    /// Caller lacks permission
    Authorization,
    /// Request conflicts with current state
    StateConflict,
    /// Insufficient funds or arithmetic limits
    Economic,
    /// Re-entrant or otherwise unserializable call
    Concurrency,
    /// A collaborator refused or failed
    External,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StakingError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Tier error: {0}")]
    Tier(#[from] TierError),
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),
    #[error("Validator error: {0}")]
    Validator(#[from] ValidatorError),
    #[error("Reward pool error: {0}")]
    RewardPool(#[from] RewardPoolError),
    #[error("Slashing error: {0}")]
    Slashing(#[from] SlashError),
    #[error("Penalty error: {0}")]
    Penalty(#[from] PenaltyError),
    #[error("Governance error: {0}")]
    Governance(#[from] GovernanceError),
    #[error("Access denied: {0}")]
    Access(#[from] AccessError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Collaborator call failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("Project {0} does not exist")]
    ProjectNotFound(ProjectId),
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Nothing to claim")]
    NothingToClaim,
    #[error("Timestamp {now} precedes last observed time {last}")]
    NonMonotonicTime { now: Timestamp, last: Timestamp },
    #[error("Re-entrant call rejected")]
    Reentrant,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl StakingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StakingError::Ledger(e) => match e {
                LedgerError::ZeroAmount | LedgerError::DurationTooShort { .. } => ErrorKind::Validation,
                LedgerError::Overflow => ErrorKind::Economic,
                LedgerError::PositionNotFound(_)
                | LedgerError::InsufficientStake { .. }
                | LedgerError::InvariantViolation(_) => ErrorKind::StateConflict,
            },
            StakingError::Validator(e) => match e {
                ValidatorError::InsufficientStake { .. }
                | ValidatorError::InsufficientDelegation { .. }
                | ValidatorError::Overflow => ErrorKind::Economic,
                ValidatorError::CommissionTooHigh { .. }
                | ValidatorError::ZeroAmount
                | ValidatorError::SelfDelegation
                | ValidatorError::InvalidParameters(_) => ErrorKind::Validation,
                ValidatorError::NotValidator(_)
                | ValidatorError::AlreadyValidator(_)
                | ValidatorError::GovernanceViolator(_)
                | ValidatorError::DelegationNotFound(_)
                | ValidatorError::InvariantViolation(_) => ErrorKind::StateConflict,
            },
            StakingError::Slashing(e) => match e {
                SlashError::ZeroAmount
                | SlashError::UnspecifiedReason
                | SlashError::InvalidParameters(_) => ErrorKind::Validation,
                SlashError::BelowMinimum { .. } => ErrorKind::Economic,
                SlashError::NotValidator(_)
                | SlashError::CooldownActive { .. }
                | SlashError::RecordNotFound(_)
                | SlashError::AppealNotAllowed(_)
                | SlashError::TamperedRecord { .. } => ErrorKind::StateConflict,
            },
            StakingError::Penalty(e) => match e {
                PenaltyError::SinksExhausted { .. } => ErrorKind::External,
                PenaltyError::InvalidSplit(_) | PenaltyError::InvalidCurve { .. } => {
                    ErrorKind::Validation
                }
            },
            StakingError::RewardPool(_) => ErrorKind::Economic,
            StakingError::Tier(_)
            | StakingError::Reward(_)
            | StakingError::Config(_)
            | StakingError::ProjectNotFound(_)
            | StakingError::ZeroAmount
            | StakingError::NonMonotonicTime { .. } => ErrorKind::Validation,
            StakingError::Access(_) => ErrorKind::Authorization,
            StakingError::Collaborator(_) => ErrorKind::External,
            StakingError::Reentrant => ErrorKind::Concurrency,
            StakingError::Governance(_)
            | StakingError::NothingToClaim
            | StakingError::Serialization(_)
            | StakingError::InvariantViolation(_) => ErrorKind::StateConflict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(StakingError::from(LedgerError::ZeroAmount).kind(), ErrorKind::Validation);
        assert_eq!(
            StakingError::from(AccessError::LastAdmin).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            StakingError::from(RewardPoolError::InsufficientRewardPool).kind(),
            ErrorKind::Economic
        );
        assert_eq!(
            StakingError::from(SlashError::BelowMinimum { amount: 0, minimum: 1 }).kind(),
            ErrorKind::Economic
        );
        assert_eq!(
            StakingError::from(SlashError::UnspecifiedReason).kind(),
            ErrorKind::Validation
        );
        assert_eq!(StakingError::Reentrant.kind(), ErrorKind::Concurrency);
        assert_eq!(
            StakingError::from(CollaboratorError::Unavailable("token".into())).kind(),
            ErrorKind::External
        );
    }

    #[test]
    fn test_error_display_wraps_source() {
        let err = StakingError::from(SlashError::CooldownActive { remaining: 30 });
        assert_eq!(
            err.to_string(),
            "Slashing error: Slash cooldown active for another 30s"
        );
    }
}
