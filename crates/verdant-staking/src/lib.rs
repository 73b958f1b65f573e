/// VERDANT STAKING: STAKE ACCOUNTING & VALIDATOR ECONOMY
///
/// This crate implements the staking core of the Verdant network:
/// - Per-project stake positions with duration tiers
/// - Time-weighted yield with halving and dynamic rate adjustment
/// - Automatic validator promotion by stake threshold, commission and delegation
/// - Weighted sharing of the validator reward pool
/// - Cooldown-gated, capped slashing with appeals
/// - Early-withdrawal penalties routed through cascading sinks
///
/// Every engine operation is atomic: it either completes or leaves state untouched.

pub mod access_control;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod governance_sync;
pub mod participant_index;
pub mod penalty_distributor;
pub mod reward_accrual;
pub mod shared_engine;
pub mod slashing_engine;
pub mod stake_ledger;
pub mod tier_catalog;
pub mod types;
pub mod validator_registry;
pub mod validator_rewards;

// Re-export key types for easy access
pub use access_control::{AccessControl, AccessError, Role};
pub use collaborators::{
    CollaboratorError, Collaborators, PenaltySinks, ProjectRegistry, RewardPayout,
    SlashingRegistry, ValueTransfer,
};
pub use crate::config::{ConfigError, StakingConfig};
pub use engine::{EngineState, SlashReceipt, StakingEngine, WithdrawalReceipt};
pub use error::{ErrorKind, StakingError};
pub use governance_sync::{GovernanceParameters, GovernanceVoteSync};
pub use participant_index::ActiveParticipantIndex;
pub use penalty_distributor::{
    PenaltyBreakdown, PenaltyDistributor, PenaltyEvent, PenaltyParameters, PenaltySplit,
};
pub use reward_accrual::{RewardAccrualEngine, RewardParameters};
pub use shared_engine::SharedStakingEngine;
pub use slashing_engine::{AppealState, SlashReason, SlashRecord, SlashingEngine, SlashingParameters};
pub use stake_ledger::{StakePosition, StakePositionLedger, StakeRequest};
pub use tier_catalog::{Tier, TierCatalog};
pub use types::{AccountId, CallContext, ProjectId, Timestamp, ONE_TOKEN, SECONDS_PER_DAY, SECONDS_PER_YEAR};
pub use validator_registry::{ValidatorParameters, ValidatorRecord, ValidatorRegistry};
pub use validator_rewards::{ValidatorRewardClaim, ValidatorRewardDistributor};
