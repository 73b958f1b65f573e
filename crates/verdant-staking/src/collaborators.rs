/// EXTERNAL COLLABORATORS
///
/// Abstract contracts the staking core depends on but does not implement: the token
/// medium, the project registry, the validator payout sink, the slashing registry and
/// the penalty sinks. Every call returns an explicit `Result`; callers decide whether a
/// failure aborts the operation or falls back.

use crate::slashing_engine::SlashReason;
use crate::types::ProjectId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Call rejected: {0}")]
    Rejected(String),
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Fungible value medium. `transfer` pays out of the staking vault, `transfer_from`
/// pulls into it.
#[cfg_attr(test, mockall::automock)]
pub trait ValueTransfer: Send {
    fn transfer(&mut self, to: &str, amount: u128) -> Result<(), CollaboratorError>;
    fn transfer_from(&mut self, from: &str, amount: u128) -> Result<(), CollaboratorError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait ProjectRegistry: Send {
    fn project_exists(&self, project: ProjectId) -> bool;
    fn increment_staker_count(&mut self, project: ProjectId) -> Result<(), CollaboratorError>;
    fn decrement_staker_count(&mut self, project: ProjectId) -> Result<(), CollaboratorError>;
    fn project_count(&self) -> u64;
}

/// Sink for validator pool rewards (forwards to the validator and its delegators).
#[cfg_attr(test, mockall::automock)]
pub trait RewardPayout: Send {
    fn distribute_reward(&mut self, account: &str, amount: u128) -> Result<(), CollaboratorError>;
}

/// Best-effort audit registry; failures never roll back a slash.
#[cfg_attr(test, mockall::automock)]
pub trait SlashingRegistry: Send {
    fn record_slashing_event(
        &mut self,
        validator: &str,
        amount: u128,
        reason: SlashReason,
    ) -> Result<(), CollaboratorError>;
}

/// External destinations for penalized and slashed funds. Redistribution to the
/// validator reward pool is internal and therefore not part of this trait.
#[cfg_attr(test, mockall::automock)]
pub trait PenaltySinks: Send {
    fn burn(&mut self, amount: u128) -> Result<(), CollaboratorError>;
    fn inject_liquidity(&mut self, amount: u128) -> Result<(), CollaboratorError>;
}

/// Bundle of collaborator handles owned by the engine.
pub struct Collaborators {
    pub token: Box<dyn ValueTransfer>,
    pub projects: Box<dyn ProjectRegistry>,
    pub payout: Box<dyn RewardPayout>,
    pub slashing_registry: Option<Box<dyn SlashingRegistry>>,
    pub sinks: Box<dyn PenaltySinks>,
}

impl Collaborators {
    pub fn new(
        token: Box<dyn ValueTransfer>,
        projects: Box<dyn ProjectRegistry>,
        payout: Box<dyn RewardPayout>,
        sinks: Box<dyn PenaltySinks>,
    ) -> Self {
        Collaborators {
            token,
            projects,
            payout,
            slashing_registry: None,
            sinks,
        }
    }

    pub fn with_slashing_registry(mut self, registry: Box<dyn SlashingRegistry>) -> Self {
        self.slashing_registry = Some(registry);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("slashing_registry", &self.slashing_registry.is_some())
            .finish_non_exhaustive()
    }
}
