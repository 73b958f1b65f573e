/// STAKING ENGINE
///
/// Transactional facade over every staking component. The engine owns all state and
/// the collaborator handles; each public mutating operation is atomic.
///
/// SAFETY:
/// - Every mutating operation runs against a snapshot of the full state and the
///   snapshot is restored on any error, so partial updates are never observable.
/// - Caller time must be monotonic; an earlier timestamp is rejected before any work.
/// - Every operation declares the capability it needs; the caller is checked against
///   it before any state is read or changed.
/// - Pending yield is settled before principal changes.
/// - Collaborator side effects are part of the host's transaction; rollback here
///   covers engine state only.

use crate::access_control::{AccessControl, Capability, Role};
use crate::collaborators::Collaborators;
use crate::config::StakingConfig;
use crate::error::StakingError;
use crate::governance_sync::GovernanceVoteSync;
use crate::penalty_distributor::{PenaltyBreakdown, PenaltyDistributor, PenaltyEvent};
use crate::reward_accrual::RewardAccrualEngine;
use crate::slashing_engine::{SlashReason, SlashRecord, SlashingEngine, SlashingParameters};
use crate::stake_ledger::{LedgerError, SlashAllocation, StakePosition, StakePositionLedger, StakeRequest};
use crate::tier_catalog::{Tier, TierCatalog};
use crate::types::{AccountId, CallContext, ProjectId, Timestamp};
use crate::validator_registry::{StatusChange, ValidatorError, ValidatorRecord, ValidatorRegistry};
use crate::validator_rewards::{RewardPoolError, ValidatorRewardClaim, ValidatorRewardDistributor};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Complete engine state. Cloned as the rollback snapshot of every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    catalog: TierCatalog,
    ledger: StakePositionLedger,
    rewards: RewardAccrualEngine,
    validators: ValidatorRegistry,
    reward_pool: ValidatorRewardDistributor,
    slashing: SlashingEngine,
    penalties: PenaltyDistributor,
    governance: GovernanceVoteSync,
    access: AccessControl,
    /// Latest timestamp accepted by a successful operation
    last_seen: Timestamp,
}

/// Outcome of a full or partial withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    /// Principal removed from the position
    pub principal: u128,
    /// Early-withdrawal penalty withheld from the principal
    pub penalty: u128,
    /// Settled yield paid with a full exit
    pub rewards: u128,
    /// Amount transferred back to the staker
    pub returned: u128,
    pub position_closed: bool,
    pub distribution: PenaltyBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashReceipt {
    pub record: SlashRecord,
    pub allocation: SlashAllocation,
    pub distribution: PenaltyBreakdown,
}

#[derive(Debug)]
pub struct StakingEngine {
    state: EngineState,
    collaborators: Collaborators,
}

impl StakingEngine {
    /// Initialize at genesis with `admin` as the sole administrator.
    pub fn genesis(
        config: StakingConfig,
        admin: &str,
        collaborators: Collaborators,
        genesis_time: Timestamp,
    ) -> Result<Self, StakingError> {
        config.validate()?;
        let catalog = config.tier_catalog()?;

        let state = EngineState {
            catalog,
            ledger: StakePositionLedger::new(config.min_stake_duration),
            rewards: RewardAccrualEngine::genesis(config.rewards, genesis_time),
            validators: ValidatorRegistry::new(config.validators),
            reward_pool: ValidatorRewardDistributor::new(),
            slashing: SlashingEngine::new(config.slashing),
            penalties: PenaltyDistributor::new(config.penalties),
            governance: GovernanceVoteSync::new(config.governance),
            access: AccessControl::genesis(admin),
            last_seen: genesis_time,
        };

        info!("Staking engine initialized at {} with admin {}", genesis_time, admin);
        Ok(StakingEngine {
            state,
            collaborators,
        })
    }

    /// Rebuild an engine from bytes produced by `export_state`.
    pub fn from_snapshot(bytes: &[u8], collaborators: Collaborators) -> Result<Self, StakingError> {
        let state: EngineState =
            bincode::deserialize(bytes).map_err(|e| StakingError::Serialization(e.to_string()))?;
        let engine = StakingEngine {
            state,
            collaborators,
        };
        engine.verify_invariants()?;
        Ok(engine)
    }

    pub fn export_state(&self) -> Result<Vec<u8>, StakingError> {
        bincode::serialize(&self.state).map_err(|e| StakingError::Serialization(e.to_string()))
    }

    /// SHA-256 commitment over the serialized state.
    pub fn state_hash(&self) -> Result<String, StakingError> {
        let encoded = self.export_state()?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }

    /// Authorize the caller for `required`, then run `op` atomically: on error the
    /// state snapshot is restored.
    fn transact<T, F>(
        &mut self,
        ctx: &CallContext,
        operation: &str,
        required: Capability<'_>,
        op: F,
    ) -> Result<T, StakingError>
    where
        F: FnOnce(&mut EngineState, &mut Collaborators) -> Result<T, StakingError>,
    {
        if ctx.now < self.state.last_seen {
            return Err(StakingError::NonMonotonicTime {
                now: ctx.now,
                last: self.state.last_seen,
            });
        }
        if let Err(e) = self.state.access.check(&ctx.caller, required) {
            warn!("{} by {} denied: {}", operation, ctx.caller, e);
            return Err(e.into());
        }

        let snapshot = self.state.clone();
        match op(&mut self.state, &mut self.collaborators) {
            Ok(value) => {
                self.state.last_seen = ctx.now;
                Ok(value)
            }
            Err(e) => {
                self.state = snapshot;
                warn!("{} by {} rolled back: {}", operation, ctx.caller, e);
                Err(e)
            }
        }
    }

    // ==================== STAKING ====================

    /// Stake into a project, opening a position or topping up an existing one.
    pub fn stake(&mut self, ctx: &CallContext, request: StakeRequest) -> Result<StakePosition, StakingError> {
        self.transact(ctx, "stake", Capability::Open, |state, ext| {
            state.stake(ext, ctx, &request)
        })
    }

    /// Close a position entirely, paying out principal (less any early-withdrawal
    /// penalty) and settled yield.
    pub fn unstake(&mut self, ctx: &CallContext, project: ProjectId) -> Result<WithdrawalReceipt, StakingError> {
        self.transact(ctx, "unstake", Capability::Open, |state, ext| {
            state.withdraw(ext, ctx, project, None)
        })
    }

    /// Withdraw part of a position's principal. Settled yield stays on the position.
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        project: ProjectId,
        amount: u128,
    ) -> Result<WithdrawalReceipt, StakingError> {
        self.transact(ctx, "withdraw", Capability::Open, |state, ext| {
            state.withdraw(ext, ctx, project, Some(amount))
        })
    }

    /// Pay out settled yield for one position.
    pub fn claim_rewards(&mut self, ctx: &CallContext, project: ProjectId) -> Result<u128, StakingError> {
        self.transact(ctx, "claim_rewards", Capability::Open, |state, ext| {
            state.claim_rewards(ext, ctx, project)
        })
    }

    // ==================== VALIDATORS ====================

    pub fn become_validator(&mut self, ctx: &CallContext) -> Result<(), StakingError> {
        self.transact(ctx, "become_validator", Capability::Open, |state, _| {
            state.become_validator(ctx)
        })
    }

    pub fn claim_validator_rewards(&mut self, ctx: &CallContext) -> Result<ValidatorRewardClaim, StakingError> {
        self.transact(ctx, "claim_validator_rewards", Capability::Open, |state, ext| {
            state.claim_validator_rewards(ext, ctx)
        })
    }

    pub fn update_validator_commission(&mut self, ctx: &CallContext, rate_bps: u32) -> Result<(), StakingError> {
        self.transact(ctx, "update_validator_commission", Capability::Open, |state, _| {
            state.validators.set_commission(&ctx.caller, rate_bps, ctx.now)?;
            info!("Validator {} commission set to {} bps", ctx.caller, rate_bps);
            Ok(())
        })
    }

    pub fn delegate(&mut self, ctx: &CallContext, validator: &str, amount: u128) -> Result<(), StakingError> {
        self.transact(ctx, "delegate", Capability::Open, |state, ext| {
            state.validators.delegate(&ctx.caller, validator, amount, ctx.now)?;
            ext.token.transfer_from(&ctx.caller, amount)?;
            info!("{} delegated {} to {}", ctx.caller, amount, validator);
            Ok(())
        })
    }

    pub fn undelegate(&mut self, ctx: &CallContext, validator: &str, amount: u128) -> Result<(), StakingError> {
        self.transact(ctx, "undelegate", Capability::Open, |state, ext| {
            state.validators.undelegate(&ctx.caller, validator, amount)?;
            ext.token.transfer(&ctx.caller, amount)?;
            info!("{} undelegated {} from {}", ctx.caller, amount, validator);
            Ok(())
        })
    }

    /// Pull tokens from the caller into the validator reward pool.
    pub fn fund_reward_pool(&mut self, ctx: &CallContext, amount: u128) -> Result<(), StakingError> {
        self.transact(ctx, "fund_reward_pool", Capability::Open, |state, ext| {
            if amount == 0 {
                return Err(StakingError::ZeroAmount);
            }
            ext.token.transfer_from(&ctx.caller, amount)?;
            state.reward_pool.credit(amount)?;
            info!("{} funded reward pool with {}", ctx.caller, amount);
            Ok(())
        })
    }

    // ==================== SLASHING ====================

    pub fn slash(
        &mut self,
        ctx: &CallContext,
        validator: &str,
        amount: u128,
        reason: SlashReason,
        evidence: &str,
    ) -> Result<SlashReceipt, StakingError> {
        self.transact(ctx, "slash", Capability::Role(Role::Slasher), |state, ext| {
            state.slash(ext, ctx, validator, amount, reason, evidence)
        })
    }

    /// Appeal a slash record. Only the slashed validator may appeal.
    pub fn file_appeal(&mut self, ctx: &CallContext, validator: &str, index: u64) -> Result<(), StakingError> {
        self.transact(ctx, "file_appeal", Capability::Account(validator), |state, _| {
            state.slashing.file_appeal(validator, index)?;
            Ok(())
        })
    }

    pub fn resolve_appeal(
        &mut self,
        ctx: &CallContext,
        validator: &str,
        index: u64,
        overturn: bool,
    ) -> Result<SlashRecord, StakingError> {
        self.transact(ctx, "resolve_appeal", Capability::Role(Role::Governance), |state, _| {
            state.resolve_appeal(ctx, validator, index, overturn)
        })
    }

    // ==================== GOVERNANCE & ADMINISTRATION ====================

    pub fn grant_role(&mut self, ctx: &CallContext, account: &str, role: Role) -> Result<bool, StakingError> {
        self.transact(ctx, "grant_role", Capability::Role(Role::Admin), |state, _| {
            Ok(state.access.grant(&ctx.caller, account, role)?)
        })
    }

    pub fn revoke_role(&mut self, ctx: &CallContext, account: &str, role: Role) -> Result<bool, StakingError> {
        self.transact(ctx, "revoke_role", Capability::Role(Role::Admin), |state, _| {
            Ok(state.access.revoke(&ctx.caller, account, role)?)
        })
    }

    /// Change the validator threshold and re-evaluate every participant.
    pub fn set_validator_threshold(&mut self, ctx: &CallContext, threshold: u128) -> Result<(), StakingError> {
        self.transact(ctx, "set_validator_threshold", Capability::Role(Role::Governance), |state, _| {
            state.validators.set_threshold(threshold)?;
            state.reevaluate_all(ctx.now);
            info!("Validator threshold set to {}", threshold);
            Ok(())
        })
    }

    /// Change the voting threshold and resync every participant's voting power.
    pub fn set_voting_threshold(&mut self, ctx: &CallContext, threshold: u128) -> Result<(), StakingError> {
        self.transact(ctx, "set_voting_threshold", Capability::Role(Role::Governance), |state, _| {
            state.governance.set_voting_threshold(threshold);
            state.reevaluate_all(ctx.now);
            Ok(())
        })
    }

    pub fn set_max_commission(&mut self, ctx: &CallContext, max_bps: u32) -> Result<(), StakingError> {
        self.transact(ctx, "set_max_commission", Capability::Role(Role::Admin), |state, _| {
            state.validators.set_max_commission(max_bps)?;
            Ok(())
        })
    }

    pub fn set_slash_parameters(&mut self, ctx: &CallContext, params: SlashingParameters) -> Result<(), StakingError> {
        self.transact(ctx, "set_slash_parameters", Capability::Role(Role::Admin), |state, _| {
            params.validate()?;
            info!("Slashing parameters updated: {:?}", params);
            state.slashing.params = params;
            Ok(())
        })
    }

    pub fn set_dynamic_rates(&mut self, ctx: &CallContext, base_bps: u32, boosted_bps: u32) -> Result<(), StakingError> {
        self.transact(ctx, "set_dynamic_rates", Capability::Role(Role::Governance), |state, _| {
            state.rewards.set_dynamic_rates(base_bps, boosted_bps)?;
            info!("Dynamic rates set: base {} bps, boosted {} bps", base_bps, boosted_bps);
            Ok(())
        })
    }

    pub fn set_governance_violator(&mut self, ctx: &CallContext, account: &str, flagged: bool) -> Result<(), StakingError> {
        self.transact(ctx, "set_governance_violator", Capability::Role(Role::Governance), |state, _| {
            state.governance.set_violator(account, flagged);
            state.refresh_account(account, ctx.now);
            Ok(())
        })
    }

    pub fn set_nft_boost(
        &mut self,
        ctx: &CallContext,
        account: &str,
        project: ProjectId,
        enabled: bool,
    ) -> Result<(), StakingError> {
        self.transact(ctx, "set_nft_boost", Capability::Role(Role::Admin), |state, _| {
            // Yield so far accrues at the old rate
            state.settle(account, project, ctx.now)?;
            state.ledger.set_nft_boost(account, project, enabled)?;
            state.refresh_account(account, ctx.now);
            Ok(())
        })
    }

    // ==================== READ ACCESSORS ====================

    pub fn position(&self, account: &str, project: ProjectId) -> Option<&StakePosition> {
        self.state.ledger.position(account, project)
    }

    pub fn positions_of(&self, account: &str) -> Vec<(ProjectId, StakePosition)> {
        self.state
            .ledger
            .positions_of(account)
            .map(|(project, position)| (project, position.clone()))
            .collect()
    }

    pub fn balance_of(&self, account: &str) -> u128 {
        self.state.ledger.balance_of(account)
    }

    pub fn total_staked(&self) -> u128 {
        self.state.ledger.total_staked()
    }

    pub fn project_staker_count(&self, project: ProjectId) -> u64 {
        self.state.ledger.project_staker_count(project)
    }

    pub fn is_participant(&self, account: &str) -> bool {
        self.state.ledger.is_participant(account)
    }

    pub fn participant_count(&self) -> usize {
        self.state.ledger.participants().len()
    }

    /// Settled plus pending yield for a position at `now`, without settling.
    pub fn pending_rewards(&self, account: &str, project: ProjectId, now: Timestamp) -> Result<u128, StakingError> {
        let position = self
            .state
            .ledger
            .position(account, project)
            .ok_or(LedgerError::PositionNotFound(project))?;
        let pending = self.state.rewards.pending_reward(
            position,
            now,
            self.state.ledger.total_staked(),
            &self.state.catalog,
        );
        Ok(position.accrued_rewards.saturating_add(pending))
    }

    pub fn tiers(&self) -> &[Tier] {
        self.state.catalog.tiers()
    }

    pub fn tier_for(&self, duration: Timestamp) -> Option<&Tier> {
        self.state.catalog.tier_for(duration)
    }

    pub fn rewards(&self) -> &RewardAccrualEngine {
        &self.state.rewards
    }

    pub fn validator(&self, account: &str) -> Option<&ValidatorRecord> {
        self.state.validators.record(account)
    }

    pub fn is_validator(&self, account: &str) -> bool {
        self.state.validators.is_validator(account)
    }

    pub fn validator_count(&self) -> usize {
        self.state.validators.validator_count()
    }

    pub fn validators(&self) -> Vec<AccountId> {
        self.state.validators.validators().members().to_vec()
    }

    pub fn validator_threshold(&self) -> u128 {
        self.state.validators.params.validator_threshold
    }

    pub fn delegation(&self, delegator: &str, validator: &str) -> u128 {
        self.state.validators.delegation(delegator, validator)
    }

    pub fn reward_pool(&self) -> u128 {
        self.state.reward_pool.pool()
    }

    pub fn slash_history(&self, validator: &str) -> &[SlashRecord] {
        self.state.slashing.slash_history(validator)
    }

    pub fn last_slash_time(&self, validator: &str) -> Option<Timestamp> {
        self.state.slashing.last_slash_time(validator)
    }

    pub fn total_slashed(&self) -> u128 {
        self.state.slashing.total_slashed()
    }

    pub fn penalty_history(&self, account: &str) -> &[PenaltyEvent] {
        self.state.penalties.penalty_history(account)
    }

    pub fn voting_power(&self, account: &str) -> u128 {
        self.state.governance.voting_power(account)
    }

    pub fn total_voting_power(&self) -> u128 {
        self.state.governance.total_voting_power()
    }

    pub fn is_governance_violator(&self, account: &str) -> bool {
        self.state.governance.is_violator(account)
    }

    pub fn has_role(&self, account: &str, role: Role) -> bool {
        self.state.access.has_role(account, role)
    }

    pub fn last_seen(&self) -> Timestamp {
        self.state.last_seen
    }

    /// Check every cross-component invariant.
    pub fn verify_invariants(&self) -> Result<(), StakingError> {
        let state = &self.state;
        state.ledger.verify()?;
        state.validators.verify(
            |account| state.ledger.balance_of(account),
            |account| state.governance.is_violator(account),
        )?;

        for account in state.ledger.participants().iter() {
            let balance = state.ledger.balance_of(account);
            let violator = state.governance.is_violator(account);
            if state.validators.is_eligible(balance, violator) != state.validators.is_validator(account) {
                return Err(StakingError::InvariantViolation(format!(
                    "validator status of {} does not match its stake",
                    account
                )));
            }

            let expected_power = state.governance.compute_power(
                account,
                state.ledger.positions_of(account).map(|(_, p)| p),
                &state.catalog,
                balance,
            );
            if expected_power != state.governance.voting_power(account) {
                return Err(StakingError::InvariantViolation(format!(
                    "voting power of {} is stale",
                    account
                )));
            }
        }

        state.governance.verify()?;
        state.slashing.verify_records()?;
        Ok(())
    }
}

impl EngineState {
    /// Settle pending yield of one position into it, then advance the rate schedule.
    fn settle(&mut self, account: &str, project: ProjectId, now: Timestamp) -> Result<u128, StakingError> {
        let position = self
            .ledger
            .position(account, project)
            .ok_or(LedgerError::PositionNotFound(project))?;
        let pending = self
            .rewards
            .pending_reward(position, now, self.ledger.total_staked(), &self.catalog);
        let auto_compounding = position.auto_compounding;

        if auto_compounding {
            let (compounded, payable) = self.rewards.split_compound(pending);
            self.ledger.compound(account, project, compounded)?;
            self.ledger.settle_into(account, project, payable, now)?;
        } else {
            self.ledger.settle_into(account, project, pending, now)?;
        }

        let schedule = self.rewards.run_schedule(self.ledger.total_staked(), now);
        if schedule.halved {
            info!(
                "Settlement of {} on project {} started halving epoch {}",
                account,
                project,
                self.rewards.halving_epoch()
            );
        }
        if pending > 0 {
            debug!("Settled {} for {} on project {}", pending, account, project);
        }
        Ok(pending)
    }

    fn settle_account(&mut self, account: &str, now: Timestamp) -> Result<(), StakingError> {
        let projects: Vec<ProjectId> = self.ledger.positions_of(account).map(|(p, _)| p).collect();
        for project in projects {
            self.settle(account, project, now)?;
        }
        Ok(())
    }

    /// Re-derive validator status and voting power from the ledger.
    fn refresh_account(&mut self, account: &str, now: Timestamp) -> StatusChange {
        let balance = self.ledger.balance_of(account);
        let violator = self.governance.is_violator(account);
        let change = self.validators.evaluate(account, balance, violator, now);
        self.governance.sync(
            account,
            self.ledger.positions_of(account).map(|(_, p)| p),
            &self.catalog,
            balance,
        );
        change
    }

    fn reevaluate_all(&mut self, now: Timestamp) {
        let mut accounts: Vec<AccountId> = self.ledger.participants().members().to_vec();
        accounts.extend(
            self.validators
                .validators()
                .iter()
                .filter(|v| !self.ledger.is_participant(v))
                .cloned(),
        );
        for account in accounts {
            self.refresh_account(&account, now);
        }
    }

    /// Route penalized or slashed funds; the redistributed part goes to the reward pool.
    fn route_funds(&mut self, ext: &mut Collaborators, amount: u128) -> Result<PenaltyBreakdown, StakingError> {
        let redistribution_open = self.validators.validator_count() > 0;
        let breakdown = self
            .penalties
            .route(amount, &mut *ext.sinks, redistribution_open)?;
        if breakdown.redistributed > 0 {
            self.reward_pool.credit(breakdown.redistributed)?;
        }
        Ok(breakdown)
    }

    fn stake(
        &mut self,
        ext: &mut Collaborators,
        ctx: &CallContext,
        request: &StakeRequest,
    ) -> Result<StakePosition, StakingError> {
        let account = ctx.caller.as_str();
        self.ledger.validate_request(request)?;
        if !ext.projects.project_exists(request.project) {
            return Err(StakingError::ProjectNotFound(request.project));
        }

        if self.ledger.position(account, request.project).is_some() {
            self.settle(account, request.project, ctx.now)?;
        }

        ext.token.transfer_from(account, request.amount)?;
        let created = self
            .ledger
            .open_or_increase_position(account, request, ctx.now)?;
        if created {
            ext.projects.increment_staker_count(request.project)?;
        }
        self.refresh_account(account, ctx.now);

        let position = self
            .ledger
            .position(account, request.project)
            .cloned()
            .ok_or(LedgerError::PositionNotFound(request.project))?;
        info!(
            "{} staked {} in project {} for {}s (position now {})",
            account, request.amount, request.project, position.duration, position.amount
        );
        Ok(position)
    }

    fn withdraw(
        &mut self,
        ext: &mut Collaborators,
        ctx: &CallContext,
        project: ProjectId,
        amount: Option<u128>,
    ) -> Result<WithdrawalReceipt, StakingError> {
        let account = ctx.caller.as_str();
        self.settle(account, project, ctx.now)?;

        let position = self
            .ledger
            .position(account, project)
            .cloned()
            .ok_or(LedgerError::PositionNotFound(project))?;
        let principal = amount.unwrap_or(position.amount);
        if principal == 0 {
            return Err(LedgerError::ZeroAmount.into());
        }
        if principal > position.amount {
            return Err(LedgerError::InsufficientStake {
                requested: principal,
                available: position.amount,
            }
            .into());
        }

        let penalty = self.penalties.penalty_for(&position, principal, ctx.now);
        let full_exit = principal == position.amount;
        let rewards = if full_exit {
            self.ledger.take_accrued_rewards(account, project)?
        } else {
            0
        };

        let outcome = self.ledger.decrease_position(account, project, principal)?;
        if outcome.position_closed {
            ext.projects.decrement_staker_count(project)?;
        }
        self.refresh_account(account, ctx.now);

        let distribution = if penalty > 0 {
            let breakdown = self.route_funds(ext, penalty)?;
            self.penalties.record_penalty(account, project, ctx.now, &breakdown);
            breakdown
        } else {
            PenaltyBreakdown::default()
        };

        let returned = principal - penalty + rewards;
        if returned > 0 {
            ext.token.transfer(account, returned)?;
        }

        info!(
            "{} withdrew {} from project {} (penalty {}, rewards {})",
            account, principal, project, penalty, rewards
        );
        Ok(WithdrawalReceipt {
            principal,
            penalty,
            rewards,
            returned,
            position_closed: outcome.position_closed,
            distribution,
        })
    }

    fn claim_rewards(
        &mut self,
        ext: &mut Collaborators,
        ctx: &CallContext,
        project: ProjectId,
    ) -> Result<u128, StakingError> {
        let account = ctx.caller.as_str();
        let settled = self.settle(account, project, ctx.now)?;
        let amount = self.ledger.take_accrued_rewards(account, project)?;
        if amount == 0 && settled == 0 {
            return Err(StakingError::NothingToClaim);
        }
        // A fully compounding position re-stakes everything and pays nothing out
        if amount > 0 {
            ext.token.transfer(account, amount)?;
        }
        // Compounding during settlement may have moved the balance
        self.refresh_account(account, ctx.now);
        info!("{} claimed {} from project {}", account, amount, project);
        Ok(amount)
    }

    fn become_validator(&mut self, ctx: &CallContext) -> Result<(), StakingError> {
        let account = ctx.caller.as_str();
        let balance = self.ledger.balance_of(account);
        let violator = self.governance.is_violator(account);
        match self.validators.evaluate(account, balance, violator, ctx.now) {
            StatusChange::Promoted => Ok(()),
            _ => {
                self.validators.check_candidate(account, balance, violator)?;
                Ok(())
            }
        }
    }

    fn claim_validator_rewards(
        &mut self,
        ext: &mut Collaborators,
        ctx: &CallContext,
    ) -> Result<ValidatorRewardClaim, StakingError> {
        let account = ctx.caller.as_str();
        if !self.validators.is_validator(account) {
            return Err(ValidatorError::NotValidator(account.to_string()).into());
        }

        let ledger = &self.ledger;
        let weight = self.validators.validator_weight(account, ledger.balance_of(account));
        let total_weight = self.validators.total_validator_stake(|v| ledger.balance_of(v));
        let count = self.validators.validator_count();
        let (commission_bps, has_delegations) = self
            .validators
            .record(account)
            .map(|r| (r.commission_rate_bps, r.total_delegated > 0))
            .unwrap_or((0, false));

        let claim = self
            .reward_pool
            .claim(weight, total_weight, count, commission_bps, has_delegations)?;

        if claim.commission > 0 {
            ext.token
                .transfer(account, claim.commission)
                .map_err(|e| RewardPoolError::DistributionFailed(e.to_string()))?;
        }
        if claim.payout > 0 {
            ext.payout
                .distribute_reward(account, claim.payout)
                .map_err(|e| RewardPoolError::DistributionFailed(e.to_string()))?;
        }
        self.validators
            .note_claim(account, claim.payout, claim.commission, ctx.now);
        Ok(claim)
    }

    fn slash(
        &mut self,
        ext: &mut Collaborators,
        ctx: &CallContext,
        validator: &str,
        requested: u128,
        reason: SlashReason,
        evidence: &str,
    ) -> Result<SlashReceipt, StakingError> {
        self.settle_account(validator, ctx.now)?;
        self.refresh_account(validator, ctx.now);

        let amount = self.slashing.prepare(
            validator,
            requested,
            reason,
            self.validators.is_validator(validator),
            self.ledger.balance_of(validator),
            ctx.now,
        )?;

        let allocation = self.ledger.slash_account(validator, amount)?;
        for project in &allocation.closed_projects {
            ext.projects.decrement_staker_count(*project)?;
        }
        if reason == SlashReason::GovernanceViolation {
            self.governance.set_violator(validator, true);
        }
        self.refresh_account(validator, ctx.now);

        let distribution = self.route_funds(ext, amount)?;
        let record = self
            .slashing
            .record(validator, &ctx.caller, amount, reason, evidence, ctx.now);

        if let Some(registry) = ext.slashing_registry.as_mut() {
            if let Err(e) = registry.record_slashing_event(validator, amount, reason) {
                warn!("Slashing registry did not record slash of {}: {}", validator, e);
            }
        }

        Ok(SlashReceipt {
            record,
            allocation,
            distribution,
        })
    }

    fn resolve_appeal(
        &mut self,
        ctx: &CallContext,
        validator: &str,
        index: u64,
        overturn: bool,
    ) -> Result<SlashRecord, StakingError> {
        let record = self.slashing.resolve_appeal(validator, index, overturn)?;

        if overturn
            && record.reason == SlashReason::GovernanceViolation
            && !self.slashing.has_standing_governance_violation(validator)
        {
            self.governance.set_violator(validator, false);
            self.refresh_account(validator, ctx.now);
        }
        Ok(record)
    }
}
