/// STAKE POSITION LEDGER
///
/// Source of truth for how much is staked. Positions are keyed by (account, project);
/// per-account balances and the global total are maintained alongside them and the
/// active participant index mirrors which accounts hold a non-zero balance.
///
/// Invariants:
/// - sum of position amounts == total_staked
/// - balance(account) == sum of that account's position amounts
/// - balance(account) > 0 <=> account is an active participant

use crate::participant_index::ActiveParticipantIndex;
use crate::types::{mul_div, AccountId, ProjectId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A single account's commitment to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    /// Principal currently staked
    pub amount: u128,
    /// Start of the current lock (reset on top-up)
    pub staking_start: Timestamp,
    /// Time up to which yield has been settled
    pub last_checkpoint: Timestamp,
    /// Committed lock length in seconds; selects the tier
    pub duration: Timestamp,
    pub is_lp_staker: bool,
    pub has_nft_boost: bool,
    pub auto_compounding: bool,
    /// Settled yield not yet paid out
    pub accrued_rewards: u128,
}

impl StakePosition {
    pub fn unlock_time(&self) -> Timestamp {
        self.staking_start.saturating_add(self.duration)
    }

    pub fn is_locked(&self, now: Timestamp) -> bool {
        now < self.unlock_time()
    }

    /// Seconds left until the lock expires (zero once unlocked).
    pub fn time_until_unlock(&self, now: Timestamp) -> Timestamp {
        self.unlock_time().saturating_sub(now)
    }
}

/// Parameters of a stake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeRequest {
    pub project: ProjectId,
    pub amount: u128,
    pub duration: Timestamp,
    pub is_lp: bool,
    pub auto_compound: bool,
}

/// What a debit did to the ledger's membership structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebitOutcome {
    /// Position amount reached zero and the record was removed
    pub position_closed: bool,
    /// Account holds no position any more
    pub account_closed: bool,
}

/// Per-project deductions made by a slash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlashAllocation {
    pub deductions: Vec<(ProjectId, u128)>,
    pub closed_projects: Vec<ProjectId>,
}

impl SlashAllocation {
    pub fn total(&self) -> u128 {
        self.deductions.iter().map(|(_, amount)| amount).sum()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakePositionLedger {
    positions: BTreeMap<(AccountId, ProjectId), StakePosition>,
    balances: BTreeMap<AccountId, u128>,
    project_stakers: BTreeMap<ProjectId, u64>,
    participants: ActiveParticipantIndex,
    total_staked: u128,
    /// Minimum commitment accepted for any position
    min_stake_duration: Timestamp,
}

impl StakePositionLedger {
    pub fn new(min_stake_duration: Timestamp) -> Self {
        StakePositionLedger {
            min_stake_duration,
            ..Default::default()
        }
    }

    /// Validate a stake request against ledger-level rules.
    pub fn validate_request(&self, request: &StakeRequest) -> Result<(), LedgerError> {
        if request.amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if request.duration < self.min_stake_duration {
            return Err(LedgerError::DurationTooShort {
                duration: request.duration,
                minimum: self.min_stake_duration,
            });
        }
        Ok(())
    }

    /// Open a new position or top up an existing one. Pending yield must already be
    /// settled by the caller. Returns true when a new position was created.
    ///
    /// A top-up keeps the longer of the two durations and restarts the lock at `now`.
    pub fn open_or_increase_position(
        &mut self,
        account: &str,
        request: &StakeRequest,
        now: Timestamp,
    ) -> Result<bool, LedgerError> {
        self.validate_request(request)?;

        let new_total = self
            .total_staked
            .checked_add(request.amount)
            .ok_or(LedgerError::Overflow)?;

        let key = (account.to_string(), request.project);
        let created = match self.positions.get_mut(&key) {
            Some(position) => {
                position.amount = position
                    .amount
                    .checked_add(request.amount)
                    .ok_or(LedgerError::Overflow)?;
                position.duration = position.duration.max(request.duration);
                position.staking_start = now;
                position.last_checkpoint = now;
                position.is_lp_staker |= request.is_lp;
                position.auto_compounding = request.auto_compound;
                false
            }
            None => {
                self.positions.insert(
                    key,
                    StakePosition {
                        amount: request.amount,
                        staking_start: now,
                        last_checkpoint: now,
                        duration: request.duration,
                        is_lp_staker: request.is_lp,
                        has_nft_boost: false,
                        auto_compounding: request.auto_compound,
                        accrued_rewards: 0,
                    },
                );
                *self.project_stakers.entry(request.project).or_insert(0) += 1;
                true
            }
        };

        *self.balances.entry(account.to_string()).or_insert(0) += request.amount;
        self.total_staked = new_total;
        self.participants.insert(account);

        Ok(created)
    }

    /// Remove `amount` of principal from a position.
    pub fn decrease_position(
        &mut self,
        account: &str,
        project: ProjectId,
        amount: u128,
    ) -> Result<DebitOutcome, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let position = self
            .positions
            .get(&(account.to_string(), project))
            .ok_or(LedgerError::PositionNotFound(project))?;
        if amount > position.amount {
            return Err(LedgerError::InsufficientStake {
                requested: amount,
                available: position.amount,
            });
        }

        Ok(self.debit(account, project, amount))
    }

    /// Add compounded yield to principal without restarting the lock.
    pub fn compound(
        &mut self,
        account: &str,
        project: ProjectId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let new_total = self
            .total_staked
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let position = self
            .positions
            .get_mut(&(account.to_string(), project))
            .ok_or(LedgerError::PositionNotFound(project))?;

        position.amount = position.amount.checked_add(amount).ok_or(LedgerError::Overflow)?;
        *self.balances.entry(account.to_string()).or_insert(0) += amount;
        self.total_staked = new_total;
        Ok(())
    }

    /// Record settled yield and advance the position checkpoint.
    pub fn settle_into(
        &mut self,
        account: &str,
        project: ProjectId,
        payable: u128,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        let position = self
            .positions
            .get_mut(&(account.to_string(), project))
            .ok_or(LedgerError::PositionNotFound(project))?;

        position.accrued_rewards = position
            .accrued_rewards
            .checked_add(payable)
            .ok_or(LedgerError::Overflow)?;
        position.last_checkpoint = now.max(position.last_checkpoint);
        Ok(())
    }

    /// Take all settled-but-unpaid yield out of a position.
    pub fn take_accrued_rewards(
        &mut self,
        account: &str,
        project: ProjectId,
    ) -> Result<u128, LedgerError> {
        let position = self
            .positions
            .get_mut(&(account.to_string(), project))
            .ok_or(LedgerError::PositionNotFound(project))?;
        Ok(std::mem::take(&mut position.accrued_rewards))
    }

    pub fn set_nft_boost(
        &mut self,
        account: &str,
        project: ProjectId,
        enabled: bool,
    ) -> Result<(), LedgerError> {
        let position = self
            .positions
            .get_mut(&(account.to_string(), project))
            .ok_or(LedgerError::PositionNotFound(project))?;
        position.has_nft_boost = enabled;
        Ok(())
    }

    /// Reduce an account's stake by `amount`, spread over its positions pro rata to
    /// their size. Rounding dust is taken from the largest positions first.
    pub fn slash_account(
        &mut self,
        account: &str,
        amount: u128,
    ) -> Result<SlashAllocation, LedgerError> {
        let balance = self.balance_of(account);
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if amount > balance {
            return Err(LedgerError::InsufficientStake {
                requested: amount,
                available: balance,
            });
        }

        let mut holdings: Vec<(ProjectId, u128)> = self
            .positions_of(account)
            .map(|(project, position)| (project, position.amount))
            .collect();

        let mut deductions: BTreeMap<ProjectId, u128> = BTreeMap::new();
        let mut assigned = 0u128;
        for (project, held) in &holdings {
            let share = mul_div(amount, *held, balance);
            if share > 0 {
                deductions.insert(*project, share);
                assigned += share;
            }
        }

        // Largest positions absorb the remainder, one unit at a time at most each pass
        holdings.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let mut remainder = amount - assigned;
        while remainder > 0 {
            let mut progressed = false;
            for (project, held) in &holdings {
                if remainder == 0 {
                    break;
                }
                let taken = deductions.entry(*project).or_insert(0);
                let room = held - *taken;
                if room > 0 {
                    let extra = room.min(remainder);
                    *taken += extra;
                    remainder -= extra;
                    progressed = true;
                }
            }
            if !progressed {
                return Err(LedgerError::InvariantViolation(
                    "slash remainder exceeds account balance".to_string(),
                ));
            }
        }

        let mut allocation = SlashAllocation::default();
        for (project, deducted) in deductions {
            if deducted == 0 {
                continue;
            }
            let outcome = self.debit(account, project, deducted);
            allocation.deductions.push((project, deducted));
            if outcome.position_closed {
                allocation.closed_projects.push(project);
            }
        }

        Ok(allocation)
    }

    fn debit(&mut self, account: &str, project: ProjectId, amount: u128) -> DebitOutcome {
        let key = (account.to_string(), project);
        let mut outcome = DebitOutcome::default();

        if let Some(position) = self.positions.get_mut(&key) {
            position.amount -= amount;
            if position.amount == 0 {
                outcome.position_closed = true;
            }
        }

        if outcome.position_closed {
            self.positions.remove(&key);
            if let Some(count) = self.project_stakers.get_mut(&project) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.project_stakers.remove(&project);
                }
            }
        }

        if let Some(balance) = self.balances.get_mut(account) {
            *balance -= amount;
            if *balance == 0 {
                self.balances.remove(account);
            }
        }
        self.total_staked -= amount;

        let holds_other_positions = self.positions_of(account).next().is_some();
        if !holds_other_positions {
            self.balances.remove(account);
            self.participants.remove(account);
            outcome.account_closed = true;
        }

        outcome
    }

    pub fn position(&self, account: &str, project: ProjectId) -> Option<&StakePosition> {
        self.positions.get(&(account.to_string(), project))
    }

    /// All positions held by `account`, ordered by project.
    pub fn positions_of<'a>(
        &'a self,
        account: &'a str,
    ) -> impl Iterator<Item = (ProjectId, &'a StakePosition)> + 'a {
        let start = (account.to_string(), ProjectId::MIN);
        self.positions
            .range(start..)
            .take_while(move |((owner, _), _)| owner == account)
            .map(|((_, project), position)| (*project, position))
    }

    pub fn balance_of(&self, account: &str) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_staked(&self) -> u128 {
        self.total_staked
    }

    pub fn project_staker_count(&self, project: ProjectId) -> u64 {
        self.project_stakers.get(&project).copied().unwrap_or(0)
    }

    pub fn participants(&self) -> &ActiveParticipantIndex {
        &self.participants
    }

    pub fn is_participant(&self, account: &str) -> bool {
        self.participants.contains(account)
    }

    pub fn min_stake_duration(&self) -> Timestamp {
        self.min_stake_duration
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Check the conservation and membership invariants.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let mut per_account: BTreeMap<&str, u128> = BTreeMap::new();
        let mut sum = 0u128;
        for ((account, _), position) in &self.positions {
            if position.amount == 0 {
                return Err(LedgerError::InvariantViolation(format!(
                    "empty position retained for {}",
                    account
                )));
            }
            sum = sum.checked_add(position.amount).ok_or(LedgerError::Overflow)?;
            *per_account.entry(account.as_str()).or_insert(0) += position.amount;
        }

        if sum != self.total_staked {
            return Err(LedgerError::InvariantViolation(format!(
                "sum of positions {} != total_staked {}",
                sum, self.total_staked
            )));
        }

        if per_account.len() != self.balances.len() || per_account.len() != self.participants.len() {
            return Err(LedgerError::InvariantViolation(
                "balance and participant sets disagree with positions".to_string(),
            ));
        }

        for (account, expected) in per_account {
            if self.balance_of(account) != expected {
                return Err(LedgerError::InvariantViolation(format!(
                    "balance of {} is {} but positions sum to {}",
                    account,
                    self.balance_of(account),
                    expected
                )));
            }
            if !self.participants.contains(account) {
                return Err(LedgerError::InvariantViolation(format!(
                    "{} holds stake but is not an active participant",
                    account
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Duration {duration}s is below the minimum of {minimum}s")]
    DurationTooShort { duration: Timestamp, minimum: Timestamp },
    #[error("No position in project {0}")]
    PositionNotFound(ProjectId),
    #[error("Insufficient stake: requested {requested}, available {available}")]
    InsufficientStake { requested: u128, available: u128 },
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ONE_TOKEN, SECONDS_PER_DAY};

    const MIN: Timestamp = 7 * SECONDS_PER_DAY;

    fn request(project: ProjectId, amount: u128) -> StakeRequest {
        StakeRequest {
            project,
            amount,
            duration: 30 * SECONDS_PER_DAY,
            is_lp: false,
            auto_compound: false,
        }
    }

    #[test]
    fn test_open_position() {
        let mut ledger = StakePositionLedger::new(MIN);
        let created = ledger.open_or_increase_position("alice", &request(1, 500), 100).unwrap();

        assert!(created);
        assert_eq!(ledger.total_staked(), 500);
        assert_eq!(ledger.balance_of("alice"), 500);
        assert!(ledger.is_participant("alice"));
        assert_eq!(ledger.project_staker_count(1), 1);
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_top_up_keeps_longer_duration_and_restarts_lock() {
        let mut ledger = StakePositionLedger::new(MIN);
        let mut long = request(1, 500);
        long.duration = 180 * SECONDS_PER_DAY;
        ledger.open_or_increase_position("alice", &long, 100).unwrap();

        let created = ledger.open_or_increase_position("alice", &request(1, 250), 900).unwrap();
        assert!(!created);

        let position = ledger.position("alice", 1).unwrap();
        assert_eq!(position.amount, 750);
        assert_eq!(position.duration, 180 * SECONDS_PER_DAY);
        assert_eq!(position.staking_start, 900);
        assert_eq!(ledger.project_staker_count(1), 1);
    }

    #[test]
    fn test_rejects_zero_and_short_duration() {
        let mut ledger = StakePositionLedger::new(MIN);
        assert_eq!(
            ledger.open_or_increase_position("alice", &request(1, 0), 0),
            Err(LedgerError::ZeroAmount)
        );

        let mut short = request(1, 10);
        short.duration = MIN - 1;
        assert!(matches!(
            ledger.open_or_increase_position("alice", &short, 0),
            Err(LedgerError::DurationTooShort { .. })
        ));
        assert_eq!(ledger.total_staked(), 0);
    }

    #[test]
    fn test_full_withdrawal_clears_membership() {
        let mut ledger = StakePositionLedger::new(MIN);
        ledger.open_or_increase_position("alice", &request(1, 500), 0).unwrap();
        ledger.open_or_increase_position("alice", &request(2, 100), 0).unwrap();

        let outcome = ledger.decrease_position("alice", 1, 500).unwrap();
        assert!(outcome.position_closed);
        assert!(!outcome.account_closed);
        assert!(ledger.is_participant("alice"));

        let outcome = ledger.decrease_position("alice", 2, 100).unwrap();
        assert!(outcome.account_closed);
        assert!(!ledger.is_participant("alice"));
        assert_eq!(ledger.total_staked(), 0);
        assert_eq!(ledger.project_staker_count(1), 0);
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_decrease_more_than_staked() {
        let mut ledger = StakePositionLedger::new(MIN);
        ledger.open_or_increase_position("alice", &request(1, 500), 0).unwrap();
        assert!(matches!(
            ledger.decrease_position("alice", 1, 501),
            Err(LedgerError::InsufficientStake { .. })
        ));
    }

    #[test]
    fn test_slash_is_pro_rata_and_conserves_total() {
        let mut ledger = StakePositionLedger::new(MIN);
        ledger.open_or_increase_position("val", &request(1, 700), 0).unwrap();
        ledger.open_or_increase_position("val", &request(2, 300), 0).unwrap();
        ledger.open_or_increase_position("bob", &request(1, 50), 0).unwrap();

        let allocation = ledger.slash_account("val", 101).unwrap();
        assert_eq!(allocation.total(), 101);
        assert_eq!(ledger.balance_of("val"), 899);
        assert_eq!(ledger.total_staked(), 949);
        // 70.7 -> 70 from project 1, 30.3 -> 30 from project 2, dust from the largest
        assert_eq!(ledger.position("val", 1).unwrap().amount, 629);
        assert_eq!(ledger.position("val", 2).unwrap().amount, 270);
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_slash_is_pro_rata_at_token_scale() {
        let mut ledger = StakePositionLedger::new(MIN);
        ledger.open_or_increase_position("val", &request(1, 150_000 * ONE_TOKEN), 0).unwrap();
        ledger.open_or_increase_position("val", &request(2, 50_000 * ONE_TOKEN), 0).unwrap();

        let allocation = ledger.slash_account("val", 100_000 * ONE_TOKEN).unwrap();
        assert_eq!(
            allocation.deductions,
            vec![(1, 75_000 * ONE_TOKEN), (2, 25_000 * ONE_TOKEN)]
        );
        assert_eq!(ledger.balance_of("val"), 100_000 * ONE_TOKEN);
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_slash_entire_balance_closes_positions() {
        let mut ledger = StakePositionLedger::new(MIN);
        ledger.open_or_increase_position("val", &request(1, 3), 0).unwrap();
        ledger.open_or_increase_position("val", &request(2, 1), 0).unwrap();

        let allocation = ledger.slash_account("val", 4).unwrap();
        assert_eq!(allocation.closed_projects, vec![1, 2]);
        assert!(!ledger.is_participant("val"));
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_compound_and_accrued_rewards() {
        let mut ledger = StakePositionLedger::new(MIN);
        ledger.open_or_increase_position("alice", &request(1, 1000), 0).unwrap();

        ledger.compound("alice", 1, 40).unwrap();
        ledger.settle_into("alice", 1, 10, 500).unwrap();

        assert_eq!(ledger.total_staked(), 1040);
        assert_eq!(ledger.position("alice", 1).unwrap().last_checkpoint, 500);
        assert_eq!(ledger.take_accrued_rewards("alice", 1).unwrap(), 10);
        assert_eq!(ledger.take_accrued_rewards("alice", 1).unwrap(), 0);
        assert!(ledger.verify().is_ok());
    }

    #[test]
    fn test_positions_of_is_scoped_to_account() {
        let mut ledger = StakePositionLedger::new(MIN);
        ledger.open_or_increase_position("alice", &request(3, 1), 0).unwrap();
        ledger.open_or_increase_position("alice", &request(1, 1), 0).unwrap();
        ledger.open_or_increase_position("alicia", &request(2, 1), 0).unwrap();

        let projects: Vec<ProjectId> = ledger.positions_of("alice").map(|(p, _)| p).collect();
        assert_eq!(projects, vec![1, 3]);
    }
}
