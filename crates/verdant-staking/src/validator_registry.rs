/// VALIDATOR REGISTRY
///
/// Validator status follows stake automatically: an account is a validator exactly
/// when its balance reaches the validator threshold and it is not flagged as a
/// governance violator. The registry keeps commission settings, delegation totals and
/// lifetime reward counters; records survive demotion so delegations are not lost.

use crate::participant_index::ActiveParticipantIndex;
use crate::types::{AccountId, Timestamp, BPS_DENOMINATOR, ONE_TOKEN};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorParameters {
    /// Minimum balance for validator status
    pub validator_threshold: u128,
    /// Upper bound for any validator's commission
    pub max_commission_bps: u32,
    /// Commission assigned on first promotion
    pub default_commission_bps: u32,
}

impl Default for ValidatorParameters {
    fn default() -> Self {
        ValidatorParameters {
            validator_threshold: 100_000 * ONE_TOKEN,
            max_commission_bps: 2_000, // 20%
            default_commission_bps: 500,
        }
    }
}

impl ValidatorParameters {
    pub fn validate(&self) -> Result<(), ValidatorError> {
        if self.max_commission_bps as u128 > BPS_DENOMINATOR {
            return Err(ValidatorError::InvalidParameters(
                "max_commission_bps exceeds 10000".to_string(),
            ));
        }
        if self.default_commission_bps > self.max_commission_bps {
            return Err(ValidatorError::InvalidParameters(
                "default commission above maximum".to_string(),
            ));
        }
        if self.validator_threshold == 0 {
            return Err(ValidatorError::InvalidParameters(
                "validator_threshold must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub is_validator: bool,
    pub commission_rate_bps: u32,
    /// Sum of all delegations to this validator
    pub total_delegated: u128,
    pub last_activity: Timestamp,
    /// First promotion time
    pub registered_at: Timestamp,
    pub total_rewards_claimed: u128,
    pub total_commission_earned: u128,
}

/// Result of re-evaluating an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Promoted,
    Demoted,
    Unchanged,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    pub params: ValidatorParameters,
    records: BTreeMap<AccountId, ValidatorRecord>,
    validators: ActiveParticipantIndex,
    /// (delegator, validator) -> delegated amount
    delegations: BTreeMap<(AccountId, AccountId), u128>,
}

impl ValidatorRegistry {
    pub fn new(params: ValidatorParameters) -> Self {
        ValidatorRegistry {
            params,
            ..Default::default()
        }
    }

    pub fn is_eligible(&self, balance: u128, is_violator: bool) -> bool {
        balance > 0 && balance >= self.params.validator_threshold && !is_violator
    }

    /// Promote or demote `account` to match its current balance and violator flag.
    /// Idempotent.
    pub fn evaluate(
        &mut self,
        account: &str,
        balance: u128,
        is_violator: bool,
        now: Timestamp,
    ) -> StatusChange {
        let eligible = self.is_eligible(balance, is_violator);
        let currently = self.is_validator(account);

        match (eligible, currently) {
            (true, false) => {
                let default_commission = self.params.default_commission_bps;
                let record = self
                    .records
                    .entry(account.to_string())
                    .or_insert_with(|| ValidatorRecord {
                        is_validator: false,
                        commission_rate_bps: default_commission,
                        total_delegated: 0,
                        last_activity: now,
                        registered_at: now,
                        total_rewards_claimed: 0,
                        total_commission_earned: 0,
                    });
                record.is_validator = true;
                record.last_activity = now;
                self.validators.insert(account);
                info!("Validator promoted: {} (balance {})", account, balance);
                StatusChange::Promoted
            }
            (false, true) => {
                if let Some(record) = self.records.get_mut(account) {
                    record.is_validator = false;
                    record.last_activity = now;
                }
                self.validators.remove(account);
                info!(
                    "Validator demoted: {} (balance {}, violator {})",
                    account, balance, is_violator
                );
                StatusChange::Demoted
            }
            _ => StatusChange::Unchanged,
        }
    }

    /// Explain why `account` is not (or already is) a validator.
    pub fn check_candidate(
        &self,
        account: &str,
        balance: u128,
        is_violator: bool,
    ) -> Result<(), ValidatorError> {
        if self.is_validator(account) {
            return Err(ValidatorError::AlreadyValidator(account.to_string()));
        }
        if is_violator {
            return Err(ValidatorError::GovernanceViolator(account.to_string()));
        }
        if balance == 0 || balance < self.params.validator_threshold {
            return Err(ValidatorError::InsufficientStake {
                balance,
                threshold: self.params.validator_threshold,
            });
        }
        Ok(())
    }

    pub fn set_commission(
        &mut self,
        validator: &str,
        rate_bps: u32,
        now: Timestamp,
    ) -> Result<(), ValidatorError> {
        if rate_bps > self.params.max_commission_bps {
            return Err(ValidatorError::CommissionTooHigh {
                rate: rate_bps,
                max: self.params.max_commission_bps,
            });
        }
        let record = self.active_record_mut(validator)?;
        record.commission_rate_bps = rate_bps;
        record.last_activity = now;
        Ok(())
    }

    /// Lower the commission ceiling; existing rates above it are clamped.
    pub fn set_max_commission(&mut self, max_bps: u32) -> Result<(), ValidatorError> {
        if max_bps as u128 > BPS_DENOMINATOR {
            return Err(ValidatorError::InvalidParameters(format!(
                "max commission {} exceeds 10000",
                max_bps
            )));
        }
        self.params.max_commission_bps = max_bps;
        self.params.default_commission_bps = self.params.default_commission_bps.min(max_bps);
        for record in self.records.values_mut() {
            record.commission_rate_bps = record.commission_rate_bps.min(max_bps);
        }
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: u128) -> Result<(), ValidatorError> {
        if threshold == 0 {
            return Err(ValidatorError::InvalidParameters(
                "validator_threshold must be non-zero".to_string(),
            ));
        }
        self.params.validator_threshold = threshold;
        Ok(())
    }

    pub fn delegate(
        &mut self,
        delegator: &str,
        validator: &str,
        amount: u128,
        now: Timestamp,
    ) -> Result<(), ValidatorError> {
        if amount == 0 {
            return Err(ValidatorError::ZeroAmount);
        }
        if delegator == validator {
            return Err(ValidatorError::SelfDelegation);
        }
        let record = self.active_record_mut(validator)?;
        record.total_delegated = record
            .total_delegated
            .checked_add(amount)
            .ok_or(ValidatorError::Overflow)?;
        record.last_activity = now;

        *self
            .delegations
            .entry((delegator.to_string(), validator.to_string()))
            .or_insert(0) += amount;
        Ok(())
    }

    /// Withdraw delegated stake. Allowed after the validator has been demoted.
    pub fn undelegate(
        &mut self,
        delegator: &str,
        validator: &str,
        amount: u128,
    ) -> Result<(), ValidatorError> {
        if amount == 0 {
            return Err(ValidatorError::ZeroAmount);
        }
        let key = (delegator.to_string(), validator.to_string());
        let available = self.delegations.get(&key).copied().unwrap_or(0);
        if available == 0 {
            return Err(ValidatorError::DelegationNotFound(validator.to_string()));
        }
        if amount > available {
            return Err(ValidatorError::InsufficientDelegation {
                requested: amount,
                available,
            });
        }

        if available == amount {
            self.delegations.remove(&key);
        } else {
            self.delegations.insert(key, available - amount);
        }
        if let Some(record) = self.records.get_mut(validator) {
            record.total_delegated -= amount;
        }
        Ok(())
    }

    /// Book a completed reward claim.
    pub fn note_claim(&mut self, validator: &str, payout: u128, commission: u128, now: Timestamp) {
        if let Some(record) = self.records.get_mut(validator) {
            record.total_rewards_claimed = record.total_rewards_claimed.saturating_add(payout);
            record.total_commission_earned = record.total_commission_earned.saturating_add(commission);
            record.last_activity = now;
        }
    }

    /// Weight used for reward sharing.
    pub fn validator_weight(&self, validator: &str, balance: u128) -> u128 {
        balance.saturating_add(self.total_delegated(validator))
    }

    /// Sum of weights over all active validators.
    pub fn total_validator_stake<F>(&self, balance_of: F) -> u128
    where
        F: Fn(&str) -> u128,
    {
        self.validators
            .iter()
            .map(|v| self.validator_weight(v, balance_of(v.as_str())))
            .fold(0u128, |acc, w| acc.saturating_add(w))
    }

    fn active_record_mut(&mut self, validator: &str) -> Result<&mut ValidatorRecord, ValidatorError> {
        match self.records.get_mut(validator) {
            Some(record) if record.is_validator => Ok(record),
            _ => Err(ValidatorError::NotValidator(validator.to_string())),
        }
    }

    pub fn record(&self, account: &str) -> Option<&ValidatorRecord> {
        self.records.get(account)
    }

    pub fn is_validator(&self, account: &str) -> bool {
        self.validators.contains(account)
    }

    pub fn validators(&self) -> &ActiveParticipantIndex {
        &self.validators
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    pub fn total_delegated(&self, validator: &str) -> u128 {
        self.records.get(validator).map(|r| r.total_delegated).unwrap_or(0)
    }

    pub fn delegation(&self, delegator: &str, validator: &str) -> u128 {
        self.delegations
            .get(&(delegator.to_string(), validator.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Check status and delegation bookkeeping against the given balances and flags.
    pub fn verify<B, V>(&self, balance_of: B, is_violator: V) -> Result<(), ValidatorError>
    where
        B: Fn(&str) -> u128,
        V: Fn(&str) -> bool,
    {
        for (account, record) in &self.records {
            let expected =
                self.is_eligible(balance_of(account.as_str()), is_violator(account.as_str()));
            if record.is_validator != expected || self.validators.contains(account) != expected {
                return Err(ValidatorError::InvariantViolation(format!(
                    "validator status of {} is stale",
                    account
                )));
            }
            if record.commission_rate_bps > self.params.max_commission_bps {
                return Err(ValidatorError::InvariantViolation(format!(
                    "commission of {} above maximum",
                    account
                )));
            }
        }

        let mut delegated: BTreeMap<&str, u128> = BTreeMap::new();
        for ((_, validator), amount) in &self.delegations {
            *delegated.entry(validator.as_str()).or_insert(0) += amount;
        }
        for (account, record) in &self.records {
            if delegated.get(account.as_str()).copied().unwrap_or(0) != record.total_delegated {
                return Err(ValidatorError::InvariantViolation(format!(
                    "delegation total of {} does not match delegations",
                    account
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidatorError {
    #[error("{0} is not an active validator")]
    NotValidator(AccountId),
    #[error("{0} is already a validator")]
    AlreadyValidator(AccountId),
    #[error("Insufficient stake: balance {balance}, threshold {threshold}")]
    InsufficientStake { balance: u128, threshold: u128 },
    #[error("{0} is flagged as a governance violator")]
    GovernanceViolator(AccountId),
    #[error("Commission {rate} bps exceeds maximum {max} bps")]
    CommissionTooHigh { rate: u32, max: u32 },
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Validators cannot delegate to themselves")]
    SelfDelegation,
    #[error("No delegation to {0}")]
    DelegationNotFound(AccountId),
    #[error("Insufficient delegation: requested {requested}, available {available}")]
    InsufficientDelegation { requested: u128, available: u128 },
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Invalid validator parameters: {0}")]
    InvalidParameters(String),
    #[error("Validator invariant violated: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ValidatorRegistry {
        ValidatorRegistry::new(ValidatorParameters {
            validator_threshold: 1_000,
            max_commission_bps: 2_000,
            default_commission_bps: 500,
        })
    }

    #[test]
    fn test_promotion_at_threshold() {
        let mut registry = registry();
        assert_eq!(registry.evaluate("val", 999, false, 0), StatusChange::Unchanged);
        assert_eq!(registry.evaluate("val", 1_000, false, 5), StatusChange::Promoted);
        assert_eq!(registry.evaluate("val", 1_000, false, 6), StatusChange::Unchanged);

        let record = registry.record("val").unwrap();
        assert!(record.is_validator);
        assert_eq!(record.registered_at, 5);
        assert_eq!(record.commission_rate_bps, 500);
        assert_eq!(registry.validator_count(), 1);
    }

    #[test]
    fn test_violator_is_demoted() {
        let mut registry = registry();
        registry.evaluate("val", 5_000, false, 0);
        assert_eq!(registry.evaluate("val", 5_000, true, 1), StatusChange::Demoted);
        assert!(!registry.is_validator("val"));
        // Record is kept for history
        assert!(registry.record("val").is_some());
    }

    #[test]
    fn test_check_candidate_reasons() {
        let mut registry = registry();
        assert!(matches!(
            registry.check_candidate("a", 10, false),
            Err(ValidatorError::InsufficientStake { .. })
        ));
        assert_eq!(
            registry.check_candidate("a", 10_000, true),
            Err(ValidatorError::GovernanceViolator("a".into()))
        );
        registry.evaluate("a", 10_000, false, 0);
        assert_eq!(
            registry.check_candidate("a", 10_000, false),
            Err(ValidatorError::AlreadyValidator("a".into()))
        );
    }

    #[test]
    fn test_commission_bounds() {
        let mut registry = registry();
        assert!(matches!(
            registry.set_commission("val", 100, 0),
            Err(ValidatorError::NotValidator(_))
        ));
        registry.evaluate("val", 1_000, false, 0);
        assert!(matches!(
            registry.set_commission("val", 2_001, 0),
            Err(ValidatorError::CommissionTooHigh { .. })
        ));
        registry.set_commission("val", 1_500, 0).unwrap();

        registry.set_max_commission(1_000).unwrap();
        assert_eq!(registry.record("val").unwrap().commission_rate_bps, 1_000);
    }

    #[test]
    fn test_delegation_tracking() {
        let mut registry = registry();
        registry.evaluate("val", 1_000, false, 0);

        registry.delegate("alice", "val", 300, 1).unwrap();
        registry.delegate("bob", "val", 200, 2).unwrap();
        assert_eq!(registry.total_delegated("val"), 500);
        assert_eq!(registry.validator_weight("val", 1_000), 1_500);

        registry.undelegate("alice", "val", 300).unwrap();
        assert_eq!(registry.delegation("alice", "val"), 0);
        assert_eq!(registry.total_delegated("val"), 200);

        assert_eq!(
            registry.undelegate("alice", "val", 1),
            Err(ValidatorError::DelegationNotFound("val".into()))
        );
        assert_eq!(registry.delegate("val", "val", 1, 3), Err(ValidatorError::SelfDelegation));
        assert!(registry.verify(|_| 1_000, |_| false).is_ok());
    }

    #[test]
    fn test_total_validator_stake() {
        let mut registry = registry();
        registry.evaluate("a", 1_000, false, 0);
        registry.evaluate("b", 3_000, false, 0);
        registry.delegate("c", "a", 500, 0).unwrap();

        let balances = |account: &str| match account {
            "a" => 1_000,
            "b" => 3_000,
            _ => 0,
        };
        assert_eq!(registry.total_validator_stake(balances), 4_500);
    }

    #[test]
    fn test_verify_detects_stale_status() {
        let mut registry = registry();
        registry.evaluate("a", 1_000, false, 0);
        assert!(registry.verify(|_| 999, |_| false).is_err());
    }
}
