// VALIDATOR SLASHING ENGINE
// Cooldown-gated, capped stake reduction with an append-only audit trail.
//
// SAFETY INVARIANTS:
// 1. Only active validators can be slashed
// 2. A single slash never exceeds max_slash_bps of the validator's balance
// 3. At most one slash per validator per cooldown window
// 4. Records are append-only; only their appeal state ever changes
// 5. Record hashes commit to everything except the appeal state

use crate::types::{apply_bps, AccountId, Timestamp, BPS_DENOMINATOR, SECONDS_PER_DAY};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Reason attached to a slash. `Unspecified` is never accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SlashReason {
    Unspecified,
    Downtime,
    DoubleSigning,
    Misbehavior,
    ProtocolViolation,
    ConsensusFailure,
    GovernanceViolation,
    Other,
}

impl SlashReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlashReason::Unspecified => "UNSPECIFIED",
            SlashReason::Downtime => "DOWNTIME",
            SlashReason::DoubleSigning => "DOUBLE_SIGNING",
            SlashReason::Misbehavior => "MISBEHAVIOR",
            SlashReason::ProtocolViolation => "PROTOCOL_VIOLATION",
            SlashReason::ConsensusFailure => "CONSENSUS_FAILURE",
            SlashReason::GovernanceViolation => "GOVERNANCE_VIOLATION",
            SlashReason::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppealState {
    None,
    Pending,
    Upheld,
    Overturned,
}

/// Record of a slashing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    /// Position in the validator's history
    pub index: u64,
    pub timestamp: Timestamp,
    pub amount: u128,
    pub reason: SlashReason,
    pub reporter: AccountId,
    /// Opaque reference to off-chain evidence
    pub evidence: String,
    pub record_hash: String,
    pub appeal: AppealState,
}

impl SlashRecord {
    pub fn compute_hash(&self, validator: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(validator.as_bytes());
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.reason.as_str().as_bytes());
        hasher.update(self.reporter.as_bytes());
        hasher.update(self.evidence.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlashingParameters {
    /// Largest fraction of a validator's balance taken by one slash
    pub max_slash_bps: u32,
    /// Smallest amount worth slashing after capping
    pub min_slash_amount: u128,
    /// Minimum spacing between slashes of the same validator
    pub slash_cooldown: Timestamp,
}

impl Default for SlashingParameters {
    fn default() -> Self {
        SlashingParameters {
            max_slash_bps: 5_000,
            min_slash_amount: 1,
            slash_cooldown: SECONDS_PER_DAY,
        }
    }
}

impl SlashingParameters {
    pub fn validate(&self) -> Result<(), SlashError> {
        if self.max_slash_bps == 0 || self.max_slash_bps as u128 > BPS_DENOMINATOR {
            return Err(SlashError::InvalidParameters(format!(
                "max_slash_bps must be in 1..=10000, got {}",
                self.max_slash_bps
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlashingEngine {
    pub params: SlashingParameters,
    history: BTreeMap<AccountId, Vec<SlashRecord>>,
    last_slash_time: BTreeMap<AccountId, Timestamp>,
    total_slashed: u128,
}

impl SlashingEngine {
    pub fn new(params: SlashingParameters) -> Self {
        SlashingEngine {
            params,
            ..Default::default()
        }
    }

    /// Check a slash request and return the amount that will actually be taken.
    pub fn prepare(
        &self,
        validator: &str,
        requested: u128,
        reason: SlashReason,
        is_validator: bool,
        balance: u128,
        now: Timestamp,
    ) -> Result<u128, SlashError> {
        if !is_validator {
            return Err(SlashError::NotValidator(validator.to_string()));
        }
        if requested == 0 {
            return Err(SlashError::ZeroAmount);
        }
        if reason == SlashReason::Unspecified {
            return Err(SlashError::UnspecifiedReason);
        }

        let remaining = self.cooldown_remaining(validator, now);
        if remaining > 0 {
            return Err(SlashError::CooldownActive { remaining });
        }

        let cap = apply_bps(balance, self.params.max_slash_bps);
        let amount = requested.min(cap);
        if amount == 0 || amount < self.params.min_slash_amount {
            return Err(SlashError::BelowMinimum {
                amount,
                minimum: self.params.min_slash_amount,
            });
        }
        Ok(amount)
    }

    /// Seconds until `validator` may be slashed again.
    pub fn cooldown_remaining(&self, validator: &str, now: Timestamp) -> Timestamp {
        match self.last_slash_time.get(validator) {
            Some(last) => last
                .saturating_add(self.params.slash_cooldown)
                .saturating_sub(now),
            None => 0,
        }
    }

    /// Append a record for an executed slash.
    pub fn record(
        &mut self,
        validator: &str,
        reporter: &str,
        amount: u128,
        reason: SlashReason,
        evidence: &str,
        now: Timestamp,
    ) -> SlashRecord {
        let records = self.history.entry(validator.to_string()).or_default();
        let mut record = SlashRecord {
            index: records.len() as u64,
            timestamp: now,
            amount,
            reason,
            reporter: reporter.to_string(),
            evidence: evidence.to_string(),
            record_hash: String::new(),
            appeal: AppealState::None,
        };
        record.record_hash = record.compute_hash(validator);
        records.push(record.clone());

        self.last_slash_time.insert(validator.to_string(), now);
        self.total_slashed = self.total_slashed.saturating_add(amount);

        info!(
            "Slashed validator {} by {} for {} (record {})",
            validator,
            amount,
            reason.as_str(),
            record.record_hash
        );
        record
    }

    /// Open an appeal on a record that has none yet.
    pub fn file_appeal(&mut self, validator: &str, index: u64) -> Result<(), SlashError> {
        let record = self.record_mut(validator, index)?;
        if record.appeal != AppealState::None {
            return Err(SlashError::AppealNotAllowed(record.appeal));
        }
        record.appeal = AppealState::Pending;
        info!("Appeal filed by {} against slash #{}", validator, index);
        Ok(())
    }

    /// Close a pending appeal. Returns the updated record.
    pub fn resolve_appeal(
        &mut self,
        validator: &str,
        index: u64,
        overturn: bool,
    ) -> Result<SlashRecord, SlashError> {
        let record = self.record_mut(validator, index)?;
        if record.appeal != AppealState::Pending {
            return Err(SlashError::AppealNotAllowed(record.appeal));
        }
        record.appeal = if overturn {
            AppealState::Overturned
        } else {
            AppealState::Upheld
        };
        info!(
            "Appeal on slash #{} of {} resolved: {:?}",
            index, validator, record.appeal
        );
        Ok(record.clone())
    }

    /// True while some governance-violation slash of `validator` stands.
    pub fn has_standing_governance_violation(&self, validator: &str) -> bool {
        self.slash_history(validator).iter().any(|r| {
            r.reason == SlashReason::GovernanceViolation && r.appeal != AppealState::Overturned
        })
    }

    fn record_mut(&mut self, validator: &str, index: u64) -> Result<&mut SlashRecord, SlashError> {
        self.history
            .get_mut(validator)
            .and_then(|records| records.get_mut(index as usize))
            .ok_or(SlashError::RecordNotFound(index))
    }

    pub fn slash_history(&self, validator: &str) -> &[SlashRecord] {
        self.history.get(validator).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last_slash_time(&self, validator: &str) -> Option<Timestamp> {
        self.last_slash_time.get(validator).copied()
    }

    pub fn total_slashed(&self) -> u128 {
        self.total_slashed
    }

    /// Recompute every record hash.
    pub fn verify_records(&self) -> Result<(), SlashError> {
        for (validator, records) in &self.history {
            for (position, record) in records.iter().enumerate() {
                if record.index != position as u64 || record.compute_hash(validator) != record.record_hash {
                    return Err(SlashError::TamperedRecord {
                        validator: validator.clone(),
                        index: position as u64,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlashError {
    #[error("{0} is not an active validator")]
    NotValidator(AccountId),
    #[error("Slash amount must be greater than zero")]
    ZeroAmount,
    #[error("A slash reason is required")]
    UnspecifiedReason,
    #[error("Capped slash amount {amount} is below the minimum {minimum}")]
    BelowMinimum { amount: u128, minimum: u128 },
    #[error("Slash cooldown active for another {remaining}s")]
    CooldownActive { remaining: Timestamp },
    #[error("Slash record {0} not found")]
    RecordNotFound(u64),
    #[error("Appeal not allowed from state {0:?}")]
    AppealNotAllowed(AppealState),
    #[error("Slash record {index} of {validator} fails its hash check")]
    TamperedRecord { validator: AccountId, index: u64 },
    #[error("Invalid slashing parameters: {0}")]
    InvalidParameters(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SlashingEngine {
        SlashingEngine::new(SlashingParameters {
            max_slash_bps: 5_000,
            min_slash_amount: 10,
            slash_cooldown: 100,
        })
    }

    #[test]
    fn test_prepare_caps_at_max_fraction() {
        let engine = engine();
        let amount = engine
            .prepare("val", 900, SlashReason::Downtime, true, 1_000, 0)
            .unwrap();
        assert_eq!(amount, 500);
    }

    #[test]
    fn test_prepare_rejections() {
        let engine = engine();
        assert_eq!(
            engine.prepare("val", 100, SlashReason::Downtime, false, 1_000, 0),
            Err(SlashError::NotValidator("val".into()))
        );
        assert_eq!(
            engine.prepare("val", 0, SlashReason::Downtime, true, 1_000, 0),
            Err(SlashError::ZeroAmount)
        );
        assert_eq!(
            engine.prepare("val", 100, SlashReason::Unspecified, true, 1_000, 0),
            Err(SlashError::UnspecifiedReason)
        );
        assert!(matches!(
            engine.prepare("val", 100, SlashReason::Downtime, true, 10, 0),
            Err(SlashError::BelowMinimum { amount: 5, .. })
        ));
    }

    #[test]
    fn test_cooldown_enforced() {
        let mut engine = engine();
        engine.record("val", "reporter", 50, SlashReason::Downtime, "ev-1", 1_000);

        assert_eq!(
            engine.prepare("val", 50, SlashReason::Downtime, true, 1_000, 1_040),
            Err(SlashError::CooldownActive { remaining: 60 })
        );
        assert!(engine
            .prepare("val", 50, SlashReason::Downtime, true, 1_000, 1_100)
            .is_ok());
    }

    #[test]
    fn test_records_are_hashed_and_indexed() {
        let mut engine = engine();
        let first = engine.record("val", "r", 50, SlashReason::Downtime, "ev-1", 10);
        let second = engine.record("val", "r", 60, SlashReason::DoubleSigning, "ev-2", 500);

        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(first.record_hash.len(), 64);
        assert_ne!(first.record_hash, second.record_hash);
        assert_eq!(engine.total_slashed(), 110);
        assert_eq!(engine.last_slash_time("val"), Some(500));
        assert!(engine.verify_records().is_ok());
    }

    #[test]
    fn test_appeal_lifecycle() {
        let mut engine = engine();
        engine.record("val", "r", 50, SlashReason::GovernanceViolation, "ev", 10);
        assert!(engine.has_standing_governance_violation("val"));

        // Cannot resolve before filing
        assert_eq!(
            engine.resolve_appeal("val", 0, true),
            Err(SlashError::AppealNotAllowed(AppealState::None))
        );

        engine.file_appeal("val", 0).unwrap();
        assert_eq!(
            engine.file_appeal("val", 0),
            Err(SlashError::AppealNotAllowed(AppealState::Pending))
        );

        let record = engine.resolve_appeal("val", 0, true).unwrap();
        assert_eq!(record.appeal, AppealState::Overturned);
        assert!(!engine.has_standing_governance_violation("val"));

        // Appeal state is outside the hash commitment
        assert!(engine.verify_records().is_ok());
    }

    #[test]
    fn test_missing_record() {
        let mut engine = engine();
        assert_eq!(engine.file_appeal("val", 3), Err(SlashError::RecordNotFound(3)));
    }
}
