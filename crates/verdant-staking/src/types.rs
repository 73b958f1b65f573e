/// SHARED PRIMITIVES
///
/// Identifiers, time units and the per-call context every engine operation receives.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Account identifier (hex-encoded address or any opaque string key)
pub type AccountId = String;

/// Project identifier as issued by the project registry
pub type ProjectId = u64;

/// Wall-clock timestamp in seconds, supplied by the host environment
pub type Timestamp = u64;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// 365-day year used by all APR math
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// 100% expressed in basis points
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Multiplier of 100 means 1.0x
pub const MULTIPLIER_DENOMINATOR: u128 = 100;

/// One whole token in base units (18 decimals)
pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Caller identity and time for a single engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Account submitting the operation
    pub caller: AccountId,
    /// Host-supplied wall clock at submission
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: impl Into<AccountId>, now: Timestamp) -> Self {
        CallContext {
            caller: caller.into(),
            now,
        }
    }
}

/// Floor of `amount * numerator / denominator` with a 256-bit intermediate product.
/// Saturates at `u128::MAX`; returns zero on a zero denominator.
pub fn mul_div(amount: u128, numerator: u128, denominator: u128) -> u128 {
    if denominator == 0 {
        return 0;
    }
    if let Some(product) = amount.checked_mul(numerator) {
        return product / denominator;
    }
    let quotient = U256::from(amount) * U256::from(numerator) / U256::from(denominator);
    if quotient > U256::from(u128::MAX) {
        u128::MAX
    } else {
        quotient.as_u128()
    }
}

/// Apply a basis-point rate to an amount.
pub fn apply_bps(amount: u128, bps: u32) -> u128 {
    mul_div(amount, bps as u128, BPS_DENOMINATOR)
}
