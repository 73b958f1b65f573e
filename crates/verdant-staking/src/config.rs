/// ENGINE CONFIGURATION
///
/// Genesis parameters for every component. Defaults describe a complete deployment;
/// `load` layers an optional file and `VERDANT__*` environment variables over them
/// (e.g. `VERDANT__SLASHING__MAX_SLASH_BPS=2500`).

use crate::governance_sync::GovernanceParameters;
use crate::penalty_distributor::PenaltyParameters;
use crate::reward_accrual::RewardParameters;
use crate::slashing_engine::SlashingParameters;
use crate::tier_catalog::{default_tiers, Tier, TierCatalog};
use crate::types::{Timestamp, SECONDS_PER_DAY};
use crate::validator_registry::ValidatorParameters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "VERDANT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    /// Shortest lock accepted for a stake
    pub min_stake_duration: Timestamp,
    pub tiers: Vec<Tier>,
    pub rewards: RewardParameters,
    pub validators: ValidatorParameters,
    pub slashing: SlashingParameters,
    pub penalties: PenaltyParameters,
    pub governance: GovernanceParameters,
}

impl Default for StakingConfig {
    fn default() -> Self {
        StakingConfig {
            min_stake_duration: 7 * SECONDS_PER_DAY,
            tiers: default_tiers(),
            rewards: RewardParameters::default(),
            validators: ValidatorParameters::default(),
            slashing: SlashingParameters::default(),
            penalties: PenaltyParameters::default(),
            governance: GovernanceParameters::default(),
        }
    }
}

impl StakingConfig {
    /// Load from `path` (TOML, JSON or YAML by extension; may be absent) with
    /// environment overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let config: StakingConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build the tier catalog described by this configuration.
    pub fn tier_catalog(&self) -> Result<TierCatalog, ConfigError> {
        TierCatalog::new(self.tiers.clone()).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_stake_duration == 0 {
            return Err(ConfigError::Invalid(
                "min_stake_duration must be non-zero".to_string(),
            ));
        }
        self.tier_catalog()?;
        self.rewards
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.validators
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.slashing
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.penalties
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(StakingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_penalty_split_rejected() {
        let mut config = StakingConfig::default();
        config.penalties.split.burn_bps = 9_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_tiers_rejected() {
        let mut config = StakingConfig::default();
        config.tiers.reverse();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "min_stake_duration = 86400\n\n[slashing]\nmax_slash_bps = 2500\nslash_cooldown = 600"
        )
        .unwrap();

        let config = StakingConfig::load(file.path()).unwrap();
        assert_eq!(config.min_stake_duration, 86_400);
        assert_eq!(config.slashing.max_slash_bps, 2_500);
        assert_eq!(config.slashing.slash_cooldown, 600);
        // Unspecified sections keep their defaults
        assert_eq!(config.penalties, PenaltyParameters::default());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StakingConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.min_stake_duration, StakingConfig::default().min_stake_duration);
    }
}
