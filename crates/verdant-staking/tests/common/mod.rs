//! Shared fixtures: in-memory collaborators backed by one inspectable world state.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use verdant_staking::*;

pub const ADMIN: &str = "admin";
pub const DAY: u64 = SECONDS_PER_DAY;

/// Balance held by the staking vault at genesis to pay out yield
pub const VAULT_RESERVE: u128 = 1_000_000_000;

#[derive(Debug, Default)]
pub struct WorldState {
    pub wallets: BTreeMap<String, u128>,
    pub vault: u128,
    pub projects: BTreeSet<ProjectId>,
    pub staker_counts: BTreeMap<ProjectId, u64>,
    pub burned: u128,
    pub liquidity: u128,
    pub payouts: Vec<(String, u128)>,
    pub slash_events: Vec<(String, u128, SlashReason)>,

    pub fail_transfer: bool,
    pub fail_transfer_from: bool,
    pub fail_burn: bool,
    pub fail_liquidity: bool,
    pub fail_payout: bool,
    pub fail_registry: bool,

    /// Engine handle a collaborator calls back into during `transfer_from`
    pub reentry: Option<SharedStakingEngine>,
    pub reentry_error: Option<StakingError>,
}

pub type World = Arc<Mutex<WorldState>>;

impl WorldState {
    pub fn wallet(&self, account: &str) -> u128 {
        self.wallets.get(account).copied().unwrap_or(0)
    }
}

pub struct FakeToken(pub World);

impl ValueTransfer for FakeToken {
    fn transfer(&mut self, to: &str, amount: u128) -> Result<(), CollaboratorError> {
        let mut world = self.0.lock();
        if world.fail_transfer {
            return Err(CollaboratorError::Unavailable("token paused".into()));
        }
        if world.vault < amount {
            return Err(CollaboratorError::Rejected("vault underfunded".into()));
        }
        world.vault -= amount;
        *world.wallets.entry(to.to_string()).or_insert(0) += amount;
        Ok(())
    }

    fn transfer_from(&mut self, from: &str, amount: u128) -> Result<(), CollaboratorError> {
        let hook = self.0.lock().reentry.clone();
        if let Some(engine) = hook {
            let nested = engine.execute(|e| {
                e.fund_reward_pool(&CallContext::new("hook", e.last_seen()), 1)
            });
            if let Err(err) = nested {
                self.0.lock().reentry_error = Some(err);
                return Err(CollaboratorError::Rejected("nested call failed".into()));
            }
        }

        let mut world = self.0.lock();
        if world.fail_transfer_from {
            return Err(CollaboratorError::Unavailable("token paused".into()));
        }
        let balance = world.wallet(from);
        if balance < amount {
            return Err(CollaboratorError::Rejected(format!("{} has {}", from, balance)));
        }
        world.wallets.insert(from.to_string(), balance - amount);
        world.vault += amount;
        Ok(())
    }
}

pub struct FakeProjects(pub World);

impl ProjectRegistry for FakeProjects {
    fn project_exists(&self, project: ProjectId) -> bool {
        self.0.lock().projects.contains(&project)
    }

    fn increment_staker_count(&mut self, project: ProjectId) -> Result<(), CollaboratorError> {
        *self.0.lock().staker_counts.entry(project).or_insert(0) += 1;
        Ok(())
    }

    fn decrement_staker_count(&mut self, project: ProjectId) -> Result<(), CollaboratorError> {
        let mut world = self.0.lock();
        let count = world.staker_counts.entry(project).or_insert(0);
        *count = count.saturating_sub(1);
        Ok(())
    }

    fn project_count(&self) -> u64 {
        self.0.lock().projects.len() as u64
    }
}

pub struct FakePayout(pub World);

impl RewardPayout for FakePayout {
    fn distribute_reward(&mut self, account: &str, amount: u128) -> Result<(), CollaboratorError> {
        let mut world = self.0.lock();
        if world.fail_payout {
            return Err(CollaboratorError::Unavailable("payout sink down".into()));
        }
        world.payouts.push((account.to_string(), amount));
        Ok(())
    }
}

pub struct FakeSinks(pub World);

impl PenaltySinks for FakeSinks {
    fn burn(&mut self, amount: u128) -> Result<(), CollaboratorError> {
        let mut world = self.0.lock();
        if world.fail_burn {
            return Err(CollaboratorError::Unavailable("burn disabled".into()));
        }
        world.burned += amount;
        Ok(())
    }

    fn inject_liquidity(&mut self, amount: u128) -> Result<(), CollaboratorError> {
        let mut world = self.0.lock();
        if world.fail_liquidity {
            return Err(CollaboratorError::Unavailable("pool paused".into()));
        }
        world.liquidity += amount;
        Ok(())
    }
}

pub struct FakeSlashRegistry(pub World);

impl SlashingRegistry for FakeSlashRegistry {
    fn record_slashing_event(
        &mut self,
        validator: &str,
        amount: u128,
        reason: SlashReason,
    ) -> Result<(), CollaboratorError> {
        let mut world = self.0.lock();
        if world.fail_registry {
            return Err(CollaboratorError::Unavailable("registry offline".into()));
        }
        world.slash_events.push((validator.to_string(), amount, reason));
        Ok(())
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small-unit configuration with rate drift disabled so yields are exact.
pub fn test_config() -> StakingConfig {
    let mut config = StakingConfig::default();
    config.rewards.low_stake_threshold = 0;
    config.rewards.rate_adjustment_interval = u64::MAX;
    config.validators.validator_threshold = 100_000;
    config.governance.voting_threshold = 1_000;
    config.slashing.min_slash_amount = 1;
    config.slashing.slash_cooldown = DAY;
    config
}

pub fn new_world() -> World {
    let mut state = WorldState {
        vault: VAULT_RESERVE,
        ..Default::default()
    };
    state.projects.extend([1, 2, 3]);
    for account in ["alice", "bob", "carol", "val1", "val2", "funder"] {
        state.wallets.insert(account.to_string(), 10_000_000);
    }
    Arc::new(Mutex::new(state))
}

/// Give every seeded wallet `amount` for tests that run at full token scale.
pub fn fund_wallets(world: &World, amount: u128) {
    let mut world = world.lock();
    for balance in world.wallets.values_mut() {
        *balance = amount;
    }
}

pub fn collaborators(world: &World) -> Collaborators {
    Collaborators::new(
        Box::new(FakeToken(world.clone())),
        Box::new(FakeProjects(world.clone())),
        Box::new(FakePayout(world.clone())),
        Box::new(FakeSinks(world.clone())),
    )
    .with_slashing_registry(Box::new(FakeSlashRegistry(world.clone())))
}

pub fn setup_with(config: StakingConfig) -> (StakingEngine, World) {
    init_logger();
    let world = new_world();
    let engine = StakingEngine::genesis(config, ADMIN, collaborators(&world), 0)
        .expect("genesis with test config");
    (engine, world)
}

pub fn setup() -> (StakingEngine, World) {
    setup_with(test_config())
}

pub fn ctx(caller: &str, now: u64) -> CallContext {
    CallContext::new(caller, now)
}

pub fn request(project: ProjectId, amount: u128, duration_days: u64) -> StakeRequest {
    StakeRequest {
        project,
        amount,
        duration: duration_days * DAY,
        is_lp: false,
        auto_compound: false,
    }
}
