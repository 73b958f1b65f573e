/// ACCESS CONTROL
///
/// Role assignments for privileged operations. Every engine operation declares the
/// `Capability` it needs and the engine checks it here before touching state. `Admin` satisfies any role requirement and
/// is the only role that can grant or revoke roles; the last admin cannot be removed.

use crate::types::AccountId;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Parameter changes and role management
    Admin,
    /// Thresholds, rates, violator flags and appeal rulings
    Governance,
    /// Submits slashes
    Slasher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Governance => "GOVERNANCE",
            Role::Slasher => "SLASHER",
        }
    }
}

/// What an operation requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<'a> {
    /// Any caller, acting on its own stake
    Open,
    Role(Role),
    /// Only the named account itself
    Account(&'a str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    roles: BTreeMap<AccountId, BTreeSet<Role>>,
}

impl AccessControl {
    /// Start with a single administrator.
    pub fn genesis(admin: &str) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(admin.to_string(), BTreeSet::from([Role::Admin]));
        AccessControl { roles }
    }

    pub fn has_role(&self, account: &str, role: Role) -> bool {
        self.roles
            .get(account)
            .map(|held| held.contains(&role) || held.contains(&Role::Admin))
            .unwrap_or(false)
    }

    pub fn authorize(&self, caller: &str, role: Role) -> Result<(), AccessError> {
        if self.has_role(caller, role) {
            Ok(())
        } else {
            Err(AccessError::MissingRole {
                account: caller.to_string(),
                role,
            })
        }
    }

    /// Account-scoped actions may only be performed by the account itself.
    pub fn authorize_account(&self, caller: &str, account: &str) -> Result<(), AccessError> {
        if caller == account {
            Ok(())
        } else {
            Err(AccessError::NotAccountOwner {
                caller: caller.to_string(),
                account: account.to_string(),
            })
        }
    }

    pub fn check(&self, caller: &str, required: Capability<'_>) -> Result<(), AccessError> {
        match required {
            Capability::Open => Ok(()),
            Capability::Role(role) => self.authorize(caller, role),
            Capability::Account(account) => self.authorize_account(caller, account),
        }
    }

    pub fn grant(&mut self, caller: &str, account: &str, role: Role) -> Result<bool, AccessError> {
        self.authorize(caller, Role::Admin)?;
        let granted = self.roles.entry(account.to_string()).or_default().insert(role);
        if granted {
            info!("{} granted {} to {}", caller, role.as_str(), account);
        }
        Ok(granted)
    }

    pub fn revoke(&mut self, caller: &str, account: &str, role: Role) -> Result<bool, AccessError> {
        self.authorize(caller, Role::Admin)?;
        if role == Role::Admin
            && self.holds_explicitly(account, Role::Admin)
            && self.explicit_holders(Role::Admin) == 1
        {
            return Err(AccessError::LastAdmin);
        }

        let revoked = match self.roles.get_mut(account) {
            Some(held) => {
                let removed = held.remove(&role);
                if held.is_empty() {
                    self.roles.remove(account);
                }
                removed
            }
            None => false,
        };
        if revoked {
            info!("{} revoked {} from {}", caller, role.as_str(), account);
        }
        Ok(revoked)
    }

    fn holds_explicitly(&self, account: &str, role: Role) -> bool {
        self.roles.get(account).map(|held| held.contains(&role)).unwrap_or(false)
    }

    fn explicit_holders(&self, role: Role) -> usize {
        self.roles.values().filter(|held| held.contains(&role)).count()
    }

    pub fn roles_of(&self, account: &str) -> Vec<Role> {
        self.roles
            .get(account)
            .map(|held| held.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("{account} lacks role {role:?}")]
    MissingRole { account: AccountId, role: Role },
    #[error("{caller} cannot act for {account}")]
    NotAccountOwner { caller: AccountId, account: AccountId },
    #[error("Cannot revoke the last administrator")]
    LastAdmin,
}
