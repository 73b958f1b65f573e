/// ACTIVE PARTICIPANT INDEX
///
/// Set of accounts with O(1) insert, remove and membership. Removal swaps the
/// departing entry with the last one and truncates, keeping the member list dense
/// so it can be iterated without scanning tombstones.

use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AccountId>", into = "Vec<AccountId>")]
pub struct ActiveParticipantIndex {
    members: Vec<AccountId>,
    /// Slot of each member in `members`; rebuilt on deserialization
    positions: HashMap<AccountId, usize>,
}

impl From<Vec<AccountId>> for ActiveParticipantIndex {
    fn from(accounts: Vec<AccountId>) -> Self {
        let mut index = ActiveParticipantIndex::new();
        for account in &accounts {
            index.insert(account);
        }
        index
    }
}

impl From<ActiveParticipantIndex> for Vec<AccountId> {
    fn from(index: ActiveParticipantIndex) -> Self {
        index.members
    }
}

impl ActiveParticipantIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the account was newly added.
    pub fn insert(&mut self, account: &str) -> bool {
        if self.positions.contains_key(account) {
            return false;
        }
        self.positions.insert(account.to_string(), self.members.len());
        self.members.push(account.to_string());
        true
    }

    /// Returns true if the account was present.
    pub fn remove(&mut self, account: &str) -> bool {
        let Some(index) = self.positions.remove(account) else {
            return false;
        };

        let last = self.members.len() - 1;
        if index != last {
            self.members.swap(index, last);
            let moved = self.members[index].clone();
            self.positions.insert(moved, index);
        }
        self.members.truncate(last);
        true
    }

    pub fn contains(&self, account: &str) -> bool {
        self.positions.contains_key(account)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountId> {
        self.members.iter()
    }

    pub fn members(&self) -> &[AccountId] {
        &self.members
    }
}
