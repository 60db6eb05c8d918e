// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::group::GroupDescription;
use crate::identity::{AccountId, GroupUuid, Principal};
use crate::membership::ListGroupMembership;
use crate::traits::{GroupBackend, MembershipResolver};

const PREFIX: &str = "ldap:";

/// External backend modelled after a directory service, owning the `ldap:` id space.
#[derive(Debug, Default)]
pub struct TestDirectoryBackend {
    members: RwLock<HashMap<AccountId, HashSet<GroupUuid>>>,
    visible_to_all: RwLock<HashSet<GroupUuid>>,
}

impl TestDirectoryBackend {
    /// Identifier of a directory group.
    pub fn group(name: &str) -> GroupUuid {
        GroupUuid::new(format!("{PREFIX}cn={name}")).expect("valid directory group id")
    }

    pub fn add_member(&self, account: AccountId, group: &GroupUuid) {
        self.members
            .write()
            .entry(account)
            .or_default()
            .insert(group.clone());
    }

    pub fn remove_member(&self, account: AccountId, group: &GroupUuid) {
        if let Some(groups) = self.members.write().get_mut(&account) {
            groups.remove(group);
        }
    }

    pub fn set_visible_to_all(&self, group: &GroupUuid) {
        self.visible_to_all.write().insert(group.clone());
    }
}

impl GroupBackend for TestDirectoryBackend {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn handles(&self, uuid: &GroupUuid) -> bool {
        uuid.as_str().starts_with(PREFIX)
    }

    fn get(&self, uuid: &GroupUuid) -> Option<GroupDescription> {
        Some(GroupDescription {
            uuid: uuid.clone(),
            name: uuid.as_str().trim_start_matches(PREFIX).to_owned(),
            owner_group_uuid: None,
            visible_to_all: self.visible_to_all.read().contains(uuid),
        })
    }

    fn membership_for(&self, principal: &Principal) -> Box<dyn MembershipResolver> {
        let groups = principal
            .account_id()
            .and_then(|account| self.members.read().get(&account).cloned())
            .unwrap_or_default();
        Box::new(ListGroupMembership::new(groups))
    }
}
