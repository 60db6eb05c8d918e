// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{AccountId, GroupId, GroupUuid};

/// A group owned by the internal group system.
///
/// Internal groups are mutable (renames, membership edits) through paths outside of this crate.
/// Every such path is expected to call the matching eviction hook after a successful write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalGroup {
    pub id: GroupId,
    pub uuid: GroupUuid,
    pub name: String,
    pub description: Option<String>,

    /// Group whose members administrate this group.
    pub owner_group_uuid: Option<GroupUuid>,

    /// Group and its members can be listed by everyone.
    pub visible_to_all: bool,

    /// Accounts which are direct members.
    pub members: HashSet<AccountId>,

    /// Groups which are included as direct subgroups, internal or external.
    pub subgroups: HashSet<GroupUuid>,
}

impl InternalGroup {
    pub fn new(id: GroupId, uuid: GroupUuid, name: impl Into<String>) -> Self {
        Self {
            id,
            uuid,
            name: name.into(),
            description: None,
            owner_group_uuid: None,
            visible_to_all: false,
            members: HashSet::new(),
            subgroups: HashSet::new(),
        }
    }

    pub fn has_member(&self, account: AccountId) -> bool {
        self.members.contains(&account)
    }

    pub fn description(&self) -> GroupDescription {
        GroupDescription {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            owner_group_uuid: self.owner_group_uuid.clone(),
            visible_to_all: self.visible_to_all,
        }
    }
}

/// Backend-independent view of a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupDescription {
    pub uuid: GroupUuid,
    pub name: String,
    pub owner_group_uuid: Option<GroupUuid>,
    pub visible_to_all: bool,
}

/// Reference to a group from configuration, by name and (once resolved) by identifier.
///
/// References which could not be resolved never match any principal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupReference {
    pub uuid: Option<GroupUuid>,
    pub name: String,
}

impl GroupReference {
    pub fn new(uuid: GroupUuid, name: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid),
            name: name.into(),
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            uuid: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for GroupReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.name)
    }
}

/// Outcome of a write to an internal group, as reported by the mutation path.
///
/// Used to evict exactly the cache entries the write made stale.
#[derive(Clone, Debug, Default)]
pub struct GroupUpdate {
    pub uuid: Option<GroupUuid>,
    pub id: Option<GroupId>,
    pub name: Option<String>,
    pub previous_name: Option<String>,
    pub added_members: Vec<AccountId>,
    pub removed_members: Vec<AccountId>,
    pub added_subgroups: Vec<GroupUuid>,
    pub removed_subgroups: Vec<GroupUuid>,
}

impl GroupUpdate {
    pub fn for_group(group: &InternalGroup) -> Self {
        Self {
            uuid: Some(group.uuid.clone()),
            id: Some(group.id),
            name: Some(group.name.clone()),
            ..Default::default()
        }
    }

    pub fn renamed_from(mut self, previous_name: impl Into<String>) -> Self {
        self.previous_name = Some(previous_name.into());
        self
    }

    pub fn with_added_members(mut self, members: impl IntoIterator<Item = AccountId>) -> Self {
        self.added_members.extend(members);
        self
    }

    pub fn with_removed_members(mut self, members: impl IntoIterator<Item = AccountId>) -> Self {
        self.removed_members.extend(members);
        self
    }

    pub fn with_added_subgroups(mut self, subgroups: impl IntoIterator<Item = GroupUuid>) -> Self {
        self.added_subgroups.extend(subgroups);
        self
    }

    pub fn with_removed_subgroups(
        mut self,
        subgroups: impl IntoIterator<Item = GroupUuid>,
    ) -> Self {
        self.removed_subgroups.extend(subgroups);
        self
    }
}
