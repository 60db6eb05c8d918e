// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::group::InternalGroup;
use crate::identity::{AccountId, GroupId, GroupUuid};
use crate::traits::GroupStore;

#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("group store is unavailable")]
    Unavailable,
}

#[derive(Debug, Default)]
struct StoreState {
    last_id: u32,
    groups: BTreeMap<GroupUuid, InternalGroup>,
}

/// In-memory group store with read counters and failure injection.
///
/// Mutations only change the store. Tests call the cache eviction hooks themselves, the same way
/// mutation paths of the service do.
#[derive(Debug, Default)]
pub struct MemoryGroupStore {
    state: RwLock<StoreState>,
    failing: AtomicBool,
    reads: Mutex<HashMap<&'static str, usize>>,
}

impl MemoryGroupStore {
    pub fn create_group(&self, name: &str) -> InternalGroup {
        let mut state = self.state.write();
        state.last_id += 1;
        let id = GroupId(state.last_id);
        let uuid = GroupUuid::make(name, &format!("creator-{id}"));
        let group = InternalGroup::new(id, uuid.clone(), name);
        state.groups.insert(uuid, group.clone());
        group
    }

    pub fn group(&self, uuid: &GroupUuid) -> Option<InternalGroup> {
        self.state.read().groups.get(uuid).cloned()
    }

    pub fn add_member(&self, group: &GroupUuid, account: AccountId) -> InternalGroup {
        self.update(group, |group| {
            group.members.insert(account);
        })
    }

    pub fn remove_member(&self, group: &GroupUuid, account: AccountId) -> InternalGroup {
        self.update(group, |group| {
            group.members.remove(&account);
        })
    }

    pub fn add_subgroup(&self, group: &GroupUuid, subgroup: &GroupUuid) -> InternalGroup {
        self.update(group, |group| {
            group.subgroups.insert(subgroup.clone());
        })
    }

    pub fn remove_subgroup(&self, group: &GroupUuid, subgroup: &GroupUuid) -> InternalGroup {
        self.update(group, |group| {
            group.subgroups.remove(subgroup);
        })
    }

    pub fn rename_group(&self, group: &GroupUuid, name: &str) -> InternalGroup {
        self.update(group, |group| group.name = name.to_owned())
    }

    pub fn set_visible_to_all(&self, group: &GroupUuid, visible: bool) -> InternalGroup {
        self.update(group, |group| group.visible_to_all = visible)
    }

    pub fn set_owner(&self, group: &GroupUuid, owner: &GroupUuid) -> InternalGroup {
        self.update(group, |group| group.owner_group_uuid = Some(owner.clone()))
    }

    pub fn delete_group(&self, group: &GroupUuid) -> Option<InternalGroup> {
        self.state.write().groups.remove(group)
    }

    /// Let every following read fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of reads issued through the given store method.
    pub fn reads(&self, method: &str) -> usize {
        self.reads.lock().get(method).copied().unwrap_or_default()
    }

    fn update(&self, uuid: &GroupUuid, change: impl FnOnce(&mut InternalGroup)) -> InternalGroup {
        let mut state = self.state.write();
        let group = state
            .groups
            .get_mut(uuid)
            .unwrap_or_else(|| panic!("unknown test group {uuid}"));
        change(group);
        group.clone()
    }

    fn read(&self, method: &'static str) -> Result<(), MemoryStoreError> {
        *self.reads.lock().entry(method).or_default() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(MemoryStoreError::Unavailable);
        }
        Ok(())
    }
}

impl GroupStore for MemoryGroupStore {
    type Error = MemoryStoreError;

    fn group_by_id(&self, id: GroupId) -> Result<Option<InternalGroup>, Self::Error> {
        self.read("group_by_id")?;
        Ok(self
            .state
            .read()
            .groups
            .values()
            .find(|group| group.id == id)
            .cloned())
    }

    fn group_by_name(&self, name: &str) -> Result<Option<InternalGroup>, Self::Error> {
        self.read("group_by_name")?;
        Ok(self
            .state
            .read()
            .groups
            .values()
            .find(|group| group.name == name)
            .cloned())
    }

    fn group_by_uuid(&self, uuid: &GroupUuid) -> Result<Option<InternalGroup>, Self::Error> {
        self.read("group_by_uuid")?;
        Ok(self.state.read().groups.get(uuid).cloned())
    }

    fn groups_with_member(&self, account: AccountId) -> Result<Vec<GroupUuid>, Self::Error> {
        self.read("groups_with_member")?;
        Ok(self
            .state
            .read()
            .groups
            .values()
            .filter(|group| group.has_member(account))
            .map(|group| group.uuid.clone())
            .collect())
    }

    fn subgroups_of(&self, uuid: &GroupUuid) -> Result<Vec<GroupUuid>, Self::Error> {
        self.read("subgroups_of")?;
        Ok(self
            .state
            .read()
            .groups
            .get(uuid)
            .map(|group| group.subgroups.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn parent_groups_of(&self, uuid: &GroupUuid) -> Result<Vec<GroupUuid>, Self::Error> {
        self.read("parent_groups_of")?;
        Ok(self
            .state
            .read()
            .groups
            .values()
            .filter(|group| group.subgroups.contains(uuid))
            .map(|group| group.uuid.clone())
            .collect())
    }

    fn external_groups(&self) -> Result<Vec<GroupUuid>, Self::Error> {
        self.read("external_groups")?;
        let mut external: Vec<GroupUuid> = self
            .state
            .read()
            .groups
            .values()
            .flat_map(|group| group.subgroups.iter())
            .filter(|uuid| !uuid.is_internal())
            .cloned()
            .collect();
        external.sort();
        external.dedup();
        Ok(external)
    }
}
