// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::cache::LoadingCache;
use crate::identity::{AccountId, GroupUuid};
use crate::traits::GroupStore;

type GroupSet = Arc<HashSet<GroupUuid>>;

/// Derived membership relations between accounts and groups.
///
/// Four relations are cached independently because different writes make them stale:
///
/// - groups an account is a direct member of: evict with `evict_groups_with_member`
///   whenever the account is added to or removed from a group
/// - direct subgroups of a group: evict with `evict_subgroups_of` when the group's subgroups
///   change
/// - direct parents of a group: evict with `evict_parent_groups_of` when the group is included
///   into or removed from another group
/// - all external groups included anywhere: evicted together with the parents of any
///   non-internal group
///
/// A failing store read is logged and answered with an empty set, which is not cached.
pub struct GroupIncludeCache<S> {
    store: Arc<S>,
    groups_with_member: LoadingCache<AccountId, GroupSet>,
    subgroups: LoadingCache<GroupUuid, GroupSet>,
    parents: LoadingCache<GroupUuid, GroupSet>,
    external: LoadingCache<(), GroupSet>,
}

impl<S> GroupIncludeCache<S>
where
    S: GroupStore,
{
    pub fn new(store: Arc<S>, capacity: usize) -> Self {
        Self {
            store,
            groups_with_member: LoadingCache::new("groups_with_member", capacity),
            subgroups: LoadingCache::new("subgroups", capacity),
            parents: LoadingCache::new("parent_groups", capacity),
            external: LoadingCache::new("external_groups", 1),
        }
    }

    /// Groups which have the account as a direct member.
    pub fn groups_with_member(&self, account: AccountId) -> GroupSet {
        self.groups_with_member
            .get_or_load(&account, |account| {
                self.store
                    .groups_with_member(*account)
                    .map(|groups| Arc::new(groups.into_iter().collect()))
            })
            .unwrap_or_else(|err| {
                warn!(%account, %err, "cannot load groups with member");
                GroupSet::default()
            })
    }

    /// Direct subgroups of the group.
    pub fn subgroups_of(&self, uuid: &GroupUuid) -> GroupSet {
        self.subgroups
            .get_or_load(uuid, |uuid| {
                self.store
                    .subgroups_of(uuid)
                    .map(|groups| Arc::new(groups.into_iter().collect()))
            })
            .unwrap_or_else(|err| {
                warn!(%uuid, %err, "cannot load subgroups");
                GroupSet::default()
            })
    }

    /// Groups which include the group as a direct subgroup.
    pub fn parent_groups_of(&self, uuid: &GroupUuid) -> GroupSet {
        self.parents
            .get_or_load(uuid, |uuid| {
                self.store
                    .parent_groups_of(uuid)
                    .map(|groups| Arc::new(groups.into_iter().collect()))
            })
            .unwrap_or_else(|err| {
                warn!(%uuid, %err, "cannot load parent groups");
                GroupSet::default()
            })
    }

    /// Every external group included as a subgroup by some internal group.
    pub fn all_external_groups(&self) -> GroupSet {
        self.external
            .get_or_load(&(), |_| {
                self.store
                    .external_groups()
                    .map(|groups| Arc::new(groups.into_iter().collect()))
            })
            .unwrap_or_else(|err| {
                warn!(%err, "cannot load external groups");
                GroupSet::default()
            })
    }

    pub fn evict_groups_with_member(&self, account: AccountId) {
        self.groups_with_member.evict(&account);
    }

    pub fn evict_subgroups_of(&self, uuid: &GroupUuid) {
        self.subgroups.evict(uuid);
    }

    pub fn evict_parent_groups_of(&self, uuid: &GroupUuid) {
        self.parents.evict(uuid);
        if !uuid.is_internal() {
            self.evict_external_groups();
        }
    }

    pub fn evict_external_groups(&self) {
        self.external.evict(&());
    }
}
