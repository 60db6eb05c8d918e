// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use tracing::warn;

use crate::cache::LoadingCache;
use crate::group::InternalGroup;
use crate::identity::{GroupId, GroupUuid};
use crate::traits::GroupStore;

/// Internal groups by id, name and UUID.
///
/// A group is cached separately under each key it was requested by, so a write to a group needs
/// to evict all three. A failing store read is logged and answered with "no such group".
pub struct GroupCache<S> {
    store: Arc<S>,
    by_id: LoadingCache<GroupId, Option<Arc<InternalGroup>>>,
    by_name: LoadingCache<String, Option<Arc<InternalGroup>>>,
    by_uuid: LoadingCache<GroupUuid, Option<Arc<InternalGroup>>>,
}

impl<S> GroupCache<S>
where
    S: GroupStore,
{
    pub fn new(store: Arc<S>, capacity: usize) -> Self {
        Self {
            store,
            by_id: LoadingCache::new("groups_by_id", capacity),
            by_name: LoadingCache::new("groups_by_name", capacity),
            by_uuid: LoadingCache::new("groups_by_uuid", capacity),
        }
    }

    pub fn get(&self, id: GroupId) -> Option<Arc<InternalGroup>> {
        self.by_id
            .get_or_load(&id, |id| {
                self.store
                    .group_by_id(*id)
                    .map(|group| group.map(Arc::new))
            })
            .unwrap_or_else(|err| {
                warn!(%id, %err, "cannot load group by id");
                None
            })
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<InternalGroup>> {
        self.by_name
            .get_or_load(&name.to_owned(), |name| {
                self.store
                    .group_by_name(name)
                    .map(|group| group.map(Arc::new))
            })
            .unwrap_or_else(|err| {
                warn!(name, %err, "cannot load group by name");
                None
            })
    }

    pub fn get_by_uuid(&self, uuid: &GroupUuid) -> Option<Arc<InternalGroup>> {
        self.by_uuid
            .get_or_load(uuid, |uuid| {
                self.store
                    .group_by_uuid(uuid)
                    .map(|group| group.map(Arc::new))
            })
            .unwrap_or_else(|err| {
                warn!(%uuid, %err, "cannot load group by uuid");
                None
            })
    }

    pub fn evict(&self, id: GroupId) {
        self.by_id.evict(&id);
    }

    pub fn evict_by_name(&self, name: &str) {
        self.by_name.evict(&name.to_owned());
    }

    pub fn evict_by_uuid(&self, uuid: &GroupUuid) {
        self.by_uuid.evict(uuid);
    }

    /// Evict the group under all three keys.
    pub fn evict_group(&self, group: &InternalGroup) {
        self.evict_by_uuid(&group.uuid);
        self.evict(group.id);
        self.evict_by_name(&group.name);
    }

    /// Evict the group with the given id under every key it may be cached by.
    ///
    /// Keys are taken from the cached copy and from the store, so a renamed group loses the
    /// entries of its old and its new name.
    pub fn evict_id(&self, id: GroupId) {
        let mut copies = Vec::new();
        if let Some(Some(group)) = self.by_id.get_if_present(&id) {
            copies.push(group);
        }
        match self.store.group_by_id(id) {
            Ok(Some(group)) => copies.push(Arc::new(group)),
            Ok(None) => (),
            Err(err) => warn!(%id, %err, "cannot read group to evict"),
        }

        self.evict(id);
        for group in copies {
            self.evict_by_name(&group.name);
            self.evict_by_uuid(&group.uuid);
        }
    }

    /// Evict after `group` was renamed from `previous_name`.
    ///
    /// Memberships are not affected by a rename.
    pub fn evict_rename(&self, group: &InternalGroup, previous_name: &str) {
        self.evict_by_name(previous_name);
        self.evict_by_name(&group.name);
        self.evict_by_uuid(&group.uuid);
        self.evict(group.id);
    }
}
