// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memoizing caches over the group store.
//!
//! Entries are created on first query and live until they are evicted explicitly or reclaimed
//! by the least-recently-used policy. Eviction is advisory: mutation paths call the `evict*`
//! hooks after their write succeeded, and a short window in which a cached answer is stale is
//! expected. Nothing here is transactionally coupled to the store.
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::group::{GroupUpdate, InternalGroup};
use crate::traits::GroupStore;

mod group_cache;
mod include_cache;

pub use group_cache::GroupCache;
pub use include_cache::GroupIncludeCache;

/// Default number of entries held per cached relation.
pub const DEFAULT_CAPACITY: usize = 1024;

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Bounded cache which loads missing values on demand.
///
/// Every key owns a slot guarded by its own lock. Concurrent callers asking for the same missing
/// key wait on the slot while the first one loads, so the loader runs at most once per key at a
/// time. Slots with a load in flight are also kept outside the LRU until the load finished, a
/// slot reclaimed under capacity pressure is still found by later callers. Failed loads are not
/// cached.
///
/// Lock order is `entries` before `loading`.
pub struct LoadingCache<K, V>
where
    K: Hash + Eq,
{
    name: &'static str,
    entries: Mutex<LruCache<K, Slot<V>>>,
    loading: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> LoadingCache<K, V>
where
    K: Clone + Debug + Hash + Eq,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            loading: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, calling `load` on a miss.
    pub fn get_or_load<E, F>(&self, key: &K, load: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        let slot = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(slot) => slot.clone(),
                None => {
                    let mut loading = self.loading.lock();
                    let slot = loading
                        .entry(key.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(None)))
                        .clone();
                    entries.put(key.clone(), slot.clone());
                    slot
                }
            }
        };

        let mut value = slot.lock();
        if let Some(value) = value.as_ref() {
            trace!(cache = self.name, ?key, "hit");
            return Ok(value.clone());
        }

        debug!(cache = self.name, ?key, "load");
        let result = load(key);
        if let Ok(loaded) = &result {
            *value = Some(loaded.clone());
        }
        drop(value);

        let mut entries = self.entries.lock();
        if result.is_err()
            && entries
                .peek(key)
                .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            // Forget the empty slot unless it was already evicted or replaced.
            entries.pop(key);
        }
        let mut loading = self.loading.lock();
        if loading
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            loading.remove(key);
        }
        result
    }

    /// Return the value for `key` if it is loaded, without loading or waiting for a load.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        let slot = entries.peek(key)?;
        slot.try_lock().and_then(|value| value.clone())
    }

    /// Drop the entry for `key`.
    ///
    /// A load already in flight for this key finishes for its waiting callers, but its result is
    /// not visible to later callers.
    pub fn evict(&self, key: &K) {
        let mut entries = self.entries.lock();
        let evicted = entries.pop(key).is_some();
        self.loading.lock().remove(key);
        if evicted {
            debug!(cache = self.name, ?key, "evict");
        }
    }

    pub fn evict_all(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.loading.lock().clear();
        debug!(cache = self.name, "evict all");
    }

    /// Number of entries, including ones with a load in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Both group caches, with the eviction sequences of the group lifecycle.
pub struct GroupCaches<S> {
    pub groups: Arc<GroupCache<S>>,
    pub includes: Arc<GroupIncludeCache<S>>,
}

impl<S> Clone for GroupCaches<S> {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
            includes: self.includes.clone(),
        }
    }
}

impl<S> GroupCaches<S>
where
    S: GroupStore,
{
    pub fn new(store: Arc<S>, group_capacity: usize, include_capacity: usize) -> Self {
        Self {
            groups: Arc::new(GroupCache::new(store.clone(), group_capacity)),
            includes: Arc::new(GroupIncludeCache::new(store, include_capacity)),
        }
    }

    /// Evict after a group was created.
    pub fn evict_on_group_created(&self, group: &InternalGroup) {
        debug!(uuid = %group.uuid, "evict caches on creation of group");
        self.groups.evict_group(group);
        for member in &group.members {
            self.includes.evict_groups_with_member(*member);
        }
        for subgroup in &group.subgroups {
            self.includes.evict_parent_groups_of(subgroup);
        }
    }

    /// Evict after a group was renamed or its members or subgroups changed.
    pub fn evict_on_group_updated(&self, update: &GroupUpdate) {
        debug!(uuid = ?update.uuid, "evict caches on update of group");
        if let Some(uuid) = &update.uuid {
            self.groups.evict_by_uuid(uuid);
        }
        if let Some(id) = update.id {
            self.groups.evict(id);
        }
        if let Some(name) = &update.name {
            self.groups.evict_by_name(name);
        }
        if let Some(previous_name) = &update.previous_name {
            self.groups.evict_by_name(previous_name);
        }

        for member in update.added_members.iter().chain(&update.removed_members) {
            self.includes.evict_groups_with_member(*member);
        }

        let subgroups_changed =
            !update.added_subgroups.is_empty() || !update.removed_subgroups.is_empty();
        for subgroup in update.added_subgroups.iter().chain(&update.removed_subgroups) {
            self.includes.evict_parent_groups_of(subgroup);
        }
        if subgroups_changed {
            if let Some(uuid) = &update.uuid {
                self.includes.evict_subgroups_of(uuid);
            }
        }
    }

    /// Evict after a group was deleted.
    pub fn evict_on_group_deleted(&self, group: &InternalGroup) {
        debug!(uuid = %group.uuid, "evict caches on deletion of group");
        self.evict_on_group_created(group);
        self.includes.evict_subgroups_of(&group.uuid);
        self.includes.evict_parent_groups_of(&group.uuid);
    }
}
