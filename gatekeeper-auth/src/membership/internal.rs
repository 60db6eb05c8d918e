// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet, VecDeque};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cache::GroupCaches;
use crate::group::GroupDescription;
use crate::identity::{AccountId, GroupUuid, Principal};
use crate::membership::{ListGroupMembership, MembershipError};
use crate::traits::{GroupBackend, GroupMembership, GroupStore, MembershipResolver};

/// Backend for the groups managed by this service, identified by their 40-character hex UUID.
pub struct InternalGroupBackend<S> {
    caches: GroupCaches<S>,
}

impl<S> InternalGroupBackend<S>
where
    S: GroupStore,
{
    pub fn new(caches: GroupCaches<S>) -> Self {
        Self { caches }
    }
}

impl<S> GroupBackend for InternalGroupBackend<S>
where
    S: GroupStore + 'static,
{
    fn name(&self) -> &'static str {
        "internal"
    }

    fn handles(&self, uuid: &GroupUuid) -> bool {
        uuid.is_internal()
    }

    fn get(&self, uuid: &GroupUuid) -> Option<GroupDescription> {
        self.caches
            .groups
            .get_by_uuid(uuid)
            .map(|group| group.description())
    }

    fn membership_for(&self, principal: &Principal) -> Box<dyn MembershipResolver> {
        match principal {
            // Anonymous callers are never members of internal groups.
            Principal::Anonymous => Box::new(ListGroupMembership::empty()),
            Principal::Identified(account) => {
                Box::new(IncludingGroupMembership::new(*account, self.caches.clone()))
            }
        }
    }
}

/// Membership of one account in internal groups, following subgroup inclusion.
///
/// Answers are memoized for the lifetime of the instance. Only definitive answers are kept: a
/// group is remembered as "not a member" only after its whole subgroup closure was searched
/// without a hit. The memoization state sits behind short-lived locks which are never held while
/// calling into caches or other backends, so one instance can be shared by threads working on
/// the same request.
///
/// Other backends may nest internal groups and ask the effective membership about them while an
/// internal search is waiting for their answer. A search re-entered this way for a root it is
/// still working on answers "not a member" without recursing, and the outermost search settles
/// the answer.
pub struct IncludingGroupMembership<S> {
    account: AccountId,
    caches: GroupCaches<S>,
    member_of: Mutex<HashMap<GroupUuid, bool>>,
    searching: Mutex<HashMap<ThreadId, SearchStack>>,
    known_groups: Mutex<Option<HashSet<GroupUuid>>>,
}

/// Roots of the searches in progress on one thread, outermost first.
#[derive(Default)]
struct SearchStack {
    roots: Vec<GroupUuid>,
    /// A re-entered search answered "not a member" for a root still in progress, so negative
    /// answers of inner searches are not definitive.
    provisional: bool,
}

impl<S> IncludingGroupMembership<S>
where
    S: GroupStore,
{
    pub fn new(account: AccountId, caches: GroupCaches<S>) -> Self {
        Self {
            account,
            caches,
            member_of: Mutex::new(HashMap::new()),
            searching: Mutex::new(HashMap::new()),
            known_groups: Mutex::new(None),
        }
    }

    fn memoized(&self, id: &GroupUuid) -> Option<bool> {
        self.member_of.lock().get(id).copied()
    }

    fn memoize(&self, ids: impl IntoIterator<Item = GroupUuid>, is_member: bool) {
        let mut member_of = self.member_of.lock();
        for id in ids {
            member_of.insert(id, is_member);
        }
    }

    /// Search the subgroup closure of `root` for a direct membership of the account.
    fn search(
        &self,
        root: &GroupUuid,
        effective: &dyn GroupMembership,
    ) -> Result<bool, MembershipError> {
        let thread = thread::current().id();
        {
            let mut searching = self.searching.lock();
            let stack = searching.entry(thread).or_default();
            if stack.roots.contains(root) {
                trace!(%root, "cut re-entered search");
                stack.provisional = true;
                return Ok(false);
            }
            stack.roots.push(root.clone());
        }

        let result = self.search_closure(root, effective);

        let definitive = {
            let mut searching = self.searching.lock();
            match searching.get_mut(&thread) {
                Some(stack) => {
                    stack.roots.pop();
                    if stack.roots.is_empty() {
                        searching.remove(&thread);
                        true
                    } else {
                        !stack.provisional
                    }
                }
                None => true,
            }
        };

        match result? {
            None => Ok(true),
            Some(visited) => {
                // Nothing in the closure matched, so every visited group is a definitive "no"
                // unless an answer for an enclosing search was assumed on the way.
                if definitive {
                    self.memoize(visited, false);
                }
                Ok(false)
            }
        }
    }

    /// Walk the internal subgroups of `root` breadth-first with a visited set, so cycles in the
    /// inclusion graph are inert. Subgroups of other backends are collected and handed to the
    /// `effective` membership once the internal part of the closure is exhausted.
    ///
    /// Returns `None` on a hit, otherwise the visited groups.
    fn search_closure(
        &self,
        root: &GroupUuid,
        effective: &dyn GroupMembership,
    ) -> Result<Option<HashSet<GroupUuid>>, MembershipError> {
        let direct = self.caches.includes.groups_with_member(self.account);
        let mut visited: HashSet<GroupUuid> = HashSet::from([root.clone()]);
        let mut included_by: HashMap<GroupUuid, GroupUuid> = HashMap::new();
        let mut foreign: Vec<GroupUuid> = Vec::new();
        let mut queue: VecDeque<GroupUuid> = VecDeque::from([root.clone()]);

        while let Some(id) = queue.pop_front() {
            match self.memoized(&id) {
                Some(true) => {
                    self.memoize(path_to_root(&id, &included_by), true);
                    return Ok(None);
                }
                // Proven earlier, including its whole closure.
                Some(false) => continue,
                None => (),
            }

            if self.caches.groups.get_by_uuid(&id).is_none() {
                // Deleted since the edge pointing to it was read.
                trace!(%id, "skip missing group");
                continue;
            }

            if direct.contains(&id) {
                self.memoize(path_to_root(&id, &included_by), true);
                return Ok(None);
            }

            for subgroup in self.caches.includes.subgroups_of(&id).iter() {
                if !subgroup.is_internal() {
                    if !foreign.contains(subgroup) {
                        foreign.push(subgroup.clone());
                    }
                    continue;
                }
                if visited.insert(subgroup.clone()) {
                    included_by.insert(subgroup.clone(), id.clone());
                    queue.push_back(subgroup.clone());
                }
            }
        }

        if !foreign.is_empty() && effective.contains_any_of(&foreign)? {
            self.memoize([root.clone()], true);
            return Ok(None);
        }

        Ok(Some(visited))
    }

    fn compute_known_groups(&self, effective: &dyn GroupMembership) -> HashSet<GroupUuid> {
        let direct = self.caches.includes.groups_with_member(self.account);
        self.memoize(direct.iter().cloned(), true);

        let mut known: HashSet<GroupUuid> = direct.iter().cloned().collect();
        let mut queue: VecDeque<GroupUuid> = known.iter().cloned().collect();

        // External groups the account belongs to can be included by internal groups.
        for external in self.caches.includes.all_external_groups().iter() {
            match effective.contains(external) {
                Ok(true) => {
                    if known.insert(external.clone()) {
                        queue.push_back(external.clone());
                    }
                }
                Ok(false) => (),
                Err(err) => {
                    warn!(%external, %err, "ignore included group without backend");
                }
            }
        }

        while let Some(id) = queue.pop_front() {
            for parent in self.caches.includes.parent_groups_of(&id).iter() {
                if known.insert(parent.clone()) {
                    self.memoize([parent.clone()], true);
                    queue.push_back(parent.clone());
                }
            }
        }

        debug!(account = %self.account, count = known.len(), "computed known groups");
        known
    }
}

/// Groups on the inclusion path from `id` back to the root of a search.
fn path_to_root(id: &GroupUuid, included_by: &HashMap<GroupUuid, GroupUuid>) -> Vec<GroupUuid> {
    let mut path = vec![id.clone()];
    let mut current = id;
    while let Some(parent) = included_by.get(current) {
        path.push(parent.clone());
        current = parent;
    }
    path
}

impl<S> MembershipResolver for IncludingGroupMembership<S>
where
    S: GroupStore,
{
    fn contains_any_of(
        &self,
        ids: &[GroupUuid],
        effective: &dyn GroupMembership,
    ) -> Result<bool, MembershipError> {
        // Prefer memoized answers over expanding includes.
        let mut unknown = Vec::new();
        {
            let member_of = self.member_of.lock();
            for id in ids {
                match member_of.get(id) {
                    Some(true) => return Ok(true),
                    Some(false) => (),
                    None => unknown.push(id),
                }
            }
        }

        for id in unknown {
            if self.search(id, effective)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn known_groups(&self, effective: &dyn GroupMembership) -> HashSet<GroupUuid> {
        if let Some(known) = self.known_groups.lock().as_ref() {
            return known.clone();
        }

        let known = self.compute_known_groups(effective);
        let mut cached = self.known_groups.lock();
        cached.get_or_insert(known).clone()
    }
}
