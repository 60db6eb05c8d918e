// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use crate::group::GroupDescription;
use crate::identity::{GroupUuid, Principal};
use crate::membership::MembershipError;
use crate::traits::GroupMembership;

/// A source of groups and group memberships.
///
/// Every backend owns a part of the group identifier space, decided by the shape of the
/// identifier alone.
pub trait GroupBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Return `true` if this backend owns the given group identifier.
    fn handles(&self, uuid: &GroupUuid) -> bool;

    /// Look up a group owned by this backend.
    fn get(&self, uuid: &GroupUuid) -> Option<GroupDescription>;

    /// Create a resolver answering membership questions for the given principal.
    fn membership_for(&self, principal: &Principal) -> Box<dyn MembershipResolver>;
}

/// Membership resolution of one backend for one principal.
///
/// Resolvers only see the ids their backend handles. Nested groups may include groups of other
/// backends, so every call receives the principal's `effective` membership across all backends
/// to continue the search with.
pub trait MembershipResolver: Send + Sync {
    /// Return `true` if the principal is a member of at least one of the given groups.
    fn contains_any_of(
        &self,
        ids: &[GroupUuid],
        effective: &dyn GroupMembership,
    ) -> Result<bool, MembershipError>;

    /// Return the subset of the given groups the principal is a member of.
    fn intersection(
        &self,
        ids: &[GroupUuid],
        effective: &dyn GroupMembership,
    ) -> Result<HashSet<GroupUuid>, MembershipError> {
        let mut result = HashSet::new();
        for id in ids {
            if self.contains_any_of(std::slice::from_ref(id), effective)? {
                result.insert(id.clone());
            }
        }
        Ok(result)
    }

    /// Every group of this backend the principal is known to belong to.
    fn known_groups(&self, effective: &dyn GroupMembership) -> HashSet<GroupUuid>;
}
