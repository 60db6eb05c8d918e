// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use crate::identity::GroupUuid;
use crate::membership::MembershipError;

/// Group memberships of one principal.
///
/// An instance is created per resolution request and answers from (and fills) its own
/// memoization state. It must never be shared between different principals.
pub trait GroupMembership: Send + Sync {
    /// Return `true` if the principal is a member of the given group, directly or through
    /// included subgroups.
    fn contains(&self, id: &GroupUuid) -> Result<bool, MembershipError> {
        self.contains_any_of(std::slice::from_ref(id))
    }

    /// Return `true` if the principal is a member of at least one of the given groups.
    ///
    /// Equivalent to OR-ing `contains` over all ids.
    fn contains_any_of(&self, ids: &[GroupUuid]) -> Result<bool, MembershipError>;

    /// Return the subset of the given groups the principal is a member of.
    fn intersection(&self, ids: &[GroupUuid]) -> Result<HashSet<GroupUuid>, MembershipError> {
        let mut result = HashSet::new();
        for id in ids {
            if self.contains(id)? {
                result.insert(id.clone());
            }
        }
        Ok(result)
    }

    /// Every group the principal is known to belong to, the full transitive closure over
    /// subgroup inclusion.
    fn known_groups(&self) -> HashSet<GroupUuid>;
}
