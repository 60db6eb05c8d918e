// SPDX-License-Identifier: MIT OR Apache-2.0

//! Membership resolution across all group backends.
//!
//! A principal's [`UniversalMembership`] routes every group identifier to the backend which
//! handles it and asks that backend's resolver. Resolvers of nested group systems continue
//! their search through the universal membership, so groups of one backend may include groups
//! of another.
use std::collections::HashSet;

use thiserror::Error;

use crate::identity::GroupUuid;
use crate::traits::{GroupMembership, MembershipResolver};

mod internal;
pub mod system;
#[cfg(test)]
mod tests;
mod universal;

pub use internal::{IncludingGroupMembership, InternalGroupBackend};
pub use system::SystemGroupBackend;
pub use universal::{UniversalGroupBackend, UniversalMembership};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MembershipError {
    /// No registered backend owns the identifier. This points at a misconfiguration (for example
    /// a rule naming a group of a backend which is not installed), not at a denied request.
    #[error("no group backend handles group {0}")]
    UnknownBackend(GroupUuid),
}

/// Resolver over a fixed set of groups.
#[derive(Clone, Debug, Default)]
pub struct ListGroupMembership {
    groups: HashSet<GroupUuid>,
}

impl ListGroupMembership {
    pub fn new(groups: impl IntoIterator<Item = GroupUuid>) -> Self {
        Self {
            groups: groups.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl MembershipResolver for ListGroupMembership {
    fn contains_any_of(
        &self,
        ids: &[GroupUuid],
        _effective: &dyn GroupMembership,
    ) -> Result<bool, MembershipError> {
        Ok(ids.iter().any(|id| self.groups.contains(id)))
    }

    fn intersection(
        &self,
        ids: &[GroupUuid],
        _effective: &dyn GroupMembership,
    ) -> Result<HashSet<GroupUuid>, MembershipError> {
        Ok(ids
            .iter()
            .filter(|id| self.groups.contains(*id))
            .cloned()
            .collect())
    }

    fn known_groups(&self, _effective: &dyn GroupMembership) -> HashSet<GroupUuid> {
        self.groups.clone()
    }
}
