// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;

use crate::group::InternalGroup;
use crate::identity::{AccountId, GroupId, GroupUuid};

/// Read-only accessor for the persistent store of internal groups.
///
/// The store itself lives outside of this crate. Every method may block on I/O; callers reach it
/// only through the group caches which memoize the answers.
pub trait GroupStore: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    /// Get a group by its internal numeric id.
    fn group_by_id(&self, id: GroupId) -> Result<Option<InternalGroup>, Self::Error>;

    /// Get a group by its (unique) display name.
    fn group_by_name(&self, name: &str) -> Result<Option<InternalGroup>, Self::Error>;

    /// Get a group by its stable identifier.
    fn group_by_uuid(&self, uuid: &GroupUuid) -> Result<Option<InternalGroup>, Self::Error>;

    /// All internal groups which have the given account as a direct member.
    fn groups_with_member(&self, account: AccountId) -> Result<Vec<GroupUuid>, Self::Error>;

    /// Direct subgroups of the given group.
    fn subgroups_of(&self, uuid: &GroupUuid) -> Result<Vec<GroupUuid>, Self::Error>;

    /// All internal groups which include the given group as a direct subgroup.
    fn parent_groups_of(&self, uuid: &GroupUuid) -> Result<Vec<GroupUuid>, Self::Error>;

    /// Every non-internal group which is included as a subgroup by some internal group.
    fn external_groups(&self) -> Result<Vec<GroupUuid>, Self::Error>;
}
