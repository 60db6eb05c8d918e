// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use crate::capability::CapabilityControl;
use crate::group::GroupDescription;
use crate::membership::MembershipError;

/// What one principal may do with one group.
pub struct GroupControl {
    group: GroupDescription,
    capabilities: Arc<CapabilityControl>,
}

impl GroupControl {
    pub fn new(group: GroupDescription, capabilities: Arc<CapabilityControl>) -> Self {
        Self {
            group,
            capabilities,
        }
    }

    pub fn group(&self) -> &GroupDescription {
        &self.group
    }

    /// The principal is a member of the owner group, or administrates the server.
    pub fn is_owner(&self) -> Result<bool, MembershipError> {
        if let Some(owner) = &self.group.owner_group_uuid {
            if self.capabilities.membership().contains(owner)? {
                return Ok(true);
            }
        }
        self.capabilities.can_administrate_server()
    }

    /// The group and its members can be listed by the principal.
    pub fn is_visible(&self) -> Result<bool, MembershipError> {
        Ok(self.group.visible_to_all
            || self.capabilities.membership().contains(&self.group.uuid)?
            || self.is_owner()?)
    }
}
