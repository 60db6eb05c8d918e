// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::account::{AccountPolicy, AccountVisibility};
use crate::capability::CapabilityControl;
use crate::group_control::GroupControl;
use crate::identity::{AccountId, GroupUuid, Principal};
use crate::membership::{MembershipError, UniversalGroupBackend, system};
use crate::traits::GroupMembership;

/// Visibility of other accounts to one principal.
pub struct AccountControl {
    principal: Principal,
    policy: Arc<AccountPolicy>,
    backends: UniversalGroupBackend,
    capabilities: Arc<CapabilityControl>,
}

impl AccountControl {
    /// Create the control of `principal`, whose membership and capabilities are evaluated by
    /// `capabilities`.
    pub fn new(
        principal: Principal,
        policy: Arc<AccountPolicy>,
        backends: UniversalGroupBackend,
        capabilities: Arc<CapabilityControl>,
    ) -> Self {
        Self {
            principal,
            policy,
            backends,
            capabilities,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The principal may see every account, whatever the policy says.
    pub fn can_see_all(&self) -> Result<bool, MembershipError> {
        self.capabilities.can_view_all_accounts()
    }

    /// Returns `true` if the principal may see the given account.
    pub fn can_see(&self, target: AccountId) -> Result<bool, MembershipError> {
        if self.principal.account_id() == Some(target)
            || self.policy.visibility == AccountVisibility::All
        {
            return Ok(true);
        }
        if self.can_see_all()? {
            return Ok(true);
        }

        let visible = match self.policy.visibility {
            AccountVisibility::All => true,
            AccountVisibility::SameGroup => self.share_group(target)?,
            AccountVisibility::VisibleGroup => self.in_visible_group(target)?,
            AccountVisibility::None => false,
        };
        trace!(
            principal = %self.principal,
            %target,
            visible,
            policy = %self.policy.visibility,
            "account visibility"
        );
        Ok(visible)
    }

    /// Non-system groups the account belongs to.
    fn groups_of(&self, account: AccountId) -> HashSet<GroupUuid> {
        self.backends
            .membership_for(&Principal::Identified(account))
            .known_groups()
            .into_iter()
            .filter(|uuid| !system::is_system_group(uuid))
            .collect()
    }

    fn share_group(&self, target: AccountId) -> Result<bool, MembershipError> {
        let mut groups = self.groups_of(target);
        for rule in &self.policy.same_group_visibility {
            if rule.is_deny_or_block() {
                if let Some(uuid) = &rule.group.uuid {
                    groups.remove(uuid);
                }
            }
        }
        if groups.is_empty() {
            return Ok(false);
        }

        let groups: Vec<GroupUuid> = groups.into_iter().collect();
        self.capabilities.membership().contains_any_of(&groups)
    }

    fn in_visible_group(&self, target: AccountId) -> Result<bool, MembershipError> {
        for uuid in self.groups_of(target) {
            let Some(group) = self.backends.get(&uuid)? else {
                // Deleted since the membership was resolved.
                continue;
            };
            if GroupControl::new(group, self.capabilities.clone()).is_visible()? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
