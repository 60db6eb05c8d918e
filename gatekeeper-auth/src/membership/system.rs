// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in groups whose membership follows from the kind of principal alone.
use crate::group::{GroupDescription, GroupReference};
use crate::identity::{GroupUuid, Principal};
use crate::membership::ListGroupMembership;
use crate::traits::{GroupBackend, MembershipResolver};

/// Every principal, authenticated or not.
pub const ANONYMOUS_USERS: &str = "Anonymous-Users";

/// Every authenticated principal.
pub const REGISTERED_USERS: &str = "Registered-Users";

/// Owners of the project a permission is evaluated in. Never matches at server scope.
pub const PROJECT_OWNERS: &str = "Project-Owners";

/// Owner of the change a permission is evaluated for. Never matches at server scope.
pub const CHANGE_OWNER: &str = "Change-Owner";

const SYSTEM_GROUPS: [(&str, &str); 4] = [
    (ANONYMOUS_USERS, "Anonymous Users"),
    (REGISTERED_USERS, "Registered Users"),
    (PROJECT_OWNERS, "Project Owners"),
    (CHANGE_OWNER, "Change Owner"),
];

pub fn anonymous_users() -> GroupUuid {
    GroupUuid::system(ANONYMOUS_USERS)
}

pub fn registered_users() -> GroupUuid {
    GroupUuid::system(REGISTERED_USERS)
}

pub fn project_owners() -> GroupUuid {
    GroupUuid::system(PROJECT_OWNERS)
}

pub fn change_owner() -> GroupUuid {
    GroupUuid::system(CHANGE_OWNER)
}

pub fn is_system_group(uuid: &GroupUuid) -> bool {
    uuid.is_system()
}

pub fn is_anonymous_or_registered(uuid: &GroupUuid) -> bool {
    *uuid == anonymous_users() || *uuid == registered_users()
}

/// Resolve a system group by its display name, as used in permission rules.
pub fn reference_by_name(name: &str) -> Option<GroupReference> {
    SYSTEM_GROUPS
        .iter()
        .find(|(_, display_name)| display_name.eq_ignore_ascii_case(name))
        .map(|(id, display_name)| GroupReference::new(GroupUuid::system(id), *display_name))
}

/// Backend owning the `global:` id space.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemGroupBackend;

impl GroupBackend for SystemGroupBackend {
    fn name(&self) -> &'static str {
        "system"
    }

    fn handles(&self, uuid: &GroupUuid) -> bool {
        uuid.is_system()
    }

    fn get(&self, uuid: &GroupUuid) -> Option<GroupDescription> {
        SYSTEM_GROUPS
            .iter()
            .find(|(id, _)| GroupUuid::system(id) == *uuid)
            .map(|(_, display_name)| GroupDescription {
                uuid: uuid.clone(),
                name: display_name.to_string(),
                owner_group_uuid: None,
                visible_to_all: true,
            })
    }

    fn membership_for(&self, principal: &Principal) -> Box<dyn MembershipResolver> {
        let groups = match principal {
            Principal::Anonymous => vec![anonymous_users()],
            Principal::Identified(_) => vec![anonymous_users(), registered_users()],
        };
        Box::new(ListGroupMembership::new(groups))
    }
}
