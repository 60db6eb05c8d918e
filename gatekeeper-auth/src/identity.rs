// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers for accounts, groups and the principals asking questions about them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Length of the hex-encoded SHA-1 digest identifying internal groups.
pub const INTERNAL_UUID_LEN: usize = 40;

/// Prefix of the id space owned by the built-in system groups.
pub const SYSTEM_GROUP_PREFIX: &str = "global:";

/// Numeric identifier of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal numeric identifier of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a group.
///
/// The shape of the identifier tells which backend owns the group: internal groups use a
/// 40-character lowercase hex digest, system groups use the `global:` prefix and external
/// backends define their own id space (for example `ldap:cn=devs`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupUuid(String);

impl GroupUuid {
    /// Wrap an identifier string.
    ///
    /// Any non-empty string without surrounding whitespace is accepted, the owning backend is
    /// decided later by its shape.
    pub fn new(value: impl Into<String>) -> Result<Self, GroupUuidError> {
        let value = value.into();
        if value.is_empty() {
            return Err(GroupUuidError::Empty);
        }
        if value.trim() != value {
            return Err(GroupUuidError::Whitespace(value));
        }
        Ok(Self(value))
    }

    /// Identifier of a built-in system group.
    pub(crate) fn system(name: &str) -> Self {
        Self(format!("{SYSTEM_GROUP_PREFIX}{name}"))
    }

    /// Derive a fresh internal identifier from the group name and its creator.
    pub fn make(name: &str, creator: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(b"group ");
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
        hasher.update(creator.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns `true` if this identifier has the shape of an internal group.
    pub fn is_internal(&self) -> bool {
        self.0.len() == INTERNAL_UUID_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Returns `true` if this identifier belongs to the built-in system groups.
    pub fn is_system(&self) -> bool {
        self.0.starts_with(SYSTEM_GROUP_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupUuid {
    type Err = GroupUuidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for GroupUuid {
    type Error = GroupUuidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupUuid> for String {
    fn from(value: GroupUuid) -> Self {
        value.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupUuidError {
    #[error("group uuid must not be empty")]
    Empty,

    #[error("group uuid '{0}' has surrounding whitespace")]
    Whitespace(String),
}

/// The authenticated identity membership and policy questions are asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Principal {
    /// A caller who did not authenticate.
    Anonymous,

    /// A caller authenticated as the given account.
    Identified(AccountId),
}

impl Principal {
    /// Account of an identified principal.
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            Principal::Anonymous => None,
            Principal::Identified(id) => Some(*id),
        }
    }

    pub fn is_identified(&self) -> bool {
        matches!(self, Principal::Identified(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Anonymous => write!(f, "anonymous"),
            Principal::Identified(id) => write!(f, "account {id}"),
        }
    }
}
