// SPDX-License-Identifier: MIT OR Apache-2.0

//! Which accounts a principal may see.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::capability::PermissionRule;
use crate::config::ConfigError;

mod control;

pub use control::AccountControl;

/// Site-wide policy deciding which other accounts a principal can see.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccountVisibility {
    /// Every account is visible.
    #[default]
    All,

    /// Accounts sharing at least one non-system group are visible.
    SameGroup,

    /// Accounts in at least one group visible to the principal are visible.
    VisibleGroup,

    /// Only the principal's own account is visible.
    None,
}

impl AccountVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountVisibility::All => "ALL",
            AccountVisibility::SameGroup => "SAME_GROUP",
            AccountVisibility::VisibleGroup => "VISIBLE_GROUP",
            AccountVisibility::None => "NONE",
        }
    }
}

impl fmt::Display for AccountVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountVisibility {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            AccountVisibility::All,
            AccountVisibility::SameGroup,
            AccountVisibility::VisibleGroup,
            AccountVisibility::None,
        ]
        .into_iter()
        .find(|visibility| visibility.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| ConfigError::UnknownAccountVisibility(value.to_owned()))
    }
}

impl TryFrom<String> for AccountVisibility {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountVisibility> for String {
    fn from(value: AccountVisibility) -> Self {
        value.as_str().to_owned()
    }
}

/// Account visibility settings of the site.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountPolicy {
    pub visibility: AccountVisibility,

    /// Rules for comparing groups under [`AccountVisibility::SameGroup`]. Groups of deny and
    /// block rules are not considered shared.
    pub same_group_visibility: Vec<PermissionRule>,
}

impl AccountPolicy {
    pub fn new(visibility: AccountVisibility) -> Self {
        Self {
            visibility,
            same_group_visibility: Vec::new(),
        }
    }

    pub fn with_same_group_rules(mut self, rules: impl IntoIterator<Item = PermissionRule>) -> Self {
        self.same_group_visibility.extend(rules);
        self
    }
}
