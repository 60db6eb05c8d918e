// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use crate::group::GroupReference;

/// What a matching rule does to the capability it is declared for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RuleAction {
    /// Grant the capability.
    #[default]
    Allow,

    /// Withhold the capability. Only kept for email reviewers.
    Deny,

    /// Withhold the capability, overriding grants further down the hierarchy.
    Block,

    /// Run background work of the principal in the interactive queue.
    Interactive,

    /// Run background work of the principal in the batch queue.
    Batch,
}

impl RuleAction {
    fn prefix(&self) -> &'static str {
        match self {
            RuleAction::Allow => "",
            RuleAction::Deny => "deny ",
            RuleAction::Block => "block ",
            RuleAction::Interactive => "interactive ",
            RuleAction::Batch => "batch ",
        }
    }
}

/// Inclusive range of numbers a principal is granted for a ranged capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PermissionRange {
    pub min: i32,
    pub max: i32,
}

impl PermissionRange {
    /// Create a range, swapping the bounds if they are given in the wrong order.
    pub fn new(min: i32, max: i32) -> Self {
        if max < min {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    pub fn contains(&self, value: i32) -> bool {
        self.min <= value && value <= self.max
    }

    /// Range with the least restrictive bounds of both.
    pub fn union(&self, other: &PermissionRange) -> PermissionRange {
        PermissionRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Constrain this range to lie within `bounds`.
    pub fn clamp(&self, bounds: &PermissionRange) -> PermissionRange {
        PermissionRange::new(
            self.min.clamp(bounds.min, bounds.max),
            self.max.clamp(bounds.min, bounds.max),
        )
    }
}

impl Display for PermissionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}..{:+}", self.min, self.max)
    }
}

impl Default for PermissionRange {
    fn default() -> Self {
        Self { min: 0, max: 0 }
    }
}

/// One grant (or denial) of a capability to a group.
///
/// The textual form is the one used in configuration:
///
/// ```text
/// [deny |block |interactive |batch ][+force ][<min>..<max> ]group <Name>
/// ```
///
/// Parsing yields an unresolved group reference. Binding the name to an identifier is left to
/// the configuration, which knows the groups of the site.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PermissionRule {
    pub group: GroupReference,
    pub action: RuleAction,
    pub force: bool,
    pub range: PermissionRange,
}

impl PermissionRule {
    /// Rule granting the capability to `group`.
    pub fn allow(group: GroupReference) -> Self {
        Self {
            group,
            action: RuleAction::Allow,
            force: false,
            range: PermissionRange::default(),
        }
    }

    /// Rule denying the capability to `group`.
    pub fn deny(group: GroupReference) -> Self {
        Self::allow(group).with_action(RuleAction::Deny)
    }

    /// Rule blocking the capability for `group`.
    pub fn block(group: GroupReference) -> Self {
        Self::allow(group).with_action(RuleAction::Block)
    }

    /// Priority rule placing `group` into the interactive queue.
    pub fn interactive(group: GroupReference) -> Self {
        Self::allow(group).with_action(RuleAction::Interactive)
    }

    /// Priority rule placing `group` into the batch queue.
    pub fn batch(group: GroupReference) -> Self {
        Self::allow(group).with_action(RuleAction::Batch)
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_range(mut self, min: i32, max: i32) -> Self {
        self.range = PermissionRange::new(min, max);
        self
    }

    pub fn with_group(mut self, group: GroupReference) -> Self {
        self.group = group;
        self
    }

    pub fn min(&self) -> i32 {
        self.range.min
    }

    pub fn max(&self) -> i32 {
        self.range.max
    }

    pub fn is_allow(&self) -> bool {
        matches!(self.action, RuleAction::Allow)
    }

    /// Rule is a deny or a block.
    pub fn is_deny_or_block(&self) -> bool {
        matches!(self.action, RuleAction::Deny | RuleAction::Block)
    }
}

impl Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action.prefix())?;
        if self.force {
            write!(f, "+force ")?;
        }
        if self.range != PermissionRange::default() {
            write!(f, "{} ", self.range)?;
        }
        write!(f, "{}", self.group)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("invalid range in rule '{0}'")]
    InvalidRange(String),

    #[error("rule '{0}' must include a group")]
    MissingGroup(String),
}

impl FromStr for PermissionRule {
    type Err = RuleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut rest = value.trim();

        let mut action = RuleAction::Allow;
        for candidate in [
            RuleAction::Deny,
            RuleAction::Block,
            RuleAction::Interactive,
            RuleAction::Batch,
        ] {
            if let Some(stripped) = rest.strip_prefix(candidate.prefix()) {
                action = candidate;
                rest = stripped.trim_start();
                break;
            }
        }

        let force = match rest.strip_prefix("+force ") {
            Some(stripped) => {
                rest = stripped.trim_start();
                true
            }
            None => false,
        };

        let mut range = PermissionRange::default();
        if !rest.starts_with("group ") {
            let (token, remainder) = rest
                .split_once(' ')
                .ok_or_else(|| RuleParseError::MissingGroup(value.to_owned()))?;
            range = parse_range(token).ok_or_else(|| RuleParseError::InvalidRange(value.to_owned()))?;
            rest = remainder.trim_start();
        }

        let name = rest
            .strip_prefix("group ")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| RuleParseError::MissingGroup(value.to_owned()))?;

        Ok(PermissionRule {
            group: GroupReference::unresolved(name),
            action,
            force,
            range,
        })
    }
}

/// Parse `<min>..<max>` where both bounds are signed integers.
fn parse_range(token: &str) -> Option<PermissionRange> {
    let (min, max) = token.split_once("..")?;
    Some(PermissionRange::new(min.parse().ok()?, max.parse().ok()?))
}
