// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::capability::{self, PermissionRule};
use crate::group::GroupReference;
use crate::membership::system;

/// Capabilities which receive a default grant for anonymous users when the site declares no
/// rule for them at all.
const DEFAULT_GRANTS: [&str; 1] = [capability::QUERY_LIMIT];

/// Rules of all server-wide capabilities, by capability name.
///
/// Deny and block rules are dropped while building the collection, except for email reviewers
/// where a deny is evaluated against the grants. The collection is immutable, a changed site
/// configuration builds a new one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityCollection {
    permissions: HashMap<String, Vec<PermissionRule>>,
}

impl CapabilityCollection {
    /// Build the collection from the declared capabilities and their rules, in declaration
    /// order.
    ///
    /// Ranges of ranged capabilities are clamped to the bounds of the capability.
    ///
    /// A non-empty `administrators` list replaces whatever was declared for administrating the
    /// server.
    pub fn new<I, R>(declared: I, administrators: Vec<GroupReference>) -> Self
    where
        I: IntoIterator<Item = (String, R)>,
        R: IntoIterator<Item = PermissionRule>,
    {
        let mut permissions: HashMap<String, Vec<PermissionRule>> = HashMap::new();
        let mut declared_names = HashSet::new();

        for (name, rules) in declared {
            if !capability::is_valid(&name) {
                warn!(%name, "rules declared for unknown capability");
            }
            for rule in rules {
                if rule.is_deny_or_block() && name != capability::EMAIL_REVIEWERS {
                    debug!(%name, %rule, "drop rule which is never evaluated");
                    continue;
                }
                let rule = match capability::range_defaults(&name) {
                    Some(defaults) if rule.range.clamp(&defaults.bounds) != rule.range => {
                        let range = rule.range.clamp(&defaults.bounds);
                        warn!(%name, %rule, bounds = %defaults.bounds, "clamp range of rule");
                        rule.with_range(range.min, range.max)
                    }
                    _ => rule,
                };
                permissions.entry(name.clone()).or_default().push(rule);
            }
            declared_names.insert(name);
        }

        for name in DEFAULT_GRANTS {
            if declared_names.contains(name) {
                continue;
            }
            if let Some(defaults) = capability::range_defaults(name) {
                let anonymous = GroupReference::new(system::anonymous_users(), "Anonymous Users");
                let rule = PermissionRule::allow(anonymous)
                    .with_range(defaults.default.min, defaults.default.max);
                permissions.insert(name.to_owned(), vec![rule]);
            }
        }

        if !administrators.is_empty() {
            permissions.insert(
                capability::ADMINISTRATE_SERVER.to_owned(),
                administrators.into_iter().map(PermissionRule::allow).collect(),
            );
        }

        Self { permissions }
    }

    /// Rules of the capability in declaration order, empty if none survived.
    pub fn rules(&self, name: &str) -> &[PermissionRule] {
        self.permissions
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Names of all capabilities with at least one rule.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.permissions.keys().map(String::as_str)
    }

    pub fn administrate_server(&self) -> &[PermissionRule] {
        self.rules(capability::ADMINISTRATE_SERVER)
    }

    pub fn batch_changes_limit(&self) -> &[PermissionRule] {
        self.rules(capability::BATCH_CHANGES_LIMIT)
    }

    pub fn email_reviewers(&self) -> &[PermissionRule] {
        self.rules(capability::EMAIL_REVIEWERS)
    }

    pub fn priority(&self) -> &[PermissionRule] {
        self.rules(capability::PRIORITY)
    }

    pub fn query_limit(&self) -> &[PermissionRule] {
        self.rules(capability::QUERY_LIMIT)
    }
}
