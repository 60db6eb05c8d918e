// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::capability::{self, CapabilityCollection, PermissionRange, PermissionRule, RuleAction};
use crate::identity::GroupUuid;
use crate::membership::{MembershipError, system};
use crate::traits::GroupMembership;

/// Queue the background work of a principal is scheduled in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QueueType {
    #[default]
    Interactive,
    Batch,
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueType::Interactive => write!(f, "interactive"),
            QueueType::Batch => write!(f, "batch"),
        }
    }
}

/// Server-wide capabilities of one principal.
///
/// The rules of a capability which match the principal's groups are computed once per control
/// and then reused. A control is meant to live as long as the request it answers for.
pub struct CapabilityControl {
    collection: Arc<CapabilityCollection>,
    membership: Arc<dyn GroupMembership>,
    matching: Mutex<HashMap<String, Arc<[PermissionRule]>>>,
}

impl CapabilityControl {
    pub fn new(collection: Arc<CapabilityCollection>, membership: Arc<dyn GroupMembership>) -> Self {
        Self {
            collection,
            membership,
            matching: Mutex::new(HashMap::new()),
        }
    }

    /// Group membership the rules are evaluated against.
    pub fn membership(&self) -> &Arc<dyn GroupMembership> {
        &self.membership
    }

    pub fn collection(&self) -> &CapabilityCollection {
        &self.collection
    }

    /// Rules of the capability whose group contains the principal, in declaration order.
    ///
    /// Rules naming an unresolved group never match. A rule naming a group no backend handles
    /// fails the whole evaluation.
    pub fn matching_rules(&self, name: &str) -> Result<Arc<[PermissionRule]>, MembershipError> {
        if let Some(rules) = self.matching.lock().get(name) {
            return Ok(rules.clone());
        }

        let rules = self.collection.rules(name);
        let ids: Vec<GroupUuid> = rules
            .iter()
            .filter_map(|rule| rule.group.uuid.clone())
            .collect();
        let groups = if ids.is_empty() {
            Default::default()
        } else {
            self.membership.intersection(&ids)?
        };
        let matching: Arc<[PermissionRule]> = rules
            .iter()
            .filter(|rule| rule.group.uuid.as_ref().is_some_and(|id| groups.contains(id)))
            .cloned()
            .collect();
        trace!(%name, count = matching.len(), "matching rules");

        Ok(self
            .matching
            .lock()
            .entry(name.to_owned())
            .or_insert(matching)
            .clone())
    }

    /// The principal has at least one matching rule of its own for the capability.
    fn has(&self, name: &str) -> Result<bool, MembershipError> {
        Ok(!self.matching_rules(name)?.is_empty())
    }

    pub fn can_administrate_server(&self) -> Result<bool, MembershipError> {
        self.has(capability::ADMINISTRATE_SERVER)
    }

    pub fn can_maintain_server(&self) -> Result<bool, MembershipError> {
        Ok(self.has(capability::MAINTAIN_SERVER)? || self.can_administrate_server()?)
    }

    /// Email reviewers is granted unless a deny matches, and any matching allow wins over a deny.
    pub fn can_email_reviewers(&self) -> Result<bool, MembershipError> {
        let matching = self.matching_rules(capability::EMAIL_REVIEWERS)?;
        let allowed = matching.iter().any(PermissionRule::is_allow);
        let denied = matching.iter().any(PermissionRule::is_deny_or_block);
        Ok(allowed || !denied)
    }

    pub fn can_view_all_accounts(&self) -> Result<bool, MembershipError> {
        self.can_perform(capability::VIEW_ALL_ACCOUNTS)
    }

    /// Returns `true` if the principal holds the capability, directly or implied by a broader
    /// one.
    pub fn can_perform(&self, name: &str) -> Result<bool, MembershipError> {
        let allowed = match name {
            capability::ADMINISTRATE_SERVER => self.can_administrate_server()?,
            capability::EMAIL_REVIEWERS => self.can_email_reviewers()?,
            capability::MAINTAIN_SERVER => self.can_maintain_server()?,
            capability::FLUSH_CACHES
            | capability::KILL_TASK
            | capability::RUN_GC
            | capability::VIEW_CACHES
            | capability::VIEW_QUEUE => self.has(name)? || self.can_maintain_server()?,
            // Never implied by administrating the server.
            capability::ACCESS_DATABASE
            | capability::RUN_AS
            | capability::PRIORITY
            | capability::QUERY_LIMIT
            | capability::BATCH_CHANGES_LIMIT => self.has(name)?,
            _ => self.has(name)? || self.can_administrate_server()?,
        };
        debug!(%name, allowed, "capability check");
        Ok(allowed)
    }

    /// Range granted for a ranged capability, `None` for all others.
    ///
    /// Matching rules are merged starting from `0..0`, widening to the smallest minimum and the
    /// largest maximum. Without a matching rule the capability's default range applies.
    pub fn get_range(&self, name: &str) -> Result<Option<PermissionRange>, MembershipError> {
        let Some(defaults) = capability::range_defaults(name) else {
            return Ok(None);
        };

        let matching = self.matching_rules(name)?;
        if matching.is_empty() {
            return Ok(Some(defaults.default));
        }

        let range = matching
            .iter()
            .fold(PermissionRange::default(), |range, rule| range.union(&rule.range));
        Ok(Some(range))
    }

    /// Queue for the principal's background work.
    ///
    /// An interactive rule for a specific group wins over everything else. Interactive rules for
    /// anonymous or registered users only count when no batch rule matches.
    pub fn get_queue_type(&self) -> Result<QueueType, MembershipError> {
        let mut batch = false;
        for rule in self.matching_rules(capability::PRIORITY)?.iter() {
            match rule.action {
                RuleAction::Interactive => {
                    let generic = rule
                        .group
                        .uuid
                        .as_ref()
                        .is_some_and(system::is_anonymous_or_registered);
                    if !generic {
                        return Ok(QueueType::Interactive);
                    }
                }
                RuleAction::Batch => batch = true,
                RuleAction::Allow | RuleAction::Deny | RuleAction::Block => (),
            }
        }

        if batch {
            Ok(QueueType::Batch)
        } else {
            Ok(QueueType::Interactive)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::capability::{CapabilityCollection, PermissionRange, PermissionRule};
    use crate::group::GroupReference;
    use crate::identity::GroupUuid;
    use crate::membership::{MembershipError, system};
    use crate::traits::GroupMembership;

    use super::{CapabilityControl, QueueType};

    /// Fixed membership, failing for identifiers starting with `unknown:`.
    struct Groups(HashSet<GroupUuid>);

    impl GroupMembership for Groups {
        fn contains_any_of(&self, ids: &[GroupUuid]) -> Result<bool, MembershipError> {
            for id in ids {
                if id.as_str().starts_with("unknown:") {
                    return Err(MembershipError::UnknownBackend(id.clone()));
                }
            }
            Ok(ids.iter().any(|id| self.0.contains(id)))
        }

        fn known_groups(&self) -> HashSet<GroupUuid> {
            self.0.clone()
        }
    }

    fn group(name: &str) -> GroupReference {
        GroupReference::new(GroupUuid::make(name, "test"), name)
    }

    fn anonymous() -> GroupReference {
        GroupReference::new(system::anonymous_users(), "Anonymous Users")
    }

    fn registered() -> GroupReference {
        GroupReference::new(system::registered_users(), "Registered Users")
    }

    fn control(
        declared: Vec<(&str, Vec<PermissionRule>)>,
        administrators: Vec<GroupReference>,
        member_of: &[GroupReference],
    ) -> CapabilityControl {
        let collection = CapabilityCollection::new(
            declared
                .into_iter()
                .map(|(name, rules)| (name.to_string(), rules)),
            administrators,
        );
        let mut groups: HashSet<GroupUuid> = member_of
            .iter()
            .filter_map(|group| group.uuid.clone())
            .collect();
        groups.insert(system::anonymous_users());
        CapabilityControl::new(Arc::new(collection), Arc::new(Groups(groups)))
    }

    #[test]
    fn single_allow_rule() {
        let declared = || vec![("createProject", vec![PermissionRule::allow(group("Developers"))])];

        let member = control(declared(), vec![], &[group("Developers")]);
        assert!(member.can_perform("createProject").unwrap());

        let other = control(declared(), vec![], &[group("Testers")]);
        assert!(!other.can_perform("createProject").unwrap());
        assert!(!other.can_perform("createGroup").unwrap());
    }

    #[test]
    fn administrators_imply_most_capabilities() {
        let declared =
            || vec![("administrateServer", vec![PermissionRule::allow(group("Admins"))])];
        let admin = control(declared(), vec![], &[group("Admins")]);

        assert!(admin.can_administrate_server().unwrap());
        for name in [
            "createAccount",
            "createProject",
            "maintainServer",
            "flushCaches",
            "viewQueue",
            "viewAllAccounts",
            "replication-startReplication",
        ] {
            assert!(admin.can_perform(name).unwrap(), "{name}");
        }
        for name in ["accessDatabase", "runAs", "priority", "batchChangesLimit"] {
            assert!(!admin.can_perform(name).unwrap(), "{name}");
        }

        let developer = control(declared(), vec![], &[group("Developers")]);
        assert!(!developer.can_administrate_server().unwrap());
        assert!(!developer.can_perform("viewAllAccounts").unwrap());
    }

    #[test]
    fn administrators_override_replaces_declared_rules() {
        let declared =
            || vec![("administrateServer", vec![PermissionRule::allow(group("Admins"))])];

        let site_admin = control(declared(), vec![group("Site")], &[group("Site")]);
        assert!(site_admin.can_administrate_server().unwrap());

        let declared_admin = control(declared(), vec![group("Site")], &[group("Admins")]);
        assert!(!declared_admin.can_administrate_server().unwrap());
    }

    #[test]
    fn maintainers_imply_maintenance_capabilities() {
        let declared = vec![("maintainServer", vec![PermissionRule::allow(group("Ops"))])];
        let ops = control(declared, vec![], &[group("Ops")]);

        for name in ["flushCaches", "killTask", "runGC", "viewCaches", "viewQueue"] {
            assert!(ops.can_perform(name).unwrap(), "{name}");
        }
        assert!(!ops.can_perform("createProject").unwrap());
        assert!(!ops.can_administrate_server().unwrap());
    }

    #[test]
    fn email_reviewers() {
        // Granted when nothing is declared.
        let nobody = control(vec![], vec![], &[]);
        assert!(nobody.can_email_reviewers().unwrap());

        let declared = || {
            vec![(
                "emailReviewers",
                vec![
                    PermissionRule::deny(registered()),
                    PermissionRule::allow(group("Developers")),
                ],
            )]
        };

        let denied = control(declared(), vec![], &[registered()]);
        assert!(!denied.can_email_reviewers().unwrap());

        let allowed = control(declared(), vec![], &[registered(), group("Developers")]);
        assert!(allowed.can_email_reviewers().unwrap());

        let anonymous = control(declared(), vec![], &[]);
        assert!(anonymous.can_perform("emailReviewers").unwrap());
    }

    #[test]
    fn range_merge() {
        let declared = || {
            vec![(
                "queryLimit",
                vec![
                    PermissionRule::allow(group("A")).with_range(0, 5),
                    PermissionRule::allow(group("B")).with_range(-3, 0),
                ],
            )]
        };

        let both = control(declared(), vec![], &[group("A"), group("B")]);
        assert_eq!(
            both.get_range("queryLimit").unwrap(),
            Some(PermissionRange::new(-3, 5))
        );

        let only_a = control(declared(), vec![], &[group("A")]);
        assert_eq!(
            only_a.get_range("queryLimit").unwrap(),
            Some(PermissionRange::new(0, 5))
        );

        // No matching rule falls back to the default range.
        let neither = control(declared(), vec![], &[]);
        assert_eq!(
            neither.get_range("queryLimit").unwrap(),
            Some(PermissionRange::new(0, 500))
        );

        assert_eq!(neither.get_range("createProject").unwrap(), None);
    }

    #[test]
    fn range_merge_starts_at_zero() {
        let declared = vec![(
            "batchChangesLimit",
            vec![PermissionRule::allow(group("A")).with_range(2, 10)],
        )];
        let member = control(declared, vec![], &[group("A")]);

        // The floor stays at 0 even though the only matching rule starts at 2.
        assert_eq!(
            member.get_range("batchChangesLimit").unwrap(),
            Some(PermissionRange::new(0, 10))
        );
    }

    #[test]
    fn default_query_limit_for_anonymous_users() {
        let anyone = control(vec![], vec![], &[]);
        assert_eq!(
            anyone.get_range("queryLimit").unwrap(),
            Some(PermissionRange::new(0, 500))
        );
        assert!(anyone.can_perform("queryLimit").unwrap());
        assert_eq!(
            anyone.get_range("batchChangesLimit").unwrap(),
            Some(PermissionRange::new(0, 0))
        );
    }

    #[test]
    fn queue_type() {
        let declared = || {
            vec![(
                "priority",
                vec![
                    PermissionRule::batch(registered()),
                    PermissionRule::interactive(group("Developers")),
                    PermissionRule::batch(group("CI")),
                    PermissionRule::interactive(anonymous()),
                ],
            )]
        };

        let developer = control(declared(), vec![], &[registered(), group("Developers")]);
        assert_eq!(developer.get_queue_type().unwrap(), QueueType::Interactive);

        let bot = control(declared(), vec![], &[group("CI")]);
        assert_eq!(bot.get_queue_type().unwrap(), QueueType::Batch);

        // Generic interactive grants lose against a matching batch rule.
        let user = control(declared(), vec![], &[registered()]);
        assert_eq!(user.get_queue_type().unwrap(), QueueType::Batch);

        let nobody = control(vec![], vec![], &[]);
        assert_eq!(nobody.get_queue_type().unwrap(), QueueType::Interactive);
    }

    #[test]
    fn unresolved_groups_never_match() {
        let declared = vec![(
            "createProject",
            vec![PermissionRule::allow(GroupReference::unresolved("Ghosts"))],
        )];
        let anyone = control(declared, vec![], &[]);
        assert!(!anyone.can_perform("createProject").unwrap());
    }

    #[test]
    fn unknown_backend_is_reported() {
        let unknown = GroupUuid::new("unknown:admins").unwrap();
        let declared = vec![(
            "createProject",
            vec![PermissionRule::allow(GroupReference::new(unknown.clone(), "admins"))],
        )];
        let anyone = control(declared, vec![], &[]);
        assert_eq!(
            anyone.can_perform("createProject"),
            Err(MembershipError::UnknownBackend(unknown))
        );
    }

    #[test]
    fn matching_rules_are_memoized() {
        let declared = vec![("createProject", vec![PermissionRule::allow(group("Developers"))])];
        let member = control(declared, vec![], &[group("Developers")]);

        let first = member.matching_rules("createProject").unwrap();
        let second = member.matching_rules("createProject").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
