// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-wide capabilities and the rules granting them.
//!
//! A [`CapabilityCollection`] holds the rules declared for the whole site. A
//! [`CapabilityControl`] evaluates them for one principal, using that principal's group
//! membership.
mod collection;
mod control;
mod rule;

pub use collection::CapabilityCollection;
pub use control::{CapabilityControl, QueueType};
pub use rule::{PermissionRange, PermissionRule, RuleAction, RuleParseError};

/// Access the database directly.
pub const ACCESS_DATABASE: &str = "accessDatabase";

/// Do anything on the server.
pub const ADMINISTRATE_SERVER: &str = "administrateServer";

/// Largest number of changes in one batch operation.
pub const BATCH_CHANGES_LIMIT: &str = "batchChangesLimit";

pub const CREATE_ACCOUNT: &str = "createAccount";

pub const CREATE_GROUP: &str = "createGroup";

pub const CREATE_PROJECT: &str = "createProject";

/// Notify reviewers by email. The only capability where deny rules take effect.
pub const EMAIL_REVIEWERS: &str = "emailReviewers";

pub const FLUSH_CACHES: &str = "flushCaches";

pub const KILL_TASK: &str = "killTask";

/// Server maintenance, implying the cache, queue and garbage collection capabilities.
pub const MAINTAIN_SERVER: &str = "maintainServer";

pub const MODIFY_ACCOUNT: &str = "modifyAccount";

/// Queue of the principal's background work.
pub const PRIORITY: &str = "priority";

/// Largest number of results a query may return.
pub const QUERY_LIMIT: &str = "queryLimit";

/// Impersonate other accounts.
pub const RUN_AS: &str = "runAs";

pub const RUN_GC: &str = "runGC";

pub const STREAM_EVENTS: &str = "streamEvents";

pub const VIEW_ACCESS: &str = "viewAccess";

/// See every account regardless of the account visibility policy.
pub const VIEW_ALL_ACCOUNTS: &str = "viewAllAccounts";

pub const VIEW_CACHES: &str = "viewCaches";

pub const VIEW_CONNECTIONS: &str = "viewConnections";

pub const VIEW_PLUGINS: &str = "viewPlugins";

pub const VIEW_QUEUE: &str = "viewQueue";

/// All capabilities defined by the server itself.
pub const CORE_CAPABILITIES: [&str; 22] = [
    ACCESS_DATABASE,
    ADMINISTRATE_SERVER,
    BATCH_CHANGES_LIMIT,
    CREATE_ACCOUNT,
    CREATE_GROUP,
    CREATE_PROJECT,
    EMAIL_REVIEWERS,
    FLUSH_CACHES,
    KILL_TASK,
    MAINTAIN_SERVER,
    MODIFY_ACCOUNT,
    PRIORITY,
    QUERY_LIMIT,
    RUN_AS,
    RUN_GC,
    STREAM_EVENTS,
    VIEW_ACCESS,
    VIEW_ALL_ACCOUNTS,
    VIEW_CACHES,
    VIEW_CONNECTIONS,
    VIEW_PLUGINS,
    VIEW_QUEUE,
];

/// Allowed bounds and default grant of a ranged capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeDefaults {
    pub bounds: PermissionRange,
    pub default: PermissionRange,
}

pub fn is_core(name: &str) -> bool {
    CORE_CAPABILITIES.contains(&name)
}

/// Returns `true` for names of the form `<plugin>-<capability>`.
pub fn is_plugin(name: &str) -> bool {
    !is_core(name)
        && name
            .split_once('-')
            .is_some_and(|(plugin, capability)| !plugin.is_empty() && !capability.is_empty())
}

/// Returns `true` if the name is a known core or a well-formed plugin capability.
pub fn is_valid(name: &str) -> bool {
    is_core(name) || is_plugin(name)
}

/// Returns `true` if the capability grants a numeric range instead of a yes or no.
pub fn has_range(name: &str) -> bool {
    range_defaults(name).is_some()
}

pub fn range_defaults(name: &str) -> Option<RangeDefaults> {
    match name {
        QUERY_LIMIT => Some(RangeDefaults {
            bounds: PermissionRange::new(0, i32::MAX),
            default: PermissionRange::new(0, 500),
        }),
        BATCH_CHANGES_LIMIT => Some(RangeDefaults {
            bounds: PermissionRange::new(0, i32::MAX),
            default: PermissionRange::new(0, 0),
        }),
        _ => None,
    }
}
