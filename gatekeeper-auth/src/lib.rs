// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group membership resolution and server-wide access policy for a code-review service.
//!
//! Groups come from several backends: the internal groups kept in a [`GroupStore`], the
//! built-in system groups and any number of external sources. Internal groups may include
//! groups of any backend as subgroups, membership is resolved transitively across all of them
//! and cycles in the inclusion graph are harmless.
//!
//! On top of membership, [`CapabilityControl`] answers which server-wide capabilities a
//! principal holds and [`AccountControl`] which other accounts it may see. [`AccessManager`]
//! wires everything together from a [`Config`].
//!
//! Lookups against the store are memoized in bounded caches. The caches are not coupled to the
//! store transactionally: every path writing groups must call the matching eviction hook after
//! its write succeeded, until then cached answers may be stale.
pub mod account;
pub mod cache;
pub mod capability;
pub mod config;
pub mod group;
mod group_control;
pub mod identity;
mod manager;
pub mod membership;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod traits;

pub use account::{AccountControl, AccountPolicy, AccountVisibility};
pub use cache::GroupCaches;
pub use capability::{CapabilityCollection, CapabilityControl, PermissionRule, QueueType};
pub use config::{Config, ConfigError};
pub use group::{GroupDescription, GroupReference, GroupUpdate, InternalGroup};
pub use group_control::GroupControl;
pub use identity::{AccountId, GroupId, GroupUuid, Principal};
pub use manager::AccessManager;
pub use membership::{MembershipError, UniversalGroupBackend, UniversalMembership};
pub use traits::{GroupBackend, GroupMembership, GroupStore, MembershipResolver};
