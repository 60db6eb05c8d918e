// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities.
mod directory;
mod group_store;

use std::collections::HashSet;

pub use directory::TestDirectoryBackend;
pub use group_store::{MemoryGroupStore, MemoryStoreError};

use crate::identity::GroupUuid;
use crate::membership::MembershipError;
use crate::traits::GroupMembership;

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// Effective membership which contains nothing, for resolvers tested in isolation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMembership;

impl GroupMembership for NoMembership {
    fn contains_any_of(&self, _ids: &[GroupUuid]) -> Result<bool, MembershipError> {
        Ok(false)
    }

    fn known_groups(&self) -> HashSet<GroupUuid> {
        HashSet::new()
    }
}
