// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::group::GroupDescription;
use crate::identity::{GroupUuid, Principal};
use crate::membership::MembershipError;
use crate::traits::{GroupBackend, GroupMembership, MembershipResolver};

/// Registry of all group backends, routing every group identifier to the backend owning it.
#[derive(Clone, Default)]
pub struct UniversalGroupBackend {
    backends: Vec<Arc<dyn GroupBackend>>,
}

impl UniversalGroupBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. Earlier registrations win when several backends handle an id.
    pub fn with_backend(mut self, backend: Arc<dyn GroupBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn register(&mut self, backend: Arc<dyn GroupBackend>) {
        self.backends.push(backend);
    }

    pub fn backends(&self) -> &[Arc<dyn GroupBackend>] {
        &self.backends
    }

    pub fn handles(&self, uuid: &GroupUuid) -> bool {
        self.backends.iter().any(|backend| backend.handles(uuid))
    }

    /// Backend owning the identifier.
    pub fn backend_for(&self, uuid: &GroupUuid) -> Result<&Arc<dyn GroupBackend>, MembershipError> {
        self.backends
            .iter()
            .find(|backend| backend.handles(uuid))
            .ok_or_else(|| MembershipError::UnknownBackend(uuid.clone()))
    }

    /// Look up a group in the backend owning it.
    pub fn get(&self, uuid: &GroupUuid) -> Result<Option<GroupDescription>, MembershipError> {
        Ok(self.backend_for(uuid)?.get(uuid))
    }

    /// Create the membership view of a principal across all backends.
    pub fn membership_for(&self, principal: &Principal) -> UniversalMembership {
        let resolvers = self
            .backends
            .iter()
            .map(|backend| (backend.clone(), backend.membership_for(principal)))
            .collect();
        UniversalMembership {
            principal: *principal,
            resolvers,
        }
    }
}

/// Group memberships of one principal across all registered backends.
pub struct UniversalMembership {
    principal: Principal,
    resolvers: Vec<(Arc<dyn GroupBackend>, Box<dyn MembershipResolver>)>,
}

impl UniversalMembership {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Split the ids by the index of the backend owning them.
    fn partition(&self, ids: &[GroupUuid]) -> Result<Vec<Vec<GroupUuid>>, MembershipError> {
        let mut partitions = vec![Vec::new(); self.resolvers.len()];
        for id in ids {
            let index = self
                .resolvers
                .iter()
                .position(|(backend, _)| backend.handles(id))
                .ok_or_else(|| MembershipError::UnknownBackend(id.clone()))?;
            partitions[index].push(id.clone());
        }
        Ok(partitions)
    }
}

impl GroupMembership for UniversalMembership {
    fn contains_any_of(&self, ids: &[GroupUuid]) -> Result<bool, MembershipError> {
        let partitions = self.partition(ids)?;
        for ((backend, resolver), ids) in self.resolvers.iter().zip(partitions) {
            if ids.is_empty() {
                continue;
            }
            if resolver.contains_any_of(&ids, self)? {
                trace!(principal = %self.principal, backend = backend.name(), "member");
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn intersection(&self, ids: &[GroupUuid]) -> Result<HashSet<GroupUuid>, MembershipError> {
        let partitions = self.partition(ids)?;
        let mut result = HashSet::new();
        for ((_, resolver), ids) in self.resolvers.iter().zip(partitions) {
            if !ids.is_empty() {
                result.extend(resolver.intersection(&ids, self)?);
            }
        }
        Ok(result)
    }

    fn known_groups(&self) -> HashSet<GroupUuid> {
        self.resolvers
            .iter()
            .flat_map(|(_, resolver)| resolver.known_groups(self))
            .collect()
    }
}
