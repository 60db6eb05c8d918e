// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::account::{AccountControl, AccountPolicy};
use crate::cache::GroupCaches;
use crate::capability::{CapabilityCollection, CapabilityControl};
use crate::config::{Config, ConfigError};
use crate::group::{GroupUpdate, InternalGroup};
use crate::group_control::GroupControl;
use crate::identity::{AccountId, GroupId, GroupUuid, Principal};
use crate::membership::{
    InternalGroupBackend, MembershipError, SystemGroupBackend, UniversalGroupBackend,
    UniversalMembership,
};
use crate::traits::{GroupBackend, GroupStore};

/// Site settings which are replaced as a whole when the configuration changes.
#[derive(Clone)]
struct Settings {
    capabilities: Arc<CapabilityCollection>,
    accounts: Arc<AccountPolicy>,
}

impl Settings {
    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            capabilities: Arc::new(config.capability_collection()?),
            accounts: Arc::new(config.account_policy()?),
        })
    }
}

/// Entry point wiring caches, group backends and site policy together.
///
/// Hands out per-principal membership and controls, and receives the eviction calls of the
/// group mutation paths.
pub struct AccessManager<S> {
    caches: GroupCaches<S>,
    backends: UniversalGroupBackend,
    settings: RwLock<Settings>,
}

impl<S> AccessManager<S>
where
    S: GroupStore + 'static,
{
    /// Build the manager over `store`.
    ///
    /// Internal and system groups are always available, `extra_backends` are consulted after
    /// them in the given order.
    pub fn new(
        config: &Config,
        store: Arc<S>,
        extra_backends: Vec<Arc<dyn GroupBackend>>,
    ) -> Result<Self, ConfigError> {
        let settings = Settings::from_config(config)?;
        let caches = GroupCaches::new(store, config.cache.groups, config.cache.includes);

        let mut backends = UniversalGroupBackend::new()
            .with_backend(Arc::new(InternalGroupBackend::new(caches.clone())))
            .with_backend(Arc::new(SystemGroupBackend));
        for backend in extra_backends {
            backends.register(backend);
        }
        info!(
            backends = backends.backends().len(),
            visibility = %settings.accounts.visibility,
            "access manager ready"
        );

        Ok(Self {
            caches,
            backends,
            settings: RwLock::new(settings),
        })
    }

    pub fn caches(&self) -> &GroupCaches<S> {
        &self.caches
    }

    pub fn backends(&self) -> &UniversalGroupBackend {
        &self.backends
    }

    pub fn capability_collection(&self) -> Arc<CapabilityCollection> {
        self.settings.read().capabilities.clone()
    }

    pub fn account_policy(&self) -> Arc<AccountPolicy> {
        self.settings.read().accounts.clone()
    }

    /// Replace the capability rules and account policy with the ones of `config`.
    ///
    /// Controls handed out earlier keep evaluating the settings they were created with. Cache
    /// sizes are fixed at construction.
    pub fn reload(&self, config: &Config) -> Result<(), ConfigError> {
        let settings = Settings::from_config(config)?;
        *self.settings.write() = settings;
        info!("reloaded capabilities and account policy");
        Ok(())
    }

    /// Fresh membership view of `principal`, to be used for one request.
    pub fn membership_for(&self, principal: &Principal) -> UniversalMembership {
        self.backends.membership_for(principal)
    }

    pub fn capability_control_for(&self, principal: &Principal) -> Arc<CapabilityControl> {
        Arc::new(CapabilityControl::new(
            self.capability_collection(),
            Arc::new(self.membership_for(principal)),
        ))
    }

    pub fn account_control_for(&self, principal: &Principal) -> AccountControl {
        AccountControl::new(
            *principal,
            self.account_policy(),
            self.backends.clone(),
            self.capability_control_for(principal),
        )
    }

    /// Control of `principal` over the group, `None` if no such group exists.
    pub fn group_control_for(
        &self,
        principal: &Principal,
        uuid: &GroupUuid,
    ) -> Result<Option<GroupControl>, MembershipError> {
        let Some(group) = self.backends.get(uuid)? else {
            return Ok(None);
        };
        Ok(Some(GroupControl::new(
            group,
            self.capability_control_for(principal),
        )))
    }

    /// Evict a group from the lookups by id, name and uuid.
    pub fn evict_group(&self, id: GroupId) {
        debug!(%id, "evict group");
        self.caches.groups.evict_id(id);
    }

    pub fn evict_groups_with_member(&self, account: AccountId) {
        self.caches.includes.evict_groups_with_member(account);
    }

    pub fn evict_subgroups_of(&self, uuid: &GroupUuid) {
        self.caches.includes.evict_subgroups_of(uuid);
    }

    pub fn evict_parent_groups_of(&self, uuid: &GroupUuid) {
        self.caches.includes.evict_parent_groups_of(uuid);
    }

    pub fn on_group_created(&self, group: &InternalGroup) {
        self.caches.evict_on_group_created(group);
    }

    pub fn on_group_updated(&self, update: &GroupUpdate) {
        self.caches.evict_on_group_updated(update);
    }

    pub fn on_group_deleted(&self, group: &InternalGroup) {
        self.caches.evict_on_group_deleted(group);
    }
}
