// SPDX-License-Identifier: MIT OR Apache-2.0

//! Site configuration of capabilities, account visibility and caches.
//!
//! ```toml
//! administrators = ["Site Admins"]
//!
//! [accounts]
//! visibility = "SAME_GROUP"
//! same_group_visibility = ["deny group Everyone"]
//!
//! [capabilities]
//! createProject = ["group Developers"]
//! queryLimit = ["0..10000 group Developers"]
//! priority = ["batch group CI Servers"]
//!
//! [groups]
//! "Developers" = "6f0b8e..."
//!
//! [cache]
//! groups = 2048
//! ```
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::account::{AccountPolicy, AccountVisibility};
use crate::cache::DEFAULT_CAPACITY;
use crate::capability::{CapabilityCollection, PermissionRule, RuleParseError};
use crate::group::GroupReference;
use crate::identity::GroupUuid;
use crate::membership::system;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown account visibility '{0}'")]
    UnknownAccountVisibility(String),

    #[error("invalid rule for {permission}: {source}")]
    Rule {
        permission: String,
        #[source]
        source: RuleParseError,
    },
}

/// Site configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Groups whose members administrate the server. Replaces the declared
    /// `administrateServer` rules when not empty.
    pub administrators: Vec<String>,

    pub accounts: AccountsConfig,

    /// Rules of server-wide capabilities, by capability name.
    pub capabilities: BTreeMap<String, Vec<String>>,

    /// Identifiers of the groups named in rules.
    pub groups: BTreeMap<String, GroupUuid>,

    pub cache: CacheConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub visibility: AccountVisibility,
    pub same_group_visibility: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries per group lookup (by id, name and uuid).
    pub groups: usize,

    /// Entries per membership relation.
    pub includes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            groups: DEFAULT_CAPACITY,
            includes: DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Resolve a group name used in a rule.
    ///
    /// System groups are known by their display name. Names without an entry stay unresolved
    /// and never match anyone.
    pub fn resolve_group(&self, name: &str) -> GroupReference {
        if let Some(reference) = system::reference_by_name(name) {
            return reference;
        }
        match self.groups.get(name) {
            Some(uuid) => GroupReference::new(uuid.clone(), name),
            None => {
                warn!(%name, "group in rule is not configured, the rule will never match");
                GroupReference::unresolved(name)
            }
        }
    }

    /// Parse a rule and resolve the group it names.
    pub fn parse_rule(&self, permission: &str, text: &str) -> Result<PermissionRule, ConfigError> {
        let rule: PermissionRule = text.parse().map_err(|source| ConfigError::Rule {
            permission: permission.to_owned(),
            source,
        })?;
        let group = self.resolve_group(&rule.group.name);
        Ok(rule.with_group(group))
    }

    pub fn administrators(&self) -> Vec<GroupReference> {
        self.administrators
            .iter()
            .map(|name| self.resolve_group(name))
            .collect()
    }

    /// Build the server-wide capability rules.
    pub fn capability_collection(&self) -> Result<CapabilityCollection, ConfigError> {
        let mut declared = Vec::with_capacity(self.capabilities.len());
        for (name, rules) in &self.capabilities {
            let rules = rules
                .iter()
                .map(|text| self.parse_rule(name, text))
                .collect::<Result<Vec<_>, _>>()?;
            declared.push((name.clone(), rules));
        }
        Ok(CapabilityCollection::new(declared, self.administrators()))
    }

    pub fn account_policy(&self) -> Result<AccountPolicy, ConfigError> {
        let rules = self
            .accounts
            .same_group_visibility
            .iter()
            .map(|text| self.parse_rule("sameGroupVisibility", text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AccountPolicy::new(self.accounts.visibility).with_same_group_rules(rules))
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(value)?)
    }
}
