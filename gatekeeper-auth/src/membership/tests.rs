// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::cache::GroupCaches;
use crate::group::{GroupDescription, GroupUpdate};
use crate::identity::{AccountId, GroupUuid, Principal};
use crate::membership::{
    InternalGroupBackend, MembershipError, SystemGroupBackend, UniversalGroupBackend, system,
};
use crate::test_utils::{MemoryGroupStore, TestDirectoryBackend, setup_logging};
use crate::traits::{GroupBackend, GroupMembership, MembershipResolver};

const ALICE: AccountId = AccountId(1);
const BOB: AccountId = AccountId(2);

struct Fixture {
    store: Arc<MemoryGroupStore>,
    caches: GroupCaches<MemoryGroupStore>,
    directory: Arc<TestDirectoryBackend>,
    backends: UniversalGroupBackend,
}

impl Fixture {
    fn new() -> Self {
        Self::with_backends(Vec::new())
    }

    fn with_backends(extra: Vec<Arc<dyn GroupBackend>>) -> Self {
        setup_logging();
        let store = Arc::new(MemoryGroupStore::default());
        let caches = GroupCaches::new(store.clone(), 64, 64);
        let directory = Arc::new(TestDirectoryBackend::default());
        let mut backends = UniversalGroupBackend::new()
            .with_backend(Arc::new(InternalGroupBackend::new(caches.clone())))
            .with_backend(Arc::new(SystemGroupBackend))
            .with_backend(directory.clone());
        for backend in extra {
            backends.register(backend);
        }
        Self {
            store,
            caches,
            directory,
            backends,
        }
    }

    fn contains(&self, account: AccountId, group: &GroupUuid) -> bool {
        self.backends
            .membership_for(&Principal::Identified(account))
            .contains(group)
            .unwrap()
    }
}

#[test]
fn direct_membership() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    fx.store.add_member(&devs.uuid, ALICE);

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(alice.contains(&devs.uuid).unwrap());
    assert!(alice.known_groups().contains(&devs.uuid));

    let bob = fx.backends.membership_for(&Principal::Identified(BOB));
    assert!(!bob.contains(&devs.uuid).unwrap());
    assert!(!bob.known_groups().contains(&devs.uuid));
}

#[test]
fn transitive_membership() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    let staff = fx.store.create_group("Staff");
    let everyone = fx.store.create_group("Everyone");
    fx.store.add_member(&devs.uuid, ALICE);
    fx.store.add_subgroup(&staff.uuid, &devs.uuid);
    fx.store.add_subgroup(&everyone.uuid, &staff.uuid);

    assert!(fx.contains(ALICE, &staff.uuid));
    assert!(fx.contains(ALICE, &everyone.uuid));
    assert!(!fx.contains(BOB, &everyone.uuid));

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    let known = alice.known_groups();
    for group in [&devs, &staff, &everyone] {
        assert!(known.contains(&group.uuid));
    }
    assert!(known.contains(&system::anonymous_users()));
    assert!(known.contains(&system::registered_users()));
}

#[test]
fn cycles_terminate() {
    let fx = Fixture::new();
    let a = fx.store.create_group("A");
    let b = fx.store.create_group("B");
    let c = fx.store.create_group("C");
    fx.store.add_subgroup(&a.uuid, &b.uuid);
    fx.store.add_subgroup(&b.uuid, &a.uuid);
    fx.store.add_subgroup(&a.uuid, &c.uuid);
    fx.store.add_member(&c.uuid, ALICE);

    // Query order which visits the cycle before reaching the member.
    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(alice.contains(&a.uuid).unwrap());
    assert!(alice.contains(&b.uuid).unwrap());

    let known = alice.known_groups();
    assert!(known.contains(&a.uuid) && known.contains(&b.uuid) && known.contains(&c.uuid));

    let bob = fx.backends.membership_for(&Principal::Identified(BOB));
    assert!(!bob.contains(&a.uuid).unwrap());
    assert!(!bob.contains(&b.uuid).unwrap());
    assert!(!bob.known_groups().contains(&a.uuid));
}

/// External backend whose groups include groups of any backend, `nest:` ids.
#[derive(Default)]
struct NestingBackend {
    includes: Arc<RwLock<HashMap<GroupUuid, Vec<GroupUuid>>>>,
}

impl NestingBackend {
    fn group(name: &str) -> GroupUuid {
        GroupUuid::new(format!("nest:{name}")).unwrap()
    }

    fn include(&self, group: &GroupUuid, subgroup: &GroupUuid) {
        self.includes
            .write()
            .entry(group.clone())
            .or_default()
            .push(subgroup.clone());
    }
}

impl GroupBackend for NestingBackend {
    fn name(&self) -> &'static str {
        "nesting"
    }

    fn handles(&self, uuid: &GroupUuid) -> bool {
        uuid.as_str().starts_with("nest:")
    }

    fn get(&self, uuid: &GroupUuid) -> Option<GroupDescription> {
        Some(GroupDescription {
            uuid: uuid.clone(),
            name: uuid.as_str().to_owned(),
            owner_group_uuid: None,
            visible_to_all: false,
        })
    }

    fn membership_for(&self, _principal: &Principal) -> Box<dyn MembershipResolver> {
        Box::new(NestingMembership {
            includes: self.includes.clone(),
        })
    }
}

struct NestingMembership {
    includes: Arc<RwLock<HashMap<GroupUuid, Vec<GroupUuid>>>>,
}

impl MembershipResolver for NestingMembership {
    fn contains_any_of(
        &self,
        ids: &[GroupUuid],
        effective: &dyn GroupMembership,
    ) -> Result<bool, MembershipError> {
        for id in ids {
            let included = self.includes.read().get(id).cloned().unwrap_or_default();
            if !included.is_empty() && effective.contains_any_of(&included)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn known_groups(&self, _effective: &dyn GroupMembership) -> HashSet<GroupUuid> {
        HashSet::new()
    }
}

#[test]
fn cycles_through_other_backends_terminate() {
    let nesting = Arc::new(NestingBackend::default());
    let extra: Vec<Arc<dyn GroupBackend>> = vec![nesting.clone()];
    let fx = Fixture::with_backends(extra);

    // A includes nest:x and D, nest:x includes A again and C, which has Alice.
    let a = fx.store.create_group("A");
    let c = fx.store.create_group("C");
    let d = fx.store.create_group("D");
    let x = NestingBackend::group("x");
    fx.store.add_subgroup(&a.uuid, &x);
    fx.store.add_subgroup(&a.uuid, &d.uuid);
    nesting.include(&x, &a.uuid);
    nesting.include(&x, &c.uuid);
    fx.store.add_member(&c.uuid, ALICE);

    let bob = fx.backends.membership_for(&Principal::Identified(BOB));
    assert!(!bob.contains(&x).unwrap());
    assert!(!bob.contains(&a.uuid).unwrap());
    assert!(!bob.contains(&c.uuid).unwrap());
    assert!(!bob.known_groups().contains(&a.uuid));

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(alice.contains(&a.uuid).unwrap());
    assert!(alice.contains(&x).unwrap());
    assert!(!alice.contains(&d.uuid).unwrap());

    // Answers cut short inside the cycle are not remembered.
    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(alice.contains(&x).unwrap());
    assert!(alice.contains(&a.uuid).unwrap());

    let known = alice.known_groups();
    for group in [&a.uuid, &c.uuid, &x] {
        assert!(known.contains(group));
    }
    assert!(!known.contains(&d.uuid));
}

#[test]
fn memoized_negatives_do_not_leak_through_cycles() {
    let fx = Fixture::new();
    // B includes A and A includes B, A also includes C which has Alice.
    let a = fx.store.create_group("A");
    let b = fx.store.create_group("B");
    let c = fx.store.create_group("C");
    fx.store.add_subgroup(&b.uuid, &a.uuid);
    fx.store.add_subgroup(&a.uuid, &b.uuid);
    fx.store.add_subgroup(&a.uuid, &c.uuid);
    fx.store.add_member(&c.uuid, ALICE);

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(alice.contains(&a.uuid).unwrap());
    // The same instance must still see B through A.
    assert!(alice.contains(&b.uuid).unwrap());
}

#[test]
fn external_groups_nested_in_internal_groups() {
    let fx = Fixture::new();
    let ldap_devs = TestDirectoryBackend::group("devs");
    fx.directory.add_member(ALICE, &ldap_devs);

    let staff = fx.store.create_group("Staff");
    let everyone = fx.store.create_group("Everyone");
    fx.store.add_subgroup(&staff.uuid, &ldap_devs);
    fx.store.add_subgroup(&everyone.uuid, &staff.uuid);

    assert!(fx.contains(ALICE, &ldap_devs));
    assert!(fx.contains(ALICE, &everyone.uuid));
    assert!(!fx.contains(BOB, &everyone.uuid));

    let known = fx
        .backends
        .membership_for(&Principal::Identified(ALICE))
        .known_groups();
    assert!(known.contains(&ldap_devs));
    assert!(known.contains(&staff.uuid));
    assert!(known.contains(&everyone.uuid));
}

#[test]
fn contains_any_of_across_backends() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    let ldap_ops = TestDirectoryBackend::group("ops");
    fx.store.add_member(&devs.uuid, ALICE);
    fx.directory.add_member(BOB, &ldap_ops);

    let ids = [devs.uuid.clone(), ldap_ops.clone()];
    for account in [ALICE, BOB, AccountId(3)] {
        let membership = fx.backends.membership_for(&Principal::Identified(account));
        let expected = fx.contains(account, &ids[0]) || fx.contains(account, &ids[1]);
        assert_eq!(membership.contains_any_of(&ids).unwrap(), expected);
    }

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert_eq!(
        alice.intersection(&ids).unwrap(),
        HashSet::from([devs.uuid.clone()])
    );
}

#[test]
fn unknown_backend_is_a_configuration_error() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    fx.store.add_member(&devs.uuid, ALICE);
    let unknown = GroupUuid::new("saml:admins").unwrap();

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert_eq!(
        alice.contains(&unknown),
        Err(MembershipError::UnknownBackend(unknown.clone()))
    );
    // Also when another id would have matched.
    assert_eq!(
        alice.contains_any_of(&[devs.uuid.clone(), unknown.clone()]),
        Err(MembershipError::UnknownBackend(unknown.clone()))
    );
    assert!(fx.backends.get(&unknown).is_err());
    assert!(!fx.backends.handles(&unknown));
}

#[test]
fn anonymous_principal() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");

    let anonymous = fx.backends.membership_for(&Principal::Anonymous);
    assert!(anonymous.contains(&system::anonymous_users()).unwrap());
    assert!(!anonymous.contains(&system::registered_users()).unwrap());
    assert!(!anonymous.contains(&devs.uuid).unwrap());
    assert_eq!(
        anonymous.known_groups(),
        HashSet::from([system::anonymous_users()])
    );
}

#[test]
fn deleted_groups_are_skipped() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    let gone = fx.store.create_group("Gone");
    let staff = fx.store.create_group("Staff");
    fx.store.add_member(&devs.uuid, ALICE);
    fx.store.add_subgroup(&staff.uuid, &gone.uuid);
    fx.store.add_subgroup(&staff.uuid, &devs.uuid);
    fx.store.delete_group(&gone.uuid);

    assert!(fx.contains(ALICE, &staff.uuid));
    assert!(!fx.contains(ALICE, &gone.uuid));
}

#[test]
fn eviction_after_member_removal() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    let staff = fx.store.create_group("Staff");
    fx.store.add_member(&devs.uuid, ALICE);
    fx.store.add_subgroup(&staff.uuid, &devs.uuid);

    assert!(fx.contains(ALICE, &staff.uuid));
    assert!(
        fx.backends
            .membership_for(&Principal::Identified(ALICE))
            .known_groups()
            .contains(&devs.uuid)
    );

    let updated = fx.store.remove_member(&devs.uuid, ALICE);
    fx.caches.evict_on_group_updated(
        &GroupUpdate::for_group(&updated).with_removed_members([ALICE]),
    );

    assert!(!fx.contains(ALICE, &devs.uuid));
    assert!(!fx.contains(ALICE, &staff.uuid));
    let known = fx
        .backends
        .membership_for(&Principal::Identified(ALICE))
        .known_groups();
    assert!(!known.contains(&devs.uuid));
    assert!(!known.contains(&staff.uuid));
}

#[test]
fn member_eviction_alone_is_coherent() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    let staff = fx.store.create_group("Staff");
    fx.store.add_member(&devs.uuid, ALICE);
    fx.store.add_subgroup(&staff.uuid, &devs.uuid);

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(alice.contains(&devs.uuid).unwrap());
    assert!(alice.contains(&staff.uuid).unwrap());
    assert!(alice.known_groups().contains(&devs.uuid));

    // The cached copy of Developers still lists Alice.
    fx.store.remove_member(&devs.uuid, ALICE);
    fx.caches.includes.evict_groups_with_member(ALICE);

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(!alice.contains(&devs.uuid).unwrap());
    assert!(!alice.contains(&staff.uuid).unwrap());
    let known = alice.known_groups();
    assert!(!known.contains(&devs.uuid));
    assert!(!known.contains(&staff.uuid));
}

#[test]
fn eviction_after_subgroup_change() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    let staff = fx.store.create_group("Staff");
    fx.store.add_member(&devs.uuid, ALICE);
    assert!(!fx.contains(ALICE, &staff.uuid));

    let updated = fx.store.add_subgroup(&staff.uuid, &devs.uuid);
    fx.caches.evict_on_group_updated(
        &GroupUpdate::for_group(&updated).with_added_subgroups([devs.uuid.clone()]),
    );
    assert!(fx.contains(ALICE, &staff.uuid));

    let updated = fx.store.remove_subgroup(&staff.uuid, &devs.uuid);
    fx.caches.evict_on_group_updated(
        &GroupUpdate::for_group(&updated).with_removed_subgroups([devs.uuid.clone()]),
    );
    assert!(!fx.contains(ALICE, &staff.uuid));
    assert!(
        !fx.backends
            .membership_for(&Principal::Identified(ALICE))
            .known_groups()
            .contains(&staff.uuid)
    );
}

#[test]
fn store_outage_fails_closed() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    fx.store.add_member(&devs.uuid, ALICE);

    fx.store.set_failing(true);
    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(!alice.contains(&devs.uuid).unwrap());
    assert!(!alice.known_groups().contains(&devs.uuid));

    // Failed reads were not cached.
    fx.store.set_failing(false);
    assert!(fx.contains(ALICE, &devs.uuid));
}

#[test]
fn memoizes_within_one_membership() {
    let fx = Fixture::new();
    let devs = fx.store.create_group("Developers");
    let staff = fx.store.create_group("Staff");
    fx.store.add_subgroup(&staff.uuid, &devs.uuid);
    fx.store.add_member(&devs.uuid, ALICE);

    let alice = fx.backends.membership_for(&Principal::Identified(ALICE));
    assert!(alice.contains(&staff.uuid).unwrap());
    fx.caches.groups.evict_by_uuid(&staff.uuid);
    fx.caches.groups.evict_by_uuid(&devs.uuid);

    let reads = fx.store.reads("group_by_uuid");
    assert!(alice.contains(&staff.uuid).unwrap());
    assert!(alice.contains(&devs.uuid).unwrap());
    assert_eq!(fx.store.reads("group_by_uuid"), reads);
}

#[test]
fn shared_between_threads() {
    let fx = Fixture::new();
    let mut groups = Vec::new();
    let root = fx.store.create_group("Root");
    for i in 0..16 {
        let group = fx.store.create_group(&format!("Group {i}"));
        fx.store.add_subgroup(&root.uuid, &group.uuid);
        groups.push(group.uuid);
    }
    fx.store.add_member(&groups[11], ALICE);

    let alice = Arc::new(fx.backends.membership_for(&Principal::Identified(ALICE)));
    let handles: Vec<_> = groups
        .iter()
        .cloned()
        .chain([root.uuid.clone()])
        .map(|group| {
            let alice = alice.clone();
            thread::spawn(move || (group.clone(), alice.contains(&group).unwrap()))
        })
        .collect();

    for handle in handles {
        let (group, is_member) = handle.join().unwrap();
        assert_eq!(is_member, group == groups[11] || group == root.uuid);
    }
}

/// Membership computed independently by iterating to a fixpoint.
fn expected_memberships(
    store: &MemoryGroupStore,
    groups: &[GroupUuid],
    account: AccountId,
    directory_groups: &HashSet<GroupUuid>,
) -> HashSet<GroupUuid> {
    let mut members: HashSet<GroupUuid> = directory_groups.clone();
    loop {
        let mut changed = false;
        for uuid in groups {
            if members.contains(uuid) {
                continue;
            }
            let group = store.group(uuid).unwrap();
            if group.has_member(account) || group.subgroups.iter().any(|s| members.contains(s)) {
                members.insert(uuid.clone());
                changed = true;
            }
        }
        if !changed {
            return members;
        }
    }
}

#[test]
fn random_graphs_match_fixpoint() {
    for seed in 0..24 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let fx = Fixture::new();

        let groups: Vec<GroupUuid> = (0..10)
            .map(|i| fx.store.create_group(&format!("G{i}")).uuid)
            .collect();
        let external: Vec<GroupUuid> = (0..3)
            .map(|i| TestDirectoryBackend::group(&format!("x{i}")))
            .collect();

        for group in &groups {
            if rng.random_bool(0.1) {
                fx.store.add_member(group, ALICE);
            }
            for subgroup in &groups {
                if rng.random_bool(0.15) {
                    fx.store.add_subgroup(group, subgroup);
                }
            }
            if rng.random_bool(0.2) {
                let subgroup = &external[rng.random_range(0..external.len())];
                fx.store.add_subgroup(group, subgroup);
            }
        }
        let mut directory_groups = HashSet::new();
        for group in &external {
            if rng.random_bool(0.4) {
                fx.directory.add_member(ALICE, group);
                directory_groups.insert(group.clone());
            }
        }

        let expected = expected_memberships(&fx.store, &groups, ALICE, &directory_groups);
        let all: Vec<GroupUuid> = groups.iter().chain(&external).cloned().collect();

        // One long-lived instance, queried in random order, must agree with fresh ones.
        let shared = fx.backends.membership_for(&Principal::Identified(ALICE));
        for _ in 0..all.len() * 2 {
            let group = &all[rng.random_range(0..all.len())];
            assert_eq!(
                shared.contains(group).unwrap(),
                expected.contains(group),
                "seed {seed}, group {group}"
            );
        }

        let mut single: HashMap<GroupUuid, bool> = HashMap::new();
        for group in &all {
            let is_member = fx.contains(ALICE, group);
            assert_eq!(is_member, expected.contains(group), "seed {seed}");
            single.insert(group.clone(), is_member);
        }

        for _ in 0..20 {
            let a = &all[rng.random_range(0..all.len())];
            let b = &all[rng.random_range(0..all.len())];
            let membership = fx.backends.membership_for(&Principal::Identified(ALICE));
            assert_eq!(
                membership.contains_any_of(&[a.clone(), b.clone()]).unwrap(),
                single[a] || single[b],
                "seed {seed}"
            );
        }

        let known = fx
            .backends
            .membership_for(&Principal::Identified(ALICE))
            .known_groups();
        let mut expected_known = expected.clone();
        expected_known.insert(system::anonymous_users());
        expected_known.insert(system::registered_users());
        assert_eq!(known, expected_known, "seed {seed}");
    }
}
