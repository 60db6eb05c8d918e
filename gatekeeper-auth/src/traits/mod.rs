// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces at the seams of the crate: the external group store, membership sources and the
//! per-principal membership view.
mod backend;
mod group_store;
mod membership;

pub use backend::{GroupBackend, MembershipResolver};
pub use group_store::GroupStore;
pub use membership::GroupMembership;
