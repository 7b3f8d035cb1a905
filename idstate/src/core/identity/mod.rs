//! Identity Module
//!
//! This module handles the state of a single identity:
//! - the three trees (claims, revocations, roots) and the state hash over them
//! - genesis: the auth claim, the genesis state and the identifier derived from it
//! - atomic state transitions

pub mod genesis;
pub mod state;

pub use genesis::{auth_claim, auth_claim_public_key, genesis_state, is_genesis_state, Identity};
pub use state::{
    identity_state, IdentityTrees, PendingTransition, StateTransition, TreeState, TreeUpdate,
    REVOKED,
};
