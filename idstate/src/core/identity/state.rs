//! Three-tree identity state
//!
//! An identity state commits to three trees:
//! - claims: `hi -> hv` for every claim the identity issued
//! - revocations: `nonce -> 1` for every revoked claim
//! - roots: `claims root -> 0` for every claims root the identity ever published
//!
//! `state = H(claims_root, revocation_root, roots_root)`.
//!
//! Every change goes through [`IdentityTrees::apply`], which works on a copy
//! and returns the resulting trees alongside the old and new [`TreeState`].
//! The caller commits the copy only once everything depending on the new
//! state (signatures, proofs) has succeeded.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::claim::codec::Claim;
use crate::crypto::hash::hash_elems;
use crate::merkle::sparse_merkle_tree::{Proof, SparseMerkleTree, DEFAULT_LEVELS};
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;

/// Value stored under a revoked nonce
pub const REVOKED: FieldElement = FieldElement::ONE;

/// `H(claims_root, revocation_root, roots_root)`
pub fn identity_state(
    claims_root: &FieldElement,
    revocation_root: &FieldElement,
    roots_root: &FieldElement,
) -> Result<FieldElement> {
    hash_elems(&[*claims_root, *revocation_root, *roots_root])
}

/// An identity state together with the roots it commits to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeState {
    pub state: FieldElement,
    pub claims_root: FieldElement,
    pub revocation_root: FieldElement,
    pub roots_root: FieldElement,
}

impl TreeState {
    pub fn new(
        claims_root: FieldElement,
        revocation_root: FieldElement,
        roots_root: FieldElement,
    ) -> Result<Self> {
        Ok(TreeState {
            state: identity_state(&claims_root, &revocation_root, &roots_root)?,
            claims_root,
            revocation_root,
            roots_root,
        })
    }

    /// True when `state` really is the hash of the three roots.
    pub fn is_consistent(&self) -> bool {
        matches!(
            identity_state(&self.claims_root, &self.revocation_root, &self.roots_root),
            Ok(state) if state == self.state
        )
    }
}

/// Changes applied atomically in one state transition
#[derive(Clone, Debug, Default)]
pub struct TreeUpdate {
    pub add_claims: Vec<Claim>,
    pub revoke_nonces: Vec<u64>,
}

impl TreeUpdate {
    pub fn add_claim(claim: Claim) -> Self {
        TreeUpdate {
            add_claims: vec![claim],
            revoke_nonces: Vec::new(),
        }
    }

    pub fn revoke(nonce: u64) -> Self {
        TreeUpdate {
            add_claims: Vec::new(),
            revoke_nonces: vec![nonce],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add_claims.is_empty() && self.revoke_nonces.is_empty()
    }
}

/// Old and new state of one transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub old: TreeState,
    pub new: TreeState,
}

/// Trees produced by [`IdentityTrees::apply`], not yet committed
#[derive(Clone, Debug)]
pub struct PendingTransition {
    pub trees: IdentityTrees,
    pub transition: StateTransition,
}

#[derive(Clone, Debug)]
pub struct IdentityTrees {
    claims: SparseMerkleTree,
    revocations: SparseMerkleTree,
    roots: SparseMerkleTree,
}

impl Default for IdentityTrees {
    fn default() -> Self {
        Self::new(DEFAULT_LEVELS)
    }
}

impl IdentityTrees {
    pub fn new(levels: u32) -> Self {
        IdentityTrees {
            claims: SparseMerkleTree::new(levels),
            revocations: SparseMerkleTree::new(levels),
            roots: SparseMerkleTree::new(levels),
        }
    }

    pub fn claims(&self) -> &SparseMerkleTree {
        &self.claims
    }

    pub fn revocations(&self) -> &SparseMerkleTree {
        &self.revocations
    }

    pub fn roots(&self) -> &SparseMerkleTree {
        &self.roots
    }

    pub fn tree_state(&self) -> Result<TreeState> {
        TreeState::new(self.claims.root(), self.revocations.root(), self.roots.root())
    }

    /// Insert a claim into the claims tree without recording a transition.
    pub fn insert_claim(&mut self, claim: &Claim) -> Result<()> {
        let (hi, hv) = claim.hi_hv()?;
        self.claims.add(hi, hv)?;
        Ok(())
    }

    fn revoke_nonce(&mut self, nonce: u64) -> Result<()> {
        match self.revocations.add(FieldElement::from_u64(nonce), REVOKED) {
            Err(IdentityError::KeyExists(_)) => Err(IdentityError::issuance(format!(
                "revocation nonce {} is already revoked",
                nonce
            ))),
            other => other.map(|_| ()),
        }
    }

    /// Record the current claims root in the roots tree. Idempotent.
    fn record_claims_root(&mut self) -> Result<()> {
        let root = self.claims.root();
        if !self.roots.contains(&root)? {
            self.roots.add(root, FieldElement::ZERO)?;
        }
        Ok(())
    }

    pub fn is_revoked(&self, nonce: u64) -> Result<bool> {
        self.revocations.contains(&FieldElement::from_u64(nonce))
    }

    /// Existence proof of `claim` against `claims_root` (the current root when `None`).
    pub fn claim_proof(&self, claim: &Claim, claims_root: Option<FieldElement>) -> Result<Proof> {
        let (hi, hv) = claim.hi_hv()?;
        match self.claims.generate_proof(&hi, claims_root)? {
            (proof, Some(value)) if value == hv => Ok(proof),
            (_, Some(_)) => Err(IdentityError::InvalidClaim(
                "a different claim occupies this index".to_string(),
            )),
            (_, None) => Err(IdentityError::KeyNotFound(hi.to_string())),
        }
    }

    /// Revocation proof for `nonce` against `revocation_root` (current when `None`).
    /// A non-existence proof means the nonce is not revoked.
    pub fn revocation_proof(
        &self,
        nonce: u64,
        revocation_root: Option<FieldElement>,
    ) -> Result<Proof> {
        let (proof, _) = self
            .revocations
            .generate_proof(&FieldElement::from_u64(nonce), revocation_root)?;
        Ok(proof)
    }

    /// Proof that `claims_root` was recorded in the roots tree.
    pub fn roots_proof(&self, claims_root: &FieldElement) -> Result<Proof> {
        let (proof, _) = self.roots.generate_proof(claims_root, None)?;
        Ok(proof)
    }

    /// Compute the trees after `update` without touching `self`.
    ///
    /// The claims root before the update is recorded in the roots tree, then
    /// claims are added and nonces revoked. Any failure leaves no trace.
    pub fn apply(&self, update: &TreeUpdate) -> Result<PendingTransition> {
        if update.is_empty() {
            return Err(IdentityError::InvalidTransition(
                "state transition without changes".to_string(),
            ));
        }
        let old = self.tree_state()?;
        let mut next = self.clone();

        next.record_claims_root()?;
        for claim in &update.add_claims {
            next.insert_claim(claim)?;
        }
        for nonce in &update.revoke_nonces {
            next.revoke_nonce(*nonce)?;
        }
        next.record_claims_root()?;

        let new = next.tree_state()?;
        debug!(old = %old.state, new = %new.state, "computed state transition");
        Ok(PendingTransition {
            trees: next,
            transition: StateTransition { old, new },
        })
    }

    /// Apply `update` and commit it immediately.
    pub fn transition(&mut self, update: &TreeUpdate) -> Result<StateTransition> {
        let pending = self.apply(update)?;
        *self = pending.trees;
        Ok(pending.transition)
    }
}
