//! Issuance by inclusion and revocation
//!
//! Both are state transitions: the issuer computes the trees after the
//! change, signs `H(old_state, new_state)`, assembles the circuit inputs and
//! asks the prover for a state transition proof. The new trees are committed
//! only after the proof exists; on any failure the issuer stays in its old
//! state. Publishing the proof to the state registry is left to the caller.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::claim::codec::Claim;
use crate::core::identity::state::{IdentityTrees, StateTransition, TreeState, TreeUpdate};
use crate::crypto::hash::hash_elems;
use crate::crypto::signature::FieldSigner;
use crate::issuer::Issuer;
use crate::merkle::sparse_merkle_tree::Proof;
use crate::types::error::{IdentityError, Result};
use crate::types::identifier::Identifier;
use crate::zk::inputs::StateTransitionInputs;
use crate::zk::{StateTransitionProver, ZkProof};

/// A claim included in the issuer's claims tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedCredential {
    pub claim: Claim,
    pub issuer_id: Identifier,
    /// First issuer state containing the claim
    pub issuer_claim_state: TreeState,
    pub claim_inc_mtp: Proof,
}

impl IncludedCredential {
    pub fn verify_inclusion(&self) -> Result<()> {
        let (hi, hv) = self.claim.hi_hv()?;
        if !self.issuer_claim_state.is_consistent()
            || !self.claim_inc_mtp.existence
            || !self
                .claim_inc_mtp
                .verify(&self.issuer_claim_state.claims_root, &hi, &hv)
        {
            return Err(IdentityError::verification("claim is not included in the issuer state"));
        }
        Ok(())
    }
}

/// A committed transition and its proof, ready to publish
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransitionProof {
    pub transition: StateTransition,
    pub inputs: StateTransitionInputs,
    pub proof: ZkProof,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionIssuance {
    pub credential: IncludedCredential,
    pub state_transition: StateTransitionProof,
}

impl<S: FieldSigner> Issuer<S> {
    /// Add `claim` to the claims tree through a proven state transition.
    pub fn issue_by_inclusion(
        &self,
        claim: Claim,
        prover: &dyn StateTransitionProver,
    ) -> Result<InclusionIssuance> {
        let update = TreeUpdate::add_claim(claim.clone());
        let (state_transition, claim_inc_mtp) =
            self.transition(&update, prover, |trees| trees.claim_proof(&claim, None))?;

        let credential = IncludedCredential {
            issuer_id: state_transition.inputs.id,
            issuer_claim_state: state_transition.transition.new,
            claim_inc_mtp,
            claim,
        };
        info!(
            issuer = %credential.issuer_id,
            state = %credential.issuer_claim_state.state,
            "issued credential by inclusion"
        );
        Ok(InclusionIssuance {
            credential,
            state_transition,
        })
    }

    /// Revoke the claim carrying `nonce` through a proven state transition.
    pub fn revoke(
        &self,
        nonce: u64,
        prover: &dyn StateTransitionProver,
    ) -> Result<StateTransitionProof> {
        let (state_transition, _) = self.transition(&TreeUpdate::revoke(nonce), prover, |_| Ok(()))?;
        info!(
            nonce,
            state = %state_transition.transition.new.state,
            "revoked claim"
        );
        Ok(state_transition)
    }

    /// Run one transition under the write lock. `extract` reads whatever the
    /// caller needs from the new trees before they are committed.
    fn transition<T>(
        &self,
        update: &TreeUpdate,
        prover: &dyn StateTransitionProver,
        extract: impl FnOnce(&IdentityTrees) -> Result<T>,
    ) -> Result<(StateTransitionProof, T)> {
        let mut identity = self.identity_lock().write();
        let auth_claim = identity.auth_claim().clone();
        let auth_nonce = auth_claim.revocation_nonce();
        if update.revoke_nonces.contains(&auth_nonce) {
            return Err(IdentityError::issuance(
                "an issuer cannot revoke its own auth claim in a transition it signs",
            ));
        }

        let trees = identity.trees();
        let auth_claim_inc_mtp = trees.claim_proof(&auth_claim, None)?;
        let auth_claim_non_rev_mtp = trees.revocation_proof(auth_nonce, None)?;
        if auth_claim_non_rev_mtp.existence {
            return Err(IdentityError::issuance("issuer auth claim is revoked"));
        }

        let pending = trees.apply(update)?;
        let transition = pending.transition;
        let signature = self
            .signer()
            .sign(&hash_elems(&[transition.old.state, transition.new.state])?)?;

        let inputs = StateTransitionInputs {
            id: identity.id(),
            old_tree_state: transition.old,
            new_tree_state: transition.new,
            is_old_state_genesis: transition.old == identity.genesis_state(),
            auth_claim_new_state_inc_mtp: pending.trees.claim_proof(&auth_claim, None)?,
            auth_claim,
            auth_claim_inc_mtp,
            auth_claim_non_rev_mtp,
            signature,
        };
        let extracted = extract(&pending.trees)?;

        let proof = prover.prove_state_transition(&inputs).map_err(|e| {
            warn!(id = %inputs.id, error = %e, "state transition proof failed");
            e
        })?;

        identity.commit(pending.trees);
        Ok((
            StateTransitionProof {
                transition,
                inputs,
                proof,
            },
            extracted,
        ))
    }
}
