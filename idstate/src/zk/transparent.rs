//! Transparent proof backend
//!
//! The "proof" is the serialized circuit input itself. Verification decodes
//! it, enforces every constraint of the circuit by recomputation and checks
//! that the public signals are exactly the ones the inputs produce. Nothing
//! is hidden from the verifier, but every accept/reject decision is the one
//! a succinct backend would make for the same inputs, which keeps the full
//! protocol runnable and testable end to end.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::claim::codec::Claim;
use crate::core::identity::genesis::auth_claim_public_key;
use crate::core::identity::state::{TreeState, REVOKED};
use crate::crypto::hash::hash_elems;
use crate::merkle::sparse_merkle_tree::Proof;
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::zk::inputs::{AtomicQueryInputs, AuthInputs, CredentialInputs, StateTransitionInputs};
use crate::zk::pubsignals::{AtomicQueryPubSignals, AuthPubSignals, StateTransitionPubSignals};
use crate::zk::{CircuitId, CredentialProver, ProofVerifier, StateTransitionProver, ZkProof};

fn ensure_consistent(state: &TreeState, what: &str) -> Result<()> {
    if !state.is_consistent() {
        return Err(IdentityError::verification(format!(
            "{} is not the hash of its roots",
            what
        )));
    }
    Ok(())
}

fn ensure_included(claim: &Claim, proof: &Proof, claims_root: &FieldElement, what: &str) -> Result<()> {
    let (hi, hv) = claim.hi_hv()?;
    if !proof.existence || !proof.verify(claims_root, &hi, &hv) {
        return Err(IdentityError::verification(format!(
            "{} is not included in the claims tree",
            what
        )));
    }
    Ok(())
}

fn ensure_not_revoked(
    nonce: u64,
    proof: &Proof,
    revocation_root: &FieldElement,
    what: &str,
) -> Result<()> {
    let key = FieldElement::from_u64(nonce);
    if proof.existence {
        if proof.verify(revocation_root, &key, &REVOKED) {
            return Err(IdentityError::verification(format!("{} is revoked", what)));
        }
        return Err(IdentityError::verification(format!(
            "invalid revocation proof for {}",
            what
        )));
    }
    if !proof.verify(revocation_root, &key, &FieldElement::ZERO) {
        return Err(IdentityError::verification(format!(
            "invalid non-revocation proof for {}",
            what
        )));
    }
    Ok(())
}

fn check_auth(inputs: &AuthInputs) -> Result<()> {
    let state = &inputs.tree_state;
    ensure_consistent(state, "user state")?;
    let public_key = auth_claim_public_key(&inputs.auth_claim)?;
    ensure_included(&inputs.auth_claim, &inputs.auth_claim_inc_mtp, &state.claims_root, "auth claim")?;
    ensure_not_revoked(
        inputs.auth_claim.revocation_nonce(),
        &inputs.auth_claim_non_rev_mtp,
        &state.revocation_root,
        "auth claim",
    )?;
    if !public_key.verify(&inputs.challenge, &inputs.signature) {
        return Err(IdentityError::verification("challenge signature is invalid"));
    }
    Ok(())
}

fn auth_signals(inputs: &AuthInputs) -> AuthPubSignals {
    AuthPubSignals {
        user_id: inputs.user_id,
        user_state: inputs.tree_state.state,
        challenge: inputs.challenge,
    }
}

fn check_state_transition(inputs: &StateTransitionInputs) -> Result<()> {
    let (old, new) = (&inputs.old_tree_state, &inputs.new_tree_state);
    ensure_consistent(old, "old state")?;
    ensure_consistent(new, "new state")?;
    if old.state == new.state {
        return Err(IdentityError::verification("state transition does not change the state"));
    }
    if inputs.is_old_state_genesis != inputs.id.is_genesis_state(&old.state) {
        return Err(IdentityError::verification(
            "genesis flag disagrees with the identifier",
        ));
    }

    let public_key = auth_claim_public_key(&inputs.auth_claim)?;
    ensure_included(&inputs.auth_claim, &inputs.auth_claim_inc_mtp, &old.claims_root, "auth claim")?;
    ensure_not_revoked(
        inputs.auth_claim.revocation_nonce(),
        &inputs.auth_claim_non_rev_mtp,
        &old.revocation_root,
        "auth claim",
    )?;
    ensure_included(
        &inputs.auth_claim,
        &inputs.auth_claim_new_state_inc_mtp,
        &new.claims_root,
        "auth claim in the new state",
    )?;

    let message = hash_elems(&[old.state, new.state])?;
    if !public_key.verify(&message, &inputs.signature) {
        return Err(IdentityError::verification("state transition signature is invalid"));
    }
    Ok(())
}

fn state_transition_signals(inputs: &StateTransitionInputs) -> StateTransitionPubSignals {
    StateTransitionPubSignals {
        user_id: inputs.id,
        old_state: inputs.old_tree_state.state,
        new_state: inputs.new_tree_state.state,
        is_old_state_genesis: inputs.is_old_state_genesis,
    }
}

fn check_atomic_query(circuit: CircuitId, inputs: &AtomicQueryInputs) -> Result<()> {
    let claim = &inputs.claim;
    match (circuit, &inputs.credential) {
        (
            CircuitId::AtomicQueryMtpV2,
            CredentialInputs::Mtp {
                issuer_claim_state,
                claim_inc_mtp,
            },
        ) => {
            ensure_consistent(issuer_claim_state, "issuer claim state")?;
            ensure_included(claim, claim_inc_mtp, &issuer_claim_state.claims_root, "claim")?;
        }
        (
            CircuitId::AtomicQuerySigV2,
            CredentialInputs::Sig {
                signature,
                issuer_auth_claim,
                issuer_auth_state,
                issuer_auth_inc_mtp,
                issuer_auth_non_rev_mtp,
            },
        ) => {
            ensure_consistent(issuer_auth_state, "issuer auth state")?;
            ensure_included(
                issuer_auth_claim,
                issuer_auth_inc_mtp,
                &issuer_auth_state.claims_root,
                "issuer auth claim",
            )?;
            ensure_not_revoked(
                issuer_auth_claim.revocation_nonce(),
                issuer_auth_non_rev_mtp,
                &issuer_auth_state.revocation_root,
                "issuer auth claim",
            )?;
            let public_key = auth_claim_public_key(issuer_auth_claim)?;
            if !public_key.verify(&claim.hash()?, signature) {
                return Err(IdentityError::verification("claim signature is invalid"));
            }
        }
        (circuit, _) => {
            return Err(IdentityError::verification(format!(
                "credential inputs do not fit circuit {}",
                circuit
            )))
        }
    }

    ensure_consistent(&inputs.issuer_non_rev_state, "issuer non-revocation state")?;
    ensure_not_revoked(
        claim.revocation_nonce(),
        &inputs.claim_non_rev_mtp,
        &inputs.issuer_non_rev_state.revocation_root,
        "claim",
    )?;

    if claim.subject_id()? != Some(inputs.user_id) {
        return Err(IdentityError::verification("claim subject is not the prover"));
    }
    if let Some(expiration) = claim.expiration() {
        if expiration < inputs.timestamp {
            return Err(IdentityError::verification("claim is expired"));
        }
    }
    if claim.schema_hash() != inputs.query.schema {
        return Err(IdentityError::verification(format!(
            "claim schema {} is not the queried schema {}",
            claim.schema_hash(),
            inputs.query.schema
        )));
    }
    if !inputs.query.matches(&claim.slot(inputs.query.slot_index)) {
        return Err(IdentityError::verification("claim does not satisfy the query"));
    }
    Ok(())
}

fn atomic_query_signals(inputs: &AtomicQueryInputs) -> Result<AtomicQueryPubSignals> {
    Ok(AtomicQueryPubSignals {
        request_id: inputs.request_id,
        user_id: inputs.user_id,
        issuer_id: inputs.issuer_id,
        issuer_state: inputs.credential.issuer_state().state,
        issuer_non_rev_state: inputs.issuer_non_rev_state.state,
        is_revocation_checked: true,
        timestamp: inputs.timestamp,
        claim_schema: inputs.query.schema,
        slot_index: inputs.query.slot_index,
        operator: inputs.query.operator,
        query_hash: inputs.query.hash()?,
        values: inputs.query.padded_values()?,
    })
}

fn package<T: Serialize>(inputs: &T, pub_signals: Vec<FieldElement>) -> Result<ZkProof> {
    Ok(ZkProof {
        proof: serde_json::to_vec(inputs)?,
        pub_signals,
    })
}

fn unpack<T: DeserializeOwned>(proof: &ZkProof, circuit: CircuitId) -> Result<T> {
    serde_json::from_slice(&proof.proof)
        .map_err(|e| IdentityError::verification(format!("malformed {} proof: {}", circuit, e)))
}

fn ensure_signals(expected: Vec<FieldElement>, proof: &ZkProof, circuit: CircuitId) -> Result<()> {
    if expected != proof.pub_signals {
        return Err(IdentityError::verification(format!(
            "public signals do not match the {} proof",
            circuit
        )));
    }
    Ok(())
}

/// Packages circuit inputs as proofs without checking them
#[derive(Clone, Copy, Debug, Default)]
pub struct TransparentProver;

impl StateTransitionProver for TransparentProver {
    fn prove_state_transition(&self, inputs: &StateTransitionInputs) -> Result<ZkProof> {
        package(inputs, state_transition_signals(inputs).to_signals())
    }
}

impl CredentialProver for TransparentProver {
    fn prove_auth(&self, inputs: &AuthInputs) -> Result<ZkProof> {
        package(inputs, auth_signals(inputs).to_signals())
    }

    fn prove_atomic_query(&self, circuit: CircuitId, inputs: &AtomicQueryInputs) -> Result<ZkProof> {
        if !circuit.is_query_circuit() {
            return Err(IdentityError::internal(format!(
                "{} is not a query circuit",
                circuit
            )));
        }
        package(inputs, atomic_query_signals(inputs)?.to_signals()?)
    }
}

/// Verifies transparent proofs by re-running the circuit constraints
#[derive(Clone, Copy, Debug, Default)]
pub struct TransparentVerifier;

impl ProofVerifier for TransparentVerifier {
    fn verify(&self, circuit: CircuitId, proof: &ZkProof) -> Result<()> {
        match circuit {
            CircuitId::AuthV2 => {
                let inputs: AuthInputs = unpack(proof, circuit)?;
                check_auth(&inputs)?;
                ensure_signals(auth_signals(&inputs).to_signals(), proof, circuit)?;
            }
            CircuitId::StateTransition => {
                let inputs: StateTransitionInputs = unpack(proof, circuit)?;
                check_state_transition(&inputs)?;
                ensure_signals(state_transition_signals(&inputs).to_signals(), proof, circuit)?;
            }
            CircuitId::AtomicQueryMtpV2 | CircuitId::AtomicQuerySigV2 => {
                let inputs: AtomicQueryInputs = unpack(proof, circuit)?;
                check_atomic_query(circuit, &inputs)?;
                ensure_signals(atomic_query_signals(&inputs)?.to_signals()?, proof, circuit)?;
            }
        }
        debug!(%circuit, "verified proof");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::genesis::Identity;
    use crate::crypto::signature::{FieldSigner, KeyPair};

    fn auth_inputs(key: &KeyPair, challenge: FieldElement) -> Result<AuthInputs> {
        let identity = Identity::from_public_key(&key.public_key(), 1)?;
        let trees = identity.trees();
        Ok(AuthInputs {
            user_id: identity.id(),
            tree_state: identity.tree_state()?,
            auth_claim: identity.auth_claim().clone(),
            auth_claim_inc_mtp: trees.claim_proof(identity.auth_claim(), None)?,
            auth_claim_non_rev_mtp: trees.revocation_proof(1, None)?,
            challenge,
            signature: key.sign(&challenge)?,
        })
    }

    #[test]
    fn test_auth_proof_round_trip() -> Result<()> {
        let key = KeyPair::from_entropy(b"transparent auth");
        let inputs = auth_inputs(&key, FieldElement::from_u64(99))?;
        let proof = TransparentProver.prove_auth(&inputs)?;
        TransparentVerifier.verify(CircuitId::AuthV2, &proof)?;

        let signals = AuthPubSignals::from_signals(&proof.pub_signals)?;
        assert_eq!(signals.user_id, inputs.user_id);
        assert_eq!(signals.challenge, FieldElement::from_u64(99));
        Ok(())
    }

    #[test]
    fn test_wrong_signer_is_rejected() -> Result<()> {
        let key = KeyPair::from_entropy(b"owner");
        let mut inputs = auth_inputs(&key, FieldElement::from_u64(7))?;
        inputs.signature = KeyPair::from_entropy(b"intruder").sign(&FieldElement::from_u64(7))?;
        let proof = TransparentProver.prove_auth(&inputs)?;
        assert!(matches!(
            TransparentVerifier.verify(CircuitId::AuthV2, &proof),
            Err(IdentityError::ProofVerification(_))
        ));
        Ok(())
    }

    #[test]
    fn test_swapped_signals_are_rejected() -> Result<()> {
        let key = KeyPair::from_entropy(b"signals");
        let inputs = auth_inputs(&key, FieldElement::from_u64(7))?;
        let mut proof = TransparentProver.prove_auth(&inputs)?;
        proof.pub_signals[2] = FieldElement::from_u64(8);
        assert!(TransparentVerifier.verify(CircuitId::AuthV2, &proof).is_err());

        let proof = TransparentProver.prove_auth(&inputs)?;
        assert!(TransparentVerifier
            .verify(CircuitId::StateTransition, &proof)
            .is_err());
        Ok(())
    }
}
