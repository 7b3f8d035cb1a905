//! Issuance by signature
//!
//! The issuer signs `H(hi, hv)` of the claim with the key of its auth claim.
//! The credential carries the proofs a verifier needs to tie that key to an
//! issuer state: the auth claim's inclusion and non-revocation at the state
//! the issuer was in when signing.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::claim::codec::Claim;
use crate::core::identity::genesis::auth_claim_public_key;
use crate::core::identity::state::TreeState;
use crate::crypto::signature::{FieldSigner, Signature};
use crate::issuer::Issuer;
use crate::merkle::sparse_merkle_tree::Proof;
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::types::identifier::Identifier;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedCredential {
    pub claim: Claim,
    pub signature: Signature,
    pub issuer_id: Identifier,
    pub issuer_auth_claim: Claim,
    pub issuer_auth_state: TreeState,
    pub issuer_auth_inc_mtp: Proof,
    pub issuer_auth_non_rev_mtp: Proof,
}

impl SignedCredential {
    /// Check the signature and the issuer auth claim proofs.
    ///
    /// This does not check whether `issuer_auth_state` is a state the issuer
    /// actually published; that is the verifier's registry lookup.
    pub fn verify(&self) -> Result<()> {
        let state = &self.issuer_auth_state;
        if !state.is_consistent() {
            return Err(IdentityError::verification("issuer state is not the hash of its roots"));
        }
        let (hi, hv) = self.issuer_auth_claim.hi_hv()?;
        if !self.issuer_auth_inc_mtp.existence
            || !self.issuer_auth_inc_mtp.verify(&state.claims_root, &hi, &hv)
        {
            return Err(IdentityError::verification("issuer auth claim is not included"));
        }
        let nonce = FieldElement::from_u64(self.issuer_auth_claim.revocation_nonce());
        if self.issuer_auth_non_rev_mtp.existence
            || !self
                .issuer_auth_non_rev_mtp
                .verify(&state.revocation_root, &nonce, &FieldElement::ZERO)
        {
            return Err(IdentityError::verification("issuer auth claim is revoked"));
        }
        let public_key = auth_claim_public_key(&self.issuer_auth_claim)?;
        if !public_key.verify(&self.claim.hash()?, &self.signature) {
            return Err(IdentityError::Signature("claim signature is invalid".to_string()));
        }
        Ok(())
    }
}

impl<S: FieldSigner> Issuer<S> {
    /// Sign `claim` without changing the issuer state.
    pub fn issue_by_signature(&self, claim: Claim) -> Result<SignedCredential> {
        let claim_hash = claim.hash()?;
        let identity = self.identity_lock().read();
        let trees = identity.trees();
        let auth_claim = identity.auth_claim().clone();

        let issuer_auth_non_rev_mtp = trees.revocation_proof(auth_claim.revocation_nonce(), None)?;
        if issuer_auth_non_rev_mtp.existence {
            return Err(IdentityError::issuance("issuer auth claim is revoked"));
        }

        let credential = SignedCredential {
            signature: self.signer().sign(&claim_hash)?,
            issuer_id: identity.id(),
            issuer_auth_state: identity.tree_state()?,
            issuer_auth_inc_mtp: trees.claim_proof(&auth_claim, None)?,
            issuer_auth_non_rev_mtp,
            issuer_auth_claim: auth_claim,
            claim,
        };
        info!(
            issuer = %credential.issuer_id,
            schema = %credential.claim.schema_hash(),
            "issued credential by signature"
        );
        Ok(credential)
    }
}
