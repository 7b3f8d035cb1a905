//! Credential issuer
//!
//! An issuer is an identity that vouches for claims about other identities,
//! either by signing the claim hash ([`signature`]) or by adding the claim to
//! its claims tree through a proven state transition ([`inclusion`]).
//!
//! The identity lives behind a read-write lock. Reads (signing, proofs of the
//! current state) share it; transitions hold the write lock from the moment
//! the old state is read until the new trees are committed, so concurrent
//! issuances are serialized and each one builds on the previous new state.

pub mod inclusion;
pub mod signature;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::claim::codec::Claim;
use crate::core::identity::genesis::Identity;
use crate::core::identity::state::TreeState;
use crate::crypto::signature::{FieldSigner, KeyPair, PublicKey};
use crate::merkle::sparse_merkle_tree::Proof;
use crate::types::error::{IdentityError, Result};
use crate::types::identifier::Identifier;

pub use inclusion::{IncludedCredential, InclusionIssuance, StateTransitionProof};
pub use signature::SignedCredential;

/// Revocation status of a nonce at a given issuer state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationStatus {
    pub issuer: TreeState,
    pub mtp: Proof,
}

impl RevocationStatus {
    pub fn is_revoked(&self) -> bool {
        self.mtp.existence
    }
}

/// Source of revocation statuses for holders building query proofs
pub trait RevocationStatusSource {
    fn revocation_status(&self, issuer: &Identifier, nonce: u64) -> Result<RevocationStatus>;
}

pub struct Issuer<S: FieldSigner = KeyPair> {
    signer: S,
    identity: RwLock<Identity>,
}

impl<S: FieldSigner> Issuer<S> {
    /// Create an issuer at its genesis state, with an auth claim for the
    /// signer's key carrying `auth_revocation_nonce`.
    pub fn new(signer: S, auth_revocation_nonce: u64) -> Result<Self> {
        let identity = Identity::from_public_key(&signer.public_key(), auth_revocation_nonce)?;
        Ok(Issuer {
            signer,
            identity: RwLock::new(identity),
        })
    }

    pub fn id(&self) -> Identifier {
        self.identity.read().id()
    }

    pub fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    pub fn auth_claim(&self) -> Claim {
        self.identity.read().auth_claim().clone()
    }

    pub fn tree_state(&self) -> Result<TreeState> {
        self.identity.read().tree_state()
    }

    pub fn genesis_state(&self) -> TreeState {
        self.identity.read().genesis_state()
    }

    /// Snapshot of the identity (trees included).
    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    /// Current revocation status of `nonce`.
    pub fn revocation_status_of(&self, nonce: u64) -> Result<RevocationStatus> {
        let identity = self.identity.read();
        Ok(RevocationStatus {
            issuer: identity.tree_state()?,
            mtp: identity.trees().revocation_proof(nonce, None)?,
        })
    }

    pub(crate) fn signer(&self) -> &S {
        &self.signer
    }

    pub(crate) fn identity_lock(&self) -> &RwLock<Identity> {
        &self.identity
    }
}

impl<S: FieldSigner> RevocationStatusSource for Issuer<S> {
    fn revocation_status(&self, issuer: &Identifier, nonce: u64) -> Result<RevocationStatus> {
        if *issuer != self.id() {
            return Err(IdentityError::StateNotFound(format!(
                "no revocation status for issuer {}",
                issuer
            )));
        }
        self.revocation_status_of(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_issuer_is_at_genesis() -> Result<()> {
        let issuer = Issuer::new(KeyPair::from_entropy(b"issuer"), 1)?;
        assert_eq!(issuer.tree_state()?, issuer.genesis_state());
        assert!(issuer.id().is_genesis_state(&issuer.tree_state()?.state));

        let status = issuer.revocation_status_of(1)?;
        assert!(!status.is_revoked());
        assert!(issuer.revocation_status(&issuer.id(), 1).is_ok());
        Ok(())
    }
}
