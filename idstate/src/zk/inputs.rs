//! Private inputs of each circuit

use serde::{Deserialize, Serialize};

use crate::auth::query::CircuitQuery;
use crate::claim::codec::Claim;
use crate::core::identity::state::TreeState;
use crate::crypto::signature::Signature;
use crate::merkle::sparse_merkle_tree::Proof;
use crate::types::field::FieldElement;
use crate::types::identifier::Identifier;

/// Inputs proving a move from `old_tree_state` to `new_tree_state`, signed by
/// a key whose auth claim is included and unrevoked in the old state and
/// still included in the new one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransitionInputs {
    pub id: Identifier,
    pub old_tree_state: TreeState,
    pub new_tree_state: TreeState,
    pub is_old_state_genesis: bool,
    pub auth_claim: Claim,
    pub auth_claim_inc_mtp: Proof,
    pub auth_claim_non_rev_mtp: Proof,
    pub auth_claim_new_state_inc_mtp: Proof,
    /// Signature over `H(old_state, new_state)`
    pub signature: Signature,
}

/// Inputs proving control of an identity by signing a challenge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInputs {
    pub user_id: Identifier,
    pub tree_state: TreeState,
    pub auth_claim: Claim,
    pub auth_claim_inc_mtp: Proof,
    pub auth_claim_non_rev_mtp: Proof,
    pub challenge: FieldElement,
    pub signature: Signature,
}

/// How the issuer vouches for the queried claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CredentialInputs {
    /// The claim is included in the issuer's claims tree
    #[serde(rename_all = "camelCase")]
    Mtp {
        issuer_claim_state: TreeState,
        claim_inc_mtp: Proof,
    },
    /// The issuer signed the claim hash
    #[serde(rename_all = "camelCase")]
    Sig {
        signature: Signature,
        issuer_auth_claim: Claim,
        issuer_auth_state: TreeState,
        issuer_auth_inc_mtp: Proof,
        issuer_auth_non_rev_mtp: Proof,
    },
}

impl CredentialInputs {
    /// Issuer state the credential is anchored in.
    pub fn issuer_state(&self) -> &TreeState {
        match self {
            CredentialInputs::Mtp {
                issuer_claim_state, ..
            } => issuer_claim_state,
            CredentialInputs::Sig {
                issuer_auth_state, ..
            } => issuer_auth_state,
        }
    }
}

/// Inputs proving that a claim held by `user_id` satisfies `query`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicQueryInputs {
    pub request_id: u32,
    pub user_id: Identifier,
    pub issuer_id: Identifier,
    pub claim: Claim,
    pub credential: CredentialInputs,
    /// Issuer state the revocation status was taken from
    pub issuer_non_rev_state: TreeState,
    pub claim_non_rev_mtp: Proof,
    pub query: CircuitQuery,
    pub timestamp: u64,
}
