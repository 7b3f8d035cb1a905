// idstate library entry point
//
// Self-sovereign identity primitives: the claim codec, sparse Merkle trees,
// the three-tree identity state, credential issuance and the verifier side of
// the zero-knowledge authorization flow.

pub mod auth;
pub mod claim;
pub mod core;
pub mod crypto;
pub mod holder;
pub mod issuer;
pub mod merkle;
pub mod types;
pub mod utils;
pub mod zk;

pub use crate::auth::verifier::{SessionStatus, VerifiedHolder, Verifier, VerifierConfig};
pub use crate::claim::{Claim, ClaimFields, SchemaHash, SlotIndex, Subject};
pub use crate::core::identity::{Identity, IdentityTrees, TreeState};
pub use crate::crypto::signature::{FieldSigner, KeyPair, PublicKey, Signature};
pub use crate::holder::Holder;
pub use crate::issuer::Issuer;
pub use crate::merkle::sparse_merkle_tree::{Proof, SparseMerkleTree};
pub use crate::types::error::{ErrorKind, IdentityError, Result};
pub use crate::types::field::FieldElement;
pub use crate::types::identifier::{IdType, Identifier};

/// Returns the version of the library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
