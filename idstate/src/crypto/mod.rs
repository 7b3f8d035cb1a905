// Cryptographic primitives: the field hash used by trees, claims and
// identity states, and the signature scheme bound into auth claims.
pub mod hash;
pub mod signature;

pub use hash::{hash_bytes, hash_elems, hash_leaf, hash_node, MAX_HASH_INPUTS};
pub use signature::{FieldSigner, KeyPair, PublicKey, Signature};
