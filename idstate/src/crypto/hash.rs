//! Field hash
//!
//! A fixed-arity hash mapping 1 to 16 field elements to one field element.
//! The digest is blake3 in key-derivation mode over the arity followed by the
//! canonical little-endian encoding of each input, reduced into the field.
//! Tree nodes, claim index/value hashes and identity states all go through
//! [`hash_elems`], so swapping the primitive only touches this file.

use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;

/// Largest number of elements a single hash call accepts
pub const MAX_HASH_INPUTS: usize = 16;

const FIELD_HASH_CONTEXT: &str = "idstate 2024 field hash v1";
const MESSAGE_HASH_CONTEXT: &str = "idstate 2024 message hash v1";

/// Hash 1..=16 field elements into a field element.
pub fn hash_elems(elems: &[FieldElement]) -> Result<FieldElement> {
    if elems.is_empty() || elems.len() > MAX_HASH_INPUTS {
        return Err(IdentityError::internal(format!(
            "field hash takes 1 to {} inputs, got {}",
            MAX_HASH_INPUTS,
            elems.len()
        )));
    }

    let mut hasher = blake3::Hasher::new_derive_key(FIELD_HASH_CONTEXT);
    hasher.update(&[elems.len() as u8]);
    for elem in elems {
        hasher.update(elem.as_le_bytes());
    }
    Ok(FieldElement::from_le_bytes_reduced(hasher.finalize().as_bytes()))
}

/// Hash of a tree leaf: H(key, value, 1)
pub fn hash_leaf(key: &FieldElement, value: &FieldElement) -> Result<FieldElement> {
    hash_elems(&[*key, *value, FieldElement::ONE])
}

/// Hash of an internal tree node: H(left, right)
pub fn hash_node(left: &FieldElement, right: &FieldElement) -> Result<FieldElement> {
    hash_elems(&[*left, *right])
}

/// Hash arbitrary bytes into the field (token signing inputs, challenges).
pub fn hash_bytes(data: &[u8]) -> FieldElement {
    let digest = blake3::derive_key(MESSAGE_HASH_CONTEXT, data);
    FieldElement::from_le_bytes_reduced(&digest)
}
