//! Identity identifiers
//!
//! An identifier is 31 bytes: a two-byte type, 27 bytes taken from the
//! genesis state and a two-byte checksum. Because the genesis bytes come from
//! the first state of the identity, the identifier commits to its genesis
//! state and can be checked against it without any registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;

pub const ID_BYTES: usize = 31;
pub const ID_TYPE_BYTES: usize = 2;
pub const GENESIS_BYTES: usize = 27;
const CHECKSUM_OFFSET: usize = ID_TYPE_BYTES + GENESIS_BYTES;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdType(pub [u8; ID_TYPE_BYTES]);

impl IdType {
    pub const DEFAULT: IdType = IdType([0x00, 0x00]);
}

impl Default for IdType {
    fn default() -> Self {
        IdType::DEFAULT
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; ID_BYTES]);

fn checksum(type_and_genesis: &[u8]) -> [u8; 2] {
    type_and_genesis
        .iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
        .to_le_bytes()
}

impl Identifier {
    /// Derive the identifier of an identity from its genesis state.
    pub fn from_genesis_state(id_type: IdType, state: &FieldElement) -> Self {
        let state_bytes = state.to_le_bytes();
        let mut bytes = [0u8; ID_BYTES];
        bytes[..ID_TYPE_BYTES].copy_from_slice(&id_type.0);
        bytes[ID_TYPE_BYTES..CHECKSUM_OFFSET]
            .copy_from_slice(&state_bytes[state_bytes.len() - GENESIS_BYTES..]);
        let sum = checksum(&bytes[..CHECKSUM_OFFSET]);
        bytes[CHECKSUM_OFFSET..].copy_from_slice(&sum);
        Identifier(bytes)
    }

    /// Parse raw identifier bytes, validating length and checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != ID_BYTES {
            return Err(IdentityError::TruncatedInput {
                expected: ID_BYTES,
                actual: bytes.len(),
            });
        }
        let expected = checksum(&bytes[..CHECKSUM_OFFSET]);
        if bytes[CHECKSUM_OFFSET..] != expected {
            return Err(IdentityError::InvalidIdentifier(format!(
                "checksum mismatch for {}",
                hex::encode(bytes)
            )));
        }
        let mut id = [0u8; ID_BYTES];
        id.copy_from_slice(bytes);
        Ok(Identifier(id))
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    pub fn id_type(&self) -> IdType {
        IdType([self.0[0], self.0[1]])
    }

    pub fn genesis_bytes(&self) -> &[u8] {
        &self.0[ID_TYPE_BYTES..CHECKSUM_OFFSET]
    }

    /// The identifier as a field element (31 little-endian bytes always fit).
    pub fn to_field_element(&self) -> FieldElement {
        let mut bytes = [0u8; 32];
        bytes[..ID_BYTES].copy_from_slice(&self.0);
        FieldElement::from_le_bytes_reduced(&bytes)
    }

    pub fn from_field_element(value: &FieldElement) -> Result<Self> {
        let bytes = value.to_le_bytes();
        if bytes[ID_BYTES] != 0 {
            return Err(IdentityError::InvalidIdentifier(format!(
                "{} does not fit in {} bytes",
                value, ID_BYTES
            )));
        }
        Self::from_bytes(&bytes[..ID_BYTES])
    }

    /// True when `state` is the genesis state this identifier was derived from.
    pub fn is_genesis_state(&self, state: &FieldElement) -> bool {
        Identifier::from_genesis_state(self.id_type(), state) == *self
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", hex::encode(self.0))
    }
}

impl FromStr for Identifier {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())?;
        Identifier::from_bytes(&bytes)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}
