//! Prime field element
//!
//! Every hash, tree key, claim slot and public signal is an element of the
//! BN254 scalar field. Elements are kept as 32 little-endian bytes and are
//! guaranteed canonical (strictly below the modulus) by every constructor.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::error::{IdentityError, Result};

/// Field modulus, big-endian.
/// 21888242871839275222246405745257275088548364400416034343698204186575808495617
const MODULUS_BE: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58, 0x5d,
    0x28, 0x33, 0xe8, 0x48, 0x79, 0xb9, 0x70, 0x91, 0x43, 0xe1, 0xf5, 0x93, 0xf0, 0x00, 0x00, 0x01,
];

/// Number of bytes in the canonical encoding
pub const FIELD_BYTES: usize = 32;

/// The field modulus as a big integer
pub fn modulus() -> BigUint {
    BigUint::from_bytes_be(&MODULUS_BE)
}

/// Compare little-endian bytes against the modulus, most significant byte first.
fn is_canonical(le: &[u8; FIELD_BYTES]) -> bool {
    for (byte, modulus_byte) in le.iter().rev().zip(MODULUS_BE.iter()) {
        match byte.cmp(modulus_byte) {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
    }
    false
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldElement([u8; FIELD_BYTES]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0u8; FIELD_BYTES]);
    pub const ONE: FieldElement = {
        let mut bytes = [0u8; FIELD_BYTES];
        bytes[0] = 1;
        FieldElement(bytes)
    };

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; FIELD_BYTES];
        bytes[..8].copy_from_slice(&value.to_le_bytes());
        FieldElement(bytes)
    }

    /// Build an element from 32 little-endian bytes, rejecting non-canonical values.
    pub fn from_le_bytes(bytes: [u8; FIELD_BYTES]) -> Result<Self> {
        if !is_canonical(&bytes) {
            return Err(IdentityError::FieldOverflow(format!(
                "0x{} is not below the field modulus",
                hex::encode(bytes.iter().rev().copied().collect::<Vec<u8>>())
            )));
        }
        Ok(FieldElement(bytes))
    }

    /// Build an element from up to 32 little-endian bytes, zero-extending.
    pub fn from_le_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FIELD_BYTES {
            return Err(IdentityError::FieldOverflow(format!(
                "{} bytes do not fit in a field element",
                bytes.len()
            )));
        }
        let mut padded = [0u8; FIELD_BYTES];
        padded[..bytes.len()].copy_from_slice(bytes);
        Self::from_le_bytes(padded)
    }

    /// Reduce arbitrary little-endian bytes modulo the field.
    pub fn from_le_bytes_reduced(bytes: &[u8]) -> Self {
        Self::from_biguint_reduced(&BigUint::from_bytes_le(bytes))
    }

    pub fn from_biguint(value: &BigUint) -> Result<Self> {
        if *value >= modulus() {
            return Err(IdentityError::FieldOverflow(format!(
                "{} is not below the field modulus",
                value
            )));
        }
        Ok(Self::from_biguint_unchecked(value))
    }

    pub fn from_biguint_reduced(value: &BigUint) -> Self {
        Self::from_biguint_unchecked(&(value % modulus()))
    }

    fn from_biguint_unchecked(value: &BigUint) -> Self {
        let mut bytes = [0u8; FIELD_BYTES];
        let le = value.to_bytes_le();
        bytes[..le.len()].copy_from_slice(&le);
        FieldElement(bytes)
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.0)
    }

    pub fn to_le_bytes(&self) -> [u8; FIELD_BYTES] {
        self.0
    }

    pub fn as_le_bytes(&self) -> &[u8; FIELD_BYTES] {
        &self.0
    }

    /// Value of bit `index`, counting from the least significant bit.
    pub fn test_bit(&self, index: usize) -> bool {
        if index >= FIELD_BYTES * 8 {
            return false;
        }
        (self.0[index / 8] >> (index % 8)) & 1 == 1
    }

    /// The value as a `u64` when it fits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.0[8..].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[..8]);
        Some(u64::from_le_bytes(low))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Ord for FieldElement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for FieldElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        FieldElement::from_u64(value)
    }
}

impl From<u32> for FieldElement {
    fn from(value: u32) -> Self {
        FieldElement::from_u64(u64::from(value))
    }
}

impl From<bool> for FieldElement {
    fn from(value: bool) -> Self {
        if value {
            FieldElement::ONE
        } else {
            FieldElement::ZERO
        }
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_biguint())
    }
}

impl FromStr for FieldElement {
    type Err = IdentityError;

    /// Parses the decimal form produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        let value = BigUint::parse_bytes(s.trim().as_bytes(), 10).ok_or_else(|| {
            IdentityError::Serialization(format!("'{}' is not a decimal field element", s))
        })?;
        FieldElement::from_biguint(&value)
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct FieldElementVisitor;

impl<'de> Visitor<'de> for FieldElementVisitor {
    type Value = FieldElement;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or unsigned integer below the field modulus")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<FieldElement, E> {
        Ok(FieldElement::from_u64(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<FieldElement, E> {
        u64::try_from(value)
            .map(FieldElement::from_u64)
            .map_err(|_| E::custom("negative values are not field elements"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<FieldElement, E> {
        value.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(FieldElementVisitor)
    }
}
