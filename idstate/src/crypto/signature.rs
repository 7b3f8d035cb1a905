// signature.rs
//
// Ed25519 signatures over field elements. The 32-byte public key is split
// into two 16-byte halves so it can live in the two index-data slots of an
// auth claim, which makes the key part of the identity state.

use std::fmt;

use ed25519_dalek::{
    Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH,
    SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;

const KEY_HALF: usize = PUBLIC_KEY_LENGTH / 2;

/// Anything able to sign field elements on behalf of an identity
///
/// Issuers and holders are generic over this trait so the key can live in
/// memory ([`KeyPair`]) or behind an external signer.
pub trait FieldSigner: Send + Sync {
    fn public_key(&self) -> PublicKey;

    fn sign(&self, message: &FieldElement) -> Result<Signature>;
}

/// In-memory signing key
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        KeyPair {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key derived from arbitrary entropy.
    pub fn from_entropy(entropy: &[u8]) -> Self {
        let seed = blake3::derive_key("idstate 2024 signing key seed", entropy);
        KeyPair {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let seed: [u8; 32] = secret.try_into().map_err(|_| IdentityError::TruncatedInput {
            expected: 32,
            actual: secret.len(),
        })?;
        Ok(KeyPair {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl FieldSigner for KeyPair {
    fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    fn sign(&self, message: &FieldElement) -> Result<Signature> {
        let signature = self.signing_key.sign(message.as_le_bytes());
        Ok(Signature(signature.to_bytes()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| IdentityError::TruncatedInput {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            })?;
        VerifyingKey::from_bytes(&raw)
            .map(PublicKey)
            .map_err(|e| IdentityError::Signature(format!("invalid public key: {}", e)))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }

    /// The key as two field elements, low half first.
    pub fn to_claim_slots(&self) -> Result<(FieldElement, FieldElement)> {
        let bytes = self.to_bytes();
        Ok((
            FieldElement::from_le_slice(&bytes[..KEY_HALF])?,
            FieldElement::from_le_slice(&bytes[KEY_HALF..])?,
        ))
    }

    /// Inverse of [`PublicKey::to_claim_slots`].
    pub fn from_claim_slots(low: &FieldElement, high: &FieldElement) -> Result<Self> {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        for (half, slot) in [(0, low), (KEY_HALF, high)] {
            let slot_bytes = slot.to_le_bytes();
            if slot_bytes[KEY_HALF..].iter().any(|b| *b != 0) {
                return Err(IdentityError::InvalidClaim(
                    "public key half exceeds 16 bytes".to_string(),
                ));
            }
            bytes[half..half + KEY_HALF].copy_from_slice(&slot_bytes[..KEY_HALF]);
        }
        Self::from_bytes(&bytes)
    }

    pub fn verify(&self, message: &FieldElement, signature: &Signature) -> bool {
        let signature = Ed25519Signature::from_bytes(&signature.0);
        self.0.verify(message.as_le_bytes(), &signature).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        PublicKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; SIGNATURE_LENGTH] =
            bytes.try_into().map_err(|_| IdentityError::TruncatedInput {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(Signature(raw))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        Signature::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
