//! Claim schemas and the registry mapping credential fields to claim slots.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;

pub const SCHEMA_HASH_BYTES: usize = 16;

/// Context and type of the KYC age credential used by the sign-in flow
pub const KYC_V3_CONTEXT: &str =
    "https://raw.githubusercontent.com/iden3/claim-schema-vocab/main/schemas/json-ld/kyc-v3.json-ld";
pub const KYC_AGE_CREDENTIAL: &str = "KYCAgeCredential";

/// 16-byte schema identifier stored in the first index slot of a claim
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaHash(pub [u8; SCHEMA_HASH_BYTES]);

impl SchemaHash {
    /// Schema of auth claims, whose index data carries a public key
    pub const AUTH: SchemaHash = SchemaHash([
        0xca, 0x93, 0x88, 0x57, 0x24, 0x1d, 0xb9, 0x45, 0x1e, 0xa3, 0x29, 0x25, 0x6b, 0x9c, 0x06,
        0xe5,
    ]);

    /// Schema of the KYC age credential: birthday and document type in the index
    pub const KYC_AGE: SchemaHash = SchemaHash([
        0x2e, 0x2d, 0x1c, 0x11, 0xad, 0x3e, 0x50, 0x0d, 0xe6, 0x8d, 0x7c, 0xe1, 0x6a, 0x0a, 0x55,
        0x9e,
    ]);

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())?;
        let raw: [u8; SCHEMA_HASH_BYTES] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::TruncatedInput {
                    expected: SCHEMA_HASH_BYTES,
                    actual: bytes.len(),
                })?;
        Ok(SchemaHash(raw))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The schema as it appears in public signals.
    pub fn to_field_element(&self) -> FieldElement {
        FieldElement::from_le_bytes_reduced(&self.0)
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaHash({})", self.to_hex())
    }
}

impl FromStr for SchemaHash {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        SchemaHash::from_hex(s)
    }
}

impl Serialize for SchemaHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SchemaHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        SchemaHash::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Claim slots that carry credential data
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SlotIndex {
    IndexA = 2,
    IndexB = 3,
    ValueA = 6,
    ValueB = 7,
}

impl SlotIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SlotIndex {
    type Error = IdentityError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            2 => Ok(SlotIndex::IndexA),
            3 => Ok(SlotIndex::IndexB),
            6 => Ok(SlotIndex::ValueA),
            7 => Ok(SlotIndex::ValueB),
            other => Err(IdentityError::InvalidQuery(format!(
                "slot {} does not carry credential data",
                other
            ))),
        }
    }
}

impl From<SlotIndex> for u8 {
    fn from(slot: SlotIndex) -> u8 {
        slot.as_u8()
    }
}

/// Field layout of one credential type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSchema {
    pub context: String,
    pub credential_type: String,
    pub hash: SchemaHash,
    pub fields: BTreeMap<String, SlotIndex>,
}

impl CredentialSchema {
    pub fn new(context: impl Into<String>, credential_type: impl Into<String>, hash: SchemaHash) -> Self {
        CredentialSchema {
            context: context.into(),
            credential_type: credential_type.into(),
            hash,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, slot: SlotIndex) -> Self {
        self.fields.insert(name.into(), slot);
        self
    }

    pub fn slot_of(&self, field: &str) -> Result<SlotIndex> {
        self.fields.get(field).copied().ok_or_else(|| {
            IdentityError::invalid_query(format!(
                "field '{}' is not part of {}",
                field, self.credential_type
            ))
        })
    }

    /// The KYC age credential: `birthday` in slot 2, `documentType` in slot 3.
    pub fn kyc_age() -> Self {
        CredentialSchema::new(KYC_V3_CONTEXT, KYC_AGE_CREDENTIAL, SchemaHash::KYC_AGE)
            .with_field("birthday", SlotIndex::IndexA)
            .with_field("documentType", SlotIndex::IndexB)
    }
}

/// Known credential schemas, keyed by (context, type)
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<(String, String), CredentialSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the KYC age credential.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CredentialSchema::kyc_age());
        registry
    }

    pub fn register(&mut self, schema: CredentialSchema) {
        self.schemas.insert(
            (schema.context.clone(), schema.credential_type.clone()),
            schema,
        );
    }

    pub fn resolve(&self, context: &str, credential_type: &str) -> Result<&CredentialSchema> {
        self.schemas
            .get(&(context.to_string(), credential_type.to_string()))
            .ok_or_else(|| {
                IdentityError::invalid_query(format!(
                    "unknown credential type {} in context {}",
                    credential_type, context
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
