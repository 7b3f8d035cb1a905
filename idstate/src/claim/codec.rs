//! Claim codec
//!
//! A claim is eight field-element slots: four index slots (hashed to `hi`)
//! and four value slots (hashed to `hv`). Only the index part decides the
//! position of the claim in the claims tree.
//!
//! ```text
//! i_0  schema[0..16] | flags[16] | reserved[17..20] | version u32 LE [20..24]
//! i_1  subject identifier when the subject sits in the index
//! i_2  index data A
//! i_3  index data B
//! v_0  revocation nonce u64 LE [0..8] | expiration u64 LE [8..16]
//! v_1  subject identifier when the subject sits in the value
//! v_2  value data A
//! v_3  value data B
//! ```
//!
//! Flag bits: 0..3 subject position, 3 expiration present, 4 updatable.

use num_bigint::BigUint;

use crate::claim::schema::{SchemaHash, SlotIndex, SCHEMA_HASH_BYTES};
use crate::crypto::hash::hash_elems;
use crate::types::error::{IdentityError, Result};
use crate::types::field::{FieldElement, FIELD_BYTES};
use crate::types::identifier::{Identifier, ID_BYTES};

/// Serialized size of a claim: eight 32-byte slots
pub const CLAIM_BYTES: usize = 8 * FIELD_BYTES;

const FLAGS_BYTE: usize = SCHEMA_HASH_BYTES;
const VERSION_OFFSET: usize = 20;
const SUBJECT_MASK: u8 = 0b0000_0111;
const SUBJECT_SELF: u8 = 0b000;
const SUBJECT_INDEX: u8 = 0b010;
const SUBJECT_VALUE: u8 = 0b011;
const FLAG_EXPIRATION: u8 = 0b0000_1000;
const FLAG_UPDATABLE: u8 = 0b0001_0000;
const FLAGS_UNSUPPORTED: u8 = 0b1110_0000;

/// Where the subject identifier of a claim is stored
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Subject {
    /// The claim is about its issuer (auth claims)
    #[default]
    SelfSubject,
    Index(Identifier),
    Value(Identifier),
}

impl Subject {
    pub fn id(&self) -> Option<Identifier> {
        match self {
            Subject::SelfSubject => None,
            Subject::Index(id) | Subject::Value(id) => Some(*id),
        }
    }
}

/// Structured form of a claim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimFields {
    pub schema: SchemaHash,
    pub subject: Subject,
    pub expiration: Option<u64>,
    pub updatable: bool,
    pub version: u32,
    pub revocation_nonce: u64,
    pub index_data: [FieldElement; 2],
    pub value_data: [FieldElement; 2],
}

impl ClaimFields {
    pub fn new(schema: SchemaHash) -> Self {
        ClaimFields {
            schema,
            subject: Subject::SelfSubject,
            expiration: None,
            updatable: false,
            version: 0,
            revocation_nonce: 0,
            index_data: [FieldElement::ZERO; 2],
            value_data: [FieldElement::ZERO; 2],
        }
    }

    pub fn with_index_id(mut self, id: Identifier) -> Self {
        self.subject = Subject::Index(id);
        self
    }

    pub fn with_value_id(mut self, id: Identifier) -> Self {
        self.subject = Subject::Value(id);
        self
    }

    pub fn with_expiration(mut self, expiration: u64) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_revocation_nonce(mut self, nonce: u64) -> Self {
        self.revocation_nonce = nonce;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    pub fn with_index_data(mut self, a: FieldElement, b: FieldElement) -> Self {
        self.index_data = [a, b];
        self
    }

    pub fn with_value_data(mut self, a: FieldElement, b: FieldElement) -> Self {
        self.value_data = [a, b];
        self
    }

    /// Set index data from arbitrary integers, failing when one does not fit the field.
    pub fn with_index_data_ints(self, a: &BigUint, b: &BigUint) -> Result<Self> {
        let (a, b) = (FieldElement::from_biguint(a)?, FieldElement::from_biguint(b)?);
        Ok(self.with_index_data(a, b))
    }

    /// Set value data from arbitrary integers, failing when one does not fit the field.
    pub fn with_value_data_ints(self, a: &BigUint, b: &BigUint) -> Result<Self> {
        let (a, b) = (FieldElement::from_biguint(a)?, FieldElement::from_biguint(b)?);
        Ok(self.with_value_data(a, b))
    }
}

/// Encoded claim
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Claim {
    index: [FieldElement; 4],
    value: [FieldElement; 4],
}

fn id_slot(id: &Identifier) -> Result<FieldElement> {
    FieldElement::from_le_slice(id.as_bytes())
}

impl Claim {
    /// Encode structured fields into slots.
    pub fn encode(fields: &ClaimFields) -> Result<Self> {
        let mut header = [0u8; FIELD_BYTES];
        header[..SCHEMA_HASH_BYTES].copy_from_slice(&fields.schema.0);
        let mut flags = match fields.subject {
            Subject::SelfSubject => SUBJECT_SELF,
            Subject::Index(_) => SUBJECT_INDEX,
            Subject::Value(_) => SUBJECT_VALUE,
        };
        if fields.expiration.is_some() {
            flags |= FLAG_EXPIRATION;
        }
        if fields.updatable {
            flags |= FLAG_UPDATABLE;
        }
        header[FLAGS_BYTE] = flags;
        header[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&fields.version.to_le_bytes());

        let mut revocation = [0u8; FIELD_BYTES];
        revocation[..8].copy_from_slice(&fields.revocation_nonce.to_le_bytes());
        revocation[8..16].copy_from_slice(&fields.expiration.unwrap_or(0).to_le_bytes());

        let (index_subject, value_subject) = match &fields.subject {
            Subject::SelfSubject => (FieldElement::ZERO, FieldElement::ZERO),
            Subject::Index(id) => (id_slot(id)?, FieldElement::ZERO),
            Subject::Value(id) => (FieldElement::ZERO, id_slot(id)?),
        };

        Ok(Claim {
            index: [
                FieldElement::from_le_bytes(header)?,
                index_subject,
                fields.index_data[0],
                fields.index_data[1],
            ],
            value: [
                FieldElement::from_le_bytes(revocation)?,
                value_subject,
                fields.value_data[0],
                fields.value_data[1],
            ],
        })
    }

    /// Decode the slots back into structured fields.
    pub fn decode(&self) -> Result<ClaimFields> {
        let header = self.index[0].to_le_bytes();
        let flags = header[FLAGS_BYTE];
        if flags & FLAGS_UNSUPPORTED != 0 {
            return Err(IdentityError::InvalidClaim(format!(
                "unsupported flag bits {:#010b}",
                flags
            )));
        }
        if header[FLAGS_BYTE + 1..VERSION_OFFSET].iter().any(|b| *b != 0)
            || header[VERSION_OFFSET + 4..].iter().any(|b| *b != 0)
        {
            return Err(IdentityError::InvalidClaim(
                "reserved header bytes are set".to_string(),
            ));
        }

        let subject = match flags & SUBJECT_MASK {
            SUBJECT_SELF => Subject::SelfSubject,
            SUBJECT_INDEX => Subject::Index(slot_identifier(&self.index[1])?),
            SUBJECT_VALUE => Subject::Value(slot_identifier(&self.value[1])?),
            other => {
                return Err(IdentityError::InvalidClaim(format!(
                    "unknown subject position {:#05b}",
                    other
                )))
            }
        };

        let mut version = [0u8; 4];
        version.copy_from_slice(&header[VERSION_OFFSET..VERSION_OFFSET + 4]);

        let mut schema = [0u8; SCHEMA_HASH_BYTES];
        schema.copy_from_slice(&header[..SCHEMA_HASH_BYTES]);

        Ok(ClaimFields {
            schema: SchemaHash(schema),
            subject,
            expiration: self.expiration(),
            updatable: flags & FLAG_UPDATABLE != 0,
            version: u32::from_le_bytes(version),
            revocation_nonce: self.revocation_nonce(),
            index_data: [self.index[2], self.index[3]],
            value_data: [self.value[2], self.value[3]],
        })
    }

    /// Decode, requiring the claim to carry `schema`.
    pub fn decode_as(&self, schema: &SchemaHash) -> Result<ClaimFields> {
        let found = self.schema_hash();
        if found != *schema {
            return Err(IdentityError::SchemaMismatch {
                expected: schema.to_hex(),
                found: found.to_hex(),
            });
        }
        self.decode()
    }

    pub fn from_slots(index: [FieldElement; 4], value: [FieldElement; 4]) -> Self {
        Claim { index, value }
    }

    pub fn index_slots(&self) -> &[FieldElement; 4] {
        &self.index
    }

    pub fn value_slots(&self) -> &[FieldElement; 4] {
        &self.value
    }

    /// One of the data-carrying slots.
    pub fn slot(&self, slot: SlotIndex) -> FieldElement {
        match slot {
            SlotIndex::IndexA => self.index[2],
            SlotIndex::IndexB => self.index[3],
            SlotIndex::ValueA => self.value[2],
            SlotIndex::ValueB => self.value[3],
        }
    }

    pub fn schema_hash(&self) -> SchemaHash {
        let mut schema = [0u8; SCHEMA_HASH_BYTES];
        schema.copy_from_slice(&self.index[0].as_le_bytes()[..SCHEMA_HASH_BYTES]);
        SchemaHash(schema)
    }

    pub fn revocation_nonce(&self) -> u64 {
        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&self.value[0].as_le_bytes()[..8]);
        u64::from_le_bytes(nonce)
    }

    pub fn expiration(&self) -> Option<u64> {
        if self.index[0].as_le_bytes()[FLAGS_BYTE] & FLAG_EXPIRATION == 0 {
            return None;
        }
        let mut expiration = [0u8; 8];
        expiration.copy_from_slice(&self.value[0].as_le_bytes()[8..16]);
        Some(u64::from_le_bytes(expiration))
    }

    /// Subject identifier, if the claim names one.
    pub fn subject_id(&self) -> Result<Option<Identifier>> {
        Ok(self.decode()?.subject.id())
    }

    /// (hi, hv): the claim's key and value in the claims tree.
    pub fn hi_hv(&self) -> Result<(FieldElement, FieldElement)> {
        Ok((hash_elems(&self.index)?, hash_elems(&self.value)?))
    }

    /// H(hi, hv), the message signed when issuing by signature.
    pub fn hash(&self) -> Result<FieldElement> {
        let (hi, hv) = self.hi_hv()?;
        hash_elems(&[hi, hv])
    }

    pub fn to_bytes(&self) -> [u8; CLAIM_BYTES] {
        let mut bytes = [0u8; CLAIM_BYTES];
        for (i, slot) in self.index.iter().chain(self.value.iter()).enumerate() {
            bytes[i * FIELD_BYTES..(i + 1) * FIELD_BYTES].copy_from_slice(slot.as_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != CLAIM_BYTES {
            return Err(IdentityError::TruncatedInput {
                expected: CLAIM_BYTES,
                actual: bytes.len(),
            });
        }
        let mut slots = [FieldElement::ZERO; 8];
        for (slot, chunk) in slots.iter_mut().zip(bytes.chunks_exact(FIELD_BYTES)) {
            *slot = FieldElement::from_le_slice(chunk)?;
        }
        Ok(Claim {
            index: [slots[0], slots[1], slots[2], slots[3]],
            value: [slots[4], slots[5], slots[6], slots[7]],
        })
    }
}

fn slot_identifier(slot: &FieldElement) -> Result<Identifier> {
    let bytes = slot.to_le_bytes();
    if bytes[ID_BYTES..].iter().any(|b| *b != 0) {
        return Err(IdentityError::InvalidClaim(
            "subject slot is wider than an identifier".to_string(),
        ));
    }
    Identifier::from_bytes(&bytes[..ID_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::identifier::IdType;
    use proptest::prelude::*;

    fn subject() -> Identifier {
        Identifier::from_genesis_state(IdType::DEFAULT, &FieldElement::from_u64(123_456))
    }

    fn age_claim() -> ClaimFields {
        ClaimFields::new(SchemaHash::KYC_AGE)
            .with_index_id(subject())
            .with_index_data(FieldElement::from_u64(19960424), FieldElement::from_u64(1))
            .with_expiration(12_345_654_321)
            .with_revocation_nonce(1_909_830_690)
    }

    #[test]
    fn test_layout() -> Result<()> {
        let claim = Claim::encode(&age_claim())?;
        let header = claim.index_slots()[0].to_le_bytes();
        assert_eq!(&header[..16], &SchemaHash::KYC_AGE.0);
        assert_eq!(header[16], SUBJECT_INDEX | FLAG_EXPIRATION);
        assert_eq!(claim.slot(SlotIndex::IndexA), FieldElement::from_u64(19960424));
        assert_eq!(claim.slot(SlotIndex::IndexB), FieldElement::from_u64(1));
        assert_eq!(claim.revocation_nonce(), 1_909_830_690);
        assert_eq!(claim.expiration(), Some(12_345_654_321));
        assert_eq!(claim.subject_id()?, Some(subject()));
        Ok(())
    }

    #[test]
    fn test_decode_round_trip() -> Result<()> {
        let fields = age_claim().with_version(3).with_updatable(true);
        let claim = Claim::encode(&fields)?;
        assert_eq!(claim.decode()?, fields);

        let value_subject = ClaimFields::new(SchemaHash::KYC_AGE).with_value_id(subject());
        assert_eq!(Claim::encode(&value_subject)?.decode()?, value_subject);
        Ok(())
    }

    #[test]
    fn test_schema_mismatch() -> Result<()> {
        let claim = Claim::encode(&age_claim())?;
        assert!(matches!(
            claim.decode_as(&SchemaHash::AUTH),
            Err(IdentityError::SchemaMismatch { .. })
        ));
        assert!(claim.decode_as(&SchemaHash::KYC_AGE).is_ok());
        Ok(())
    }

    #[test]
    fn test_overflowing_data_is_rejected() {
        let p = crate::types::field::modulus();
        let result = ClaimFields::new(SchemaHash::KYC_AGE)
            .with_index_data_ints(&p, &BigUint::from(1u32));
        assert!(matches!(result, Err(IdentityError::FieldOverflow(_))));
    }

    #[test]
    fn test_from_bytes_validation() -> Result<()> {
        let claim = Claim::encode(&age_claim())?;
        let bytes = claim.to_bytes();
        assert_eq!(Claim::from_bytes(&bytes)?, claim);
        assert!(matches!(
            Claim::from_bytes(&bytes[..100]),
            Err(IdentityError::TruncatedInput { .. })
        ));

        let mut overflowing = bytes;
        overflowing[2 * FIELD_BYTES..3 * FIELD_BYTES].copy_from_slice(&[0xff; FIELD_BYTES]);
        assert!(matches!(
            Claim::from_bytes(&overflowing),
            Err(IdentityError::FieldOverflow(_))
        ));
        Ok(())
    }

    #[test]
    fn test_index_hash_ignores_value() -> Result<()> {
        let a = Claim::encode(&age_claim())?;
        let b = Claim::encode(&age_claim().with_value_data(FieldElement::from_u64(9), FieldElement::ZERO))?;
        let (hi_a, hv_a) = a.hi_hv()?;
        let (hi_b, hv_b) = b.hi_hv()?;
        assert_eq!(hi_a, hi_b);
        assert_ne!(hv_a, hv_b);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_encode_decode(
            nonce in any::<u64>(),
            expiration in proptest::option::of(any::<u64>()),
            version in any::<u32>(),
            updatable in any::<bool>(),
            index in (any::<u64>(), any::<u64>()),
            value in (any::<u64>(), any::<u64>()),
        ) {
            let mut fields = ClaimFields::new(SchemaHash::KYC_AGE)
                .with_index_id(subject())
                .with_revocation_nonce(nonce)
                .with_version(version)
                .with_updatable(updatable)
                .with_index_data(index.0.into(), index.1.into())
                .with_value_data(value.0.into(), value.1.into());
            fields.expiration = expiration;

            let claim = Claim::encode(&fields).unwrap();
            prop_assert_eq!(claim.decode().unwrap(), fields);
            prop_assert_eq!(Claim::from_bytes(&claim.to_bytes()).unwrap(), claim);
        }
    }
}
