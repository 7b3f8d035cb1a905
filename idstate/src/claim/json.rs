//! JSON representation of claims
//!
//! Claims travel between issuer, holder and verifier as structured JSON
//! rather than raw slots. Decoding re-validates every field through
//! [`Claim::encode`], so a JSON claim is always well formed.

use serde::{Deserialize, Serialize};

use crate::claim::codec::{Claim, ClaimFields, Subject};
use crate::claim::schema::SchemaHash;
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::types::identifier::Identifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectPosition {
    #[default]
    None,
    Index,
    Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimJson {
    pub schema: SchemaHash,
    #[serde(default)]
    pub subject_position: SubjectPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    #[serde(default)]
    pub updatable: bool,
    #[serde(default)]
    pub version: u32,
    pub revocation_nonce: u64,
    pub index_data: [FieldElement; 2],
    pub value_data: [FieldElement; 2],
}

impl From<ClaimFields> for ClaimJson {
    fn from(fields: ClaimFields) -> Self {
        let (subject_position, subject_id) = match fields.subject {
            Subject::SelfSubject => (SubjectPosition::None, None),
            Subject::Index(id) => (SubjectPosition::Index, Some(id)),
            Subject::Value(id) => (SubjectPosition::Value, Some(id)),
        };
        ClaimJson {
            schema: fields.schema,
            subject_position,
            subject_id,
            expiration: fields.expiration,
            updatable: fields.updatable,
            version: fields.version,
            revocation_nonce: fields.revocation_nonce,
            index_data: fields.index_data,
            value_data: fields.value_data,
        }
    }
}

impl TryFrom<ClaimJson> for ClaimFields {
    type Error = IdentityError;

    fn try_from(json: ClaimJson) -> Result<Self> {
        let subject = match (json.subject_position, json.subject_id) {
            (SubjectPosition::None, None) => Subject::SelfSubject,
            (SubjectPosition::Index, Some(id)) => Subject::Index(id),
            (SubjectPosition::Value, Some(id)) => Subject::Value(id),
            (SubjectPosition::None, Some(_)) => {
                return Err(IdentityError::InvalidClaim(
                    "subjectId given without a subject position".to_string(),
                ))
            }
            (_, None) => {
                return Err(IdentityError::InvalidClaim(
                    "subject position requires a subjectId".to_string(),
                ))
            }
        };
        Ok(ClaimFields {
            schema: json.schema,
            subject,
            expiration: json.expiration,
            updatable: json.updatable,
            version: json.version,
            revocation_nonce: json.revocation_nonce,
            index_data: json.index_data,
            value_data: json.value_data,
        })
    }
}

impl TryFrom<ClaimJson> for Claim {
    type Error = IdentityError;

    fn try_from(json: ClaimJson) -> Result<Self> {
        Claim::encode(&ClaimFields::try_from(json)?)
    }
}

impl Serialize for Claim {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = self.decode().map_err(serde::ser::Error::custom)?;
        ClaimJson::from(fields).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Claim {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = ClaimJson::deserialize(deserializer)?;
        Claim::try_from(json).map_err(serde::de::Error::custom)
    }
}
