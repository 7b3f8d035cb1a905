//! Public signal layouts
//!
//! Each circuit exposes a fixed, ordered list of field elements. These types
//! give the positions names and convert in both directions.
//!
//! | circuit          | signals                                                          |
//! |------------------|------------------------------------------------------------------|
//! | authV2           | userID, userState, challenge                                     |
//! | stateTransition  | userID, oldState, newState, isOldStateGenesis                    |
//! | atomic query     | requestID, userID, issuerID, issuerState, issuerNonRevState,     |
//! |                  | isRevocationChecked, timestamp, claimSchema, slotIndex,          |
//! |                  | operator, queryHash, value[64]                                   |

use crate::auth::query::{Operator, MAX_QUERY_VALUES};
use crate::claim::schema::{SchemaHash, SlotIndex, SCHEMA_HASH_BYTES};
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::types::identifier::Identifier;

fn expect_len(signals: &[FieldElement], expected: usize, circuit: &str) -> Result<()> {
    if signals.len() != expected {
        return Err(IdentityError::verification(format!(
            "{} expects {} public signals, got {}",
            circuit,
            expected,
            signals.len()
        )));
    }
    Ok(())
}

fn to_bool(signal: &FieldElement) -> Result<bool> {
    match signal.to_u64() {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(IdentityError::verification(format!(
            "{} is not a boolean signal",
            signal
        ))),
    }
}

fn to_u64(signal: &FieldElement, name: &str) -> Result<u64> {
    signal
        .to_u64()
        .ok_or_else(|| IdentityError::verification(format!("{} signal out of range", name)))
}

fn to_u8(signal: &FieldElement, name: &str) -> Result<u8> {
    u8::try_from(to_u64(signal, name)?)
        .map_err(|_| IdentityError::verification(format!("{} signal out of range", name)))
}

fn to_identifier(signal: &FieldElement) -> Result<Identifier> {
    Identifier::from_field_element(signal)
        .map_err(|e| IdentityError::verification(format!("malformed identifier signal: {}", e)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthPubSignals {
    pub user_id: Identifier,
    pub user_state: FieldElement,
    pub challenge: FieldElement,
}

impl AuthPubSignals {
    pub const LEN: usize = 3;

    pub fn to_signals(&self) -> Vec<FieldElement> {
        vec![self.user_id.to_field_element(), self.user_state, self.challenge]
    }

    pub fn from_signals(signals: &[FieldElement]) -> Result<Self> {
        expect_len(signals, Self::LEN, "authV2")?;
        Ok(AuthPubSignals {
            user_id: to_identifier(&signals[0])?,
            user_state: signals[1],
            challenge: signals[2],
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateTransitionPubSignals {
    pub user_id: Identifier,
    pub old_state: FieldElement,
    pub new_state: FieldElement,
    pub is_old_state_genesis: bool,
}

impl StateTransitionPubSignals {
    pub const LEN: usize = 4;

    pub fn to_signals(&self) -> Vec<FieldElement> {
        vec![
            self.user_id.to_field_element(),
            self.old_state,
            self.new_state,
            FieldElement::from(self.is_old_state_genesis),
        ]
    }

    pub fn from_signals(signals: &[FieldElement]) -> Result<Self> {
        expect_len(signals, Self::LEN, "stateTransition")?;
        Ok(StateTransitionPubSignals {
            user_id: to_identifier(&signals[0])?,
            old_state: signals[1],
            new_state: signals[2],
            is_old_state_genesis: to_bool(&signals[3])?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtomicQueryPubSignals {
    pub request_id: u32,
    pub user_id: Identifier,
    pub issuer_id: Identifier,
    /// Issuer state the credential is anchored in
    pub issuer_state: FieldElement,
    pub issuer_non_rev_state: FieldElement,
    pub is_revocation_checked: bool,
    pub timestamp: u64,
    pub claim_schema: SchemaHash,
    pub slot_index: SlotIndex,
    pub operator: Operator,
    pub query_hash: FieldElement,
    /// Operand values padded to 64
    pub values: Vec<FieldElement>,
}

impl AtomicQueryPubSignals {
    const HEADER_LEN: usize = 11;
    pub const LEN: usize = Self::HEADER_LEN + MAX_QUERY_VALUES;

    pub fn to_signals(&self) -> Result<Vec<FieldElement>> {
        if self.values.len() != MAX_QUERY_VALUES {
            return Err(IdentityError::internal(format!(
                "query signals carry {} values, expected {}",
                self.values.len(),
                MAX_QUERY_VALUES
            )));
        }
        let mut signals = vec![
            FieldElement::from(self.request_id),
            self.user_id.to_field_element(),
            self.issuer_id.to_field_element(),
            self.issuer_state,
            self.issuer_non_rev_state,
            FieldElement::from(self.is_revocation_checked),
            FieldElement::from_u64(self.timestamp),
            self.claim_schema.to_field_element(),
            FieldElement::from(u64::from(self.slot_index.as_u8())),
            FieldElement::from(u64::from(self.operator.code())),
            self.query_hash,
        ];
        signals.extend_from_slice(&self.values);
        Ok(signals)
    }

    pub fn from_signals(signals: &[FieldElement]) -> Result<Self> {
        expect_len(signals, Self::LEN, "atomic query")?;

        let schema_bytes = signals[7].to_le_bytes();
        if schema_bytes[SCHEMA_HASH_BYTES..].iter().any(|b| *b != 0) {
            return Err(IdentityError::verification("claim schema signal out of range"));
        }
        let mut schema = [0u8; SCHEMA_HASH_BYTES];
        schema.copy_from_slice(&schema_bytes[..SCHEMA_HASH_BYTES]);

        let request_id = u32::try_from(to_u64(&signals[0], "request id")?)
            .map_err(|_| IdentityError::verification("request id signal out of range"))?;
        let slot_index = SlotIndex::try_from(to_u8(&signals[8], "slot index")?)
            .map_err(|e| IdentityError::verification(e.to_string()))?;
        let operator = Operator::from_code(to_u8(&signals[9], "operator")?)
            .map_err(|e| IdentityError::verification(e.to_string()))?;

        Ok(AtomicQueryPubSignals {
            request_id,
            user_id: to_identifier(&signals[1])?,
            issuer_id: to_identifier(&signals[2])?,
            issuer_state: signals[3],
            issuer_non_rev_state: signals[4],
            is_revocation_checked: to_bool(&signals[5])?,
            timestamp: to_u64(&signals[6], "timestamp")?,
            claim_schema: SchemaHash(schema),
            slot_index,
            operator,
            query_hash: signals[10],
            values: signals[Self::HEADER_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::identifier::IdType;

    fn id(seed: u64) -> Identifier {
        Identifier::from_genesis_state(IdType::DEFAULT, &FieldElement::from_u64(seed))
    }

    #[test]
    fn test_atomic_query_layout() -> Result<()> {
        let mut values = vec![FieldElement::from_u64(20000101)];
        values.resize(MAX_QUERY_VALUES, FieldElement::ZERO);
        let signals = AtomicQueryPubSignals {
            request_id: 1,
            user_id: id(1),
            issuer_id: id(2),
            issuer_state: FieldElement::from_u64(3),
            issuer_non_rev_state: FieldElement::from_u64(4),
            is_revocation_checked: true,
            timestamp: 1_700_000_000,
            claim_schema: SchemaHash::KYC_AGE,
            slot_index: SlotIndex::IndexA,
            operator: Operator::Lt,
            query_hash: FieldElement::from_u64(9),
            values,
        };
        let encoded = signals.to_signals()?;
        assert_eq!(encoded.len(), AtomicQueryPubSignals::LEN);
        assert_eq!(encoded[9], FieldElement::from_u64(2));
        assert_eq!(AtomicQueryPubSignals::from_signals(&encoded)?, signals);

        assert!(AtomicQueryPubSignals::from_signals(&encoded[1..]).is_err());
        let mut bad_operator = encoded;
        bad_operator[9] = FieldElement::from_u64(9);
        assert!(AtomicQueryPubSignals::from_signals(&bad_operator).is_err());
        Ok(())
    }

    #[test]
    fn test_state_transition_layout() -> Result<()> {
        let signals = StateTransitionPubSignals {
            user_id: id(5),
            old_state: FieldElement::from_u64(1),
            new_state: FieldElement::from_u64(2),
            is_old_state_genesis: true,
        };
        let encoded = signals.to_signals();
        assert_eq!(StateTransitionPubSignals::from_signals(&encoded)?, signals);

        let mut not_bool = encoded;
        not_bool[3] = FieldElement::from_u64(2);
        assert!(StateTransitionPubSignals::from_signals(&not_bool).is_err());
        Ok(())
    }

    #[test]
    fn test_auth_layout() -> Result<()> {
        let signals = AuthPubSignals {
            user_id: id(6),
            user_state: FieldElement::from_u64(10),
            challenge: FieldElement::from_u64(11),
        };
        assert_eq!(AuthPubSignals::from_signals(&signals.to_signals())?, signals);
        Ok(())
    }
}
