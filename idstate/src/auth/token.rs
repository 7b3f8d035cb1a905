//! Zero-knowledge token
//!
//! Compact form `header.payload.proof`, each part base64url without padding.
//! The header names the circuit; the payload is the authorization response;
//! the proof is an auth proof whose challenge is the hash of
//! `header.payload`, which binds the response to the identity that proved.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::hash::hash_bytes;
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::zk::pubsignals::AuthPubSignals;
use crate::zk::{CircuitId, ProofVerifier, ZkProof};

pub const TOKEN_ALGORITHM: &str = "groth16";
pub const MEDIA_TYPE_ZKP_MESSAGE: &str = "application/iden3-zkp-json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(rename = "circuitId")]
    pub circuit_id: CircuitId,
    pub typ: String,
}

#[derive(Clone, Debug)]
pub struct Token {
    header: TokenHeader,
    encoded_header: String,
    payload: Vec<u8>,
    encoded_payload: String,
    proof: Option<ZkProof>,
}

impl Token {
    pub fn new(circuit_id: CircuitId, payload: Vec<u8>) -> Result<Self> {
        let header = TokenHeader {
            alg: TOKEN_ALGORITHM.to_string(),
            circuit_id,
            typ: MEDIA_TYPE_ZKP_MESSAGE.to_string(),
        };
        Ok(Token {
            encoded_header: URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            encoded_payload: URL_SAFE_NO_PAD.encode(&payload),
            header,
            payload,
            proof: None,
        })
    }

    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn proof(&self) -> Result<&ZkProof> {
        self.proof
            .as_ref()
            .ok_or_else(|| IdentityError::InvalidToken("token carries no proof".to_string()))
    }

    /// The challenge the auth proof must sign: hash of `header.payload`.
    pub fn message_hash(&self) -> FieldElement {
        let signing_input = format!("{}.{}", self.encoded_header, self.encoded_payload);
        hash_bytes(signing_input.as_bytes())
    }

    pub fn attach_proof(&mut self, proof: ZkProof) {
        self.proof = Some(proof);
    }

    pub fn compact(&self) -> Result<String> {
        let proof = serde_json::to_vec(self.proof()?)?;
        Ok(format!(
            "{}.{}.{}",
            self.encoded_header,
            self.encoded_payload,
            URL_SAFE_NO_PAD.encode(proof)
        ))
    }

    pub fn parse(compact: &str) -> Result<Self> {
        let mut parts = compact.trim().split('.');
        let (encoded_header, encoded_payload, encoded_proof) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(z), None) => (h, p, z),
                _ => {
                    return Err(IdentityError::InvalidToken(
                        "expected three dot-separated parts".to_string(),
                    ))
                }
            };
        let decode = |part: &str, what: &str| {
            URL_SAFE_NO_PAD
                .decode(part)
                .map_err(|e| IdentityError::InvalidToken(format!("{}: {}", what, e)))
        };
        let header: TokenHeader = serde_json::from_slice(&decode(encoded_header, "header")?)
            .map_err(|e| IdentityError::InvalidToken(format!("header: {}", e)))?;
        let proof: ZkProof = serde_json::from_slice(&decode(encoded_proof, "proof")?)
            .map_err(|e| IdentityError::InvalidToken(format!("proof: {}", e)))?;

        Ok(Token {
            header,
            encoded_header: encoded_header.to_string(),
            payload: decode(encoded_payload, "payload")?,
            encoded_payload: encoded_payload.to_string(),
            proof: Some(proof),
        })
    }

    /// Verify the auth proof and its binding to this token.
    pub fn verify(&self, verifier: &dyn ProofVerifier) -> Result<AuthPubSignals> {
        if self.header.circuit_id != CircuitId::AuthV2 {
            return Err(IdentityError::InvalidToken(format!(
                "token proof uses {}, expected {}",
                self.header.circuit_id,
                CircuitId::AuthV2
            )));
        }
        let proof = self.proof()?;
        verifier.verify(CircuitId::AuthV2, proof)?;
        let signals = AuthPubSignals::from_signals(&proof.pub_signals)?;
        if signals.challenge != self.message_hash() {
            return Err(IdentityError::InvalidToken(
                "auth proof challenge does not match the token".to_string(),
            ));
        }
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_round_trip() -> Result<()> {
        let mut token = Token::new(CircuitId::AuthV2, b"{\"hello\":1}".to_vec())?;
        assert!(token.compact().is_err());
        let challenge = token.message_hash();

        token.attach_proof(ZkProof {
            proof: vec![1, 2, 3],
            pub_signals: vec![challenge],
        });
        let compact = token.compact()?;
        assert_eq!(compact.split('.').count(), 3);
        assert!(!compact.contains('='));

        let parsed = Token::parse(&compact)?;
        assert_eq!(parsed.payload(), b"{\"hello\":1}");
        assert_eq!(parsed.message_hash(), challenge);
        assert_eq!(parsed.header().circuit_id, CircuitId::AuthV2);
        Ok(())
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            Token::parse("only.two"),
            Err(IdentityError::InvalidToken(_))
        ));
        assert!(matches!(
            Token::parse("a.b.c.d"),
            Err(IdentityError::InvalidToken(_))
        ));
        assert!(matches!(
            Token::parse("!!!.e30.e30"),
            Err(IdentityError::InvalidToken(_))
        ));
    }
}
