//! Zero-knowledge proof boundary
//!
//! Proof generation and verification are delegated to implementations of
//! [`ProofVerifier`], [`StateTransitionProver`] and [`CredentialProver`].
//! This module fixes the circuits, the witness inputs each circuit takes and
//! the layout of their public signals; [`transparent`] provides a backend
//! that enforces every circuit constraint by recomputation.

pub mod inputs;
pub mod pubsignals;
pub mod transparent;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;

pub use inputs::{AtomicQueryInputs, AuthInputs, CredentialInputs, StateTransitionInputs};
pub use pubsignals::{AtomicQueryPubSignals, AuthPubSignals, StateTransitionPubSignals};
pub use transparent::{TransparentProver, TransparentVerifier};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitId {
    #[serde(rename = "authV2")]
    AuthV2,
    #[serde(rename = "credentialAtomicQueryMTPV2")]
    AtomicQueryMtpV2,
    #[serde(rename = "credentialAtomicQuerySigV2")]
    AtomicQuerySigV2,
    #[serde(rename = "stateTransition")]
    StateTransition,
}

impl CircuitId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitId::AuthV2 => "authV2",
            CircuitId::AtomicQueryMtpV2 => "credentialAtomicQueryMTPV2",
            CircuitId::AtomicQuerySigV2 => "credentialAtomicQuerySigV2",
            CircuitId::StateTransition => "stateTransition",
        }
    }

    /// Circuits usable in a verifier's scope.
    pub fn is_query_circuit(&self) -> bool {
        matches!(self, CircuitId::AtomicQueryMtpV2 | CircuitId::AtomicQuerySigV2)
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "authV2" => Ok(CircuitId::AuthV2),
            "credentialAtomicQueryMTPV2" => Ok(CircuitId::AtomicQueryMtpV2),
            "credentialAtomicQuerySigV2" => Ok(CircuitId::AtomicQuerySigV2),
            "stateTransition" => Ok(CircuitId::StateTransition),
            other => Err(IdentityError::verification(format!(
                "unknown circuit {}",
                other
            ))),
        }
    }
}

/// An opaque proof and the public signals it was produced for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    #[serde(with = "base64_bytes")]
    pub proof: Vec<u8>,
    pub pub_signals: Vec<FieldElement>,
}

/// Verifies proofs of any supported circuit
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, circuit: CircuitId, proof: &ZkProof) -> Result<()>;
}

/// Produces state transition proofs for issuers
pub trait StateTransitionProver: Send + Sync {
    fn prove_state_transition(&self, inputs: &StateTransitionInputs) -> Result<ZkProof>;
}

/// Produces auth and query proofs for holders
pub trait CredentialProver: Send + Sync {
    fn prove_auth(&self, inputs: &AuthInputs) -> Result<ZkProof>;

    fn prove_atomic_query(&self, circuit: CircuitId, inputs: &AtomicQueryInputs) -> Result<ZkProof>;
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
