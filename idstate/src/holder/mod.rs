//! Credential holder
//!
//! A holder keeps the credentials issued to it and answers authorization
//! requests: one query proof per scope entry, then an auth proof over the
//! token carrying the response.

use tracing::{debug, info, warn};

use crate::auth::message::{
    AuthorizationRequestMessage, AuthorizationResponseMessage, ZeroKnowledgeProofRequest,
    ZeroKnowledgeProofResponse,
};
use crate::auth::token::Token;
use crate::claim::codec::Claim;
use crate::claim::schema::SchemaRegistry;
use crate::core::identity::genesis::Identity;
use crate::core::identity::state::TreeState;
use crate::crypto::signature::{FieldSigner, KeyPair};
use crate::issuer::{IncludedCredential, RevocationStatus, RevocationStatusSource, SignedCredential};
use crate::types::error::{IdentityError, Result};
use crate::types::identifier::Identifier;
use crate::utils::time::now;
use crate::zk::inputs::{AtomicQueryInputs, AuthInputs, CredentialInputs};
use crate::zk::{CircuitId, CredentialProver};

/// A credential as received from its issuer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    Signed(SignedCredential),
    Included(IncludedCredential),
}

impl Credential {
    pub fn claim(&self) -> &Claim {
        match self {
            Credential::Signed(credential) => &credential.claim,
            Credential::Included(credential) => &credential.claim,
        }
    }

    pub fn issuer_id(&self) -> Identifier {
        match self {
            Credential::Signed(credential) => credential.issuer_id,
            Credential::Included(credential) => credential.issuer_id,
        }
    }

    /// Query circuit able to prove statements about this credential.
    pub fn circuit_id(&self) -> CircuitId {
        match self {
            Credential::Signed(_) => CircuitId::AtomicQuerySigV2,
            Credential::Included(_) => CircuitId::AtomicQueryMtpV2,
        }
    }

    fn inputs(&self) -> CredentialInputs {
        match self {
            Credential::Signed(c) => CredentialInputs::Sig {
                signature: c.signature,
                issuer_auth_claim: c.issuer_auth_claim.clone(),
                issuer_auth_state: c.issuer_auth_state,
                issuer_auth_inc_mtp: c.issuer_auth_inc_mtp.clone(),
                issuer_auth_non_rev_mtp: c.issuer_auth_non_rev_mtp.clone(),
            },
            Credential::Included(c) => CredentialInputs::Mtp {
                issuer_claim_state: c.issuer_claim_state,
                claim_inc_mtp: c.claim_inc_mtp.clone(),
            },
        }
    }
}

impl From<SignedCredential> for Credential {
    fn from(credential: SignedCredential) -> Self {
        Credential::Signed(credential)
    }
}

impl From<IncludedCredential> for Credential {
    fn from(credential: IncludedCredential) -> Self {
        Credential::Included(credential)
    }
}

pub struct Holder<S: FieldSigner = KeyPair> {
    signer: S,
    identity: Identity,
    credentials: Vec<Credential>,
}

impl<S: FieldSigner> Holder<S> {
    pub fn new(signer: S, auth_revocation_nonce: u64) -> Result<Self> {
        let identity = Identity::from_public_key(&signer.public_key(), auth_revocation_nonce)?;
        Ok(Holder {
            signer,
            identity,
            credentials: Vec::new(),
        })
    }

    pub fn id(&self) -> Identifier {
        self.identity.id()
    }

    pub fn tree_state(&self) -> Result<TreeState> {
        self.identity.tree_state()
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Keep a credential about this holder.
    pub fn store_credential(&mut self, credential: impl Into<Credential>) -> Result<()> {
        let credential = credential.into();
        if credential.claim().subject_id()? != Some(self.id()) {
            return Err(IdentityError::InvalidClaim(format!(
                "credential subject is not {}",
                self.id()
            )));
        }
        debug!(holder = %self.id(), issuer = %credential.issuer_id(), "stored credential");
        self.credentials.push(credential);
        Ok(())
    }

    /// First stored credential able to answer `request`.
    pub fn find_credential(
        &self,
        request: &ZeroKnowledgeProofRequest,
        schemas: &SchemaRegistry,
    ) -> Result<&Credential> {
        let query = request.query.resolve(schemas)?;
        self.credentials
            .iter()
            .find(|credential| {
                credential.circuit_id() == request.circuit_id
                    && credential.claim().schema_hash() == query.schema
                    && request.query.allowed_issuers().allows(&credential.issuer_id())
            })
            .ok_or_else(|| {
                IdentityError::invalid_query(format!(
                    "no credential answers scope request {}",
                    request.id
                ))
            })
    }

    /// Query proof for one scope entry using `credential` and the issuer
    /// revocation status `status`.
    pub fn prove_query(
        &self,
        request: &ZeroKnowledgeProofRequest,
        schemas: &SchemaRegistry,
        credential: &Credential,
        status: &RevocationStatus,
        timestamp: u64,
        prover: &dyn CredentialProver,
    ) -> Result<ZeroKnowledgeProofResponse> {
        if credential.circuit_id() != request.circuit_id {
            return Err(IdentityError::invalid_query(format!(
                "scope request {} needs {}, credential fits {}",
                request.id,
                request.circuit_id,
                credential.circuit_id()
            )));
        }
        if status.is_revoked() {
            warn!(issuer = %credential.issuer_id(), "proving with a revoked credential");
        }
        let inputs = AtomicQueryInputs {
            request_id: request.id,
            user_id: self.id(),
            issuer_id: credential.issuer_id(),
            claim: credential.claim().clone(),
            credential: credential.inputs(),
            issuer_non_rev_state: status.issuer,
            claim_non_rev_mtp: status.mtp.clone(),
            query: request.query.resolve(schemas)?,
            timestamp,
        };
        Ok(ZeroKnowledgeProofResponse {
            id: request.id,
            circuit_id: request.circuit_id,
            proof: prover.prove_atomic_query(request.circuit_id, &inputs)?,
        })
    }

    /// Wrap `proofs` in a response to `request` and return the compact token.
    pub fn authorize(
        &self,
        request: &AuthorizationRequestMessage,
        proofs: Vec<ZeroKnowledgeProofResponse>,
        prover: &dyn CredentialProver,
    ) -> Result<String> {
        let response = AuthorizationResponseMessage::answering(request, self.id(), proofs);
        let mut token = Token::new(CircuitId::AuthV2, serde_json::to_vec(&response)?)?;

        let challenge = token.message_hash();
        let auth_claim = self.identity.auth_claim();
        let trees = self.identity.trees();
        let inputs = AuthInputs {
            user_id: self.id(),
            tree_state: self.identity.tree_state()?,
            auth_claim: auth_claim.clone(),
            auth_claim_inc_mtp: trees.claim_proof(auth_claim, None)?,
            auth_claim_non_rev_mtp: trees.revocation_proof(auth_claim.revocation_nonce(), None)?,
            challenge,
            signature: self.signer.sign(&challenge)?,
        };
        token.attach_proof(prover.prove_auth(&inputs)?);
        token.compact()
    }

    /// Answer every scope entry of `request` from stored credentials.
    pub fn respond(
        &self,
        request: &AuthorizationRequestMessage,
        schemas: &SchemaRegistry,
        revocations: &dyn RevocationStatusSource,
        prover: &dyn CredentialProver,
    ) -> Result<String> {
        let timestamp = now();
        let proofs = request
            .body
            .scope
            .iter()
            .map(|scope| {
                let credential = self.find_credential(scope, schemas)?;
                let status = revocations
                    .revocation_status(&credential.issuer_id(), credential.claim().revocation_nonce())?;
                self.prove_query(scope, schemas, credential, &status, timestamp, prover)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(holder = %self.id(), thread = %request.thread_id, proofs = proofs.len(), "answered authorization request");
        self.authorize(request, proofs, prover)
    }
}
