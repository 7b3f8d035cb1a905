//! Authorization request and response messages

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::query::Query;
use crate::types::error::{IdentityError, Result};
use crate::types::identifier::Identifier;
use crate::zk::{CircuitId, ZkProof};

pub const AUTHORIZATION_REQUEST_MESSAGE_TYPE: &str =
    "https://iden3-communication.io/authorization/1.0/request";
pub const AUTHORIZATION_RESPONSE_MESSAGE_TYPE: &str =
    "https://iden3-communication.io/authorization/1.0/response";
pub const MEDIA_TYPE_PLAIN_MESSAGE: &str = "application/iden3comm-plain-json";

/// One requested proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroKnowledgeProofRequest {
    pub id: u32,
    pub circuit_id: CircuitId,
    pub query: Query,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequestBody {
    pub callback_url: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub scope: Vec<ZeroKnowledgeProofRequest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequestMessage {
    pub id: String,
    pub typ: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(rename = "thid")]
    pub thread_id: String,
    /// The verifier (audience) asking for the proofs
    pub from: String,
    pub body: AuthorizationRequestBody,
}

/// Build an authorization request with an empty scope.
pub fn create_authorization_request(
    reason: impl Into<String>,
    audience: impl Into<String>,
    callback_url: impl Into<String>,
) -> AuthorizationRequestMessage {
    create_authorization_request_with_message(reason, "", audience, callback_url)
}

pub fn create_authorization_request_with_message(
    reason: impl Into<String>,
    message: impl Into<String>,
    audience: impl Into<String>,
    callback_url: impl Into<String>,
) -> AuthorizationRequestMessage {
    let id = Uuid::new_v4().to_string();
    AuthorizationRequestMessage {
        thread_id: id.clone(),
        id,
        typ: MEDIA_TYPE_PLAIN_MESSAGE.to_string(),
        message_type: AUTHORIZATION_REQUEST_MESSAGE_TYPE.to_string(),
        from: audience.into(),
        body: AuthorizationRequestBody {
            callback_url: callback_url.into(),
            reason: reason.into(),
            message: message.into(),
            scope: Vec::new(),
        },
    }
}

impl AuthorizationRequestMessage {
    pub fn with_scope(mut self, request: ZeroKnowledgeProofRequest) -> Self {
        self.body.scope.push(request);
        self
    }

    /// A request must ask for at least one proof, with unique ids and query circuits only.
    pub fn validate(&self) -> Result<()> {
        if self.body.scope.is_empty() {
            return Err(IdentityError::invalid_query("authorization request has an empty scope"));
        }
        if self.body.callback_url.is_empty() {
            return Err(IdentityError::invalid_query("authorization request has no callback"));
        }
        let mut ids = HashSet::new();
        for request in &self.body.scope {
            if !ids.insert(request.id) {
                return Err(IdentityError::invalid_query(format!(
                    "duplicate scope request id {}",
                    request.id
                )));
            }
            if !request.circuit_id.is_query_circuit() {
                return Err(IdentityError::invalid_query(format!(
                    "{} cannot answer a scope request",
                    request.circuit_id
                )));
            }
        }
        Ok(())
    }
}

/// One returned proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroKnowledgeProofResponse {
    pub id: u32,
    pub circuit_id: CircuitId,
    pub proof: ZkProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponseBody {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub scope: Vec<ZeroKnowledgeProofResponse>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponseMessage {
    pub id: String,
    pub typ: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(rename = "thid")]
    pub thread_id: String,
    /// The holder answering the request
    pub from: Identifier,
    pub to: String,
    pub body: AuthorizationResponseBody,
}

impl AuthorizationResponseMessage {
    /// Response to `request` from `holder` carrying `scope`.
    pub fn answering(
        request: &AuthorizationRequestMessage,
        holder: Identifier,
        scope: Vec<ZeroKnowledgeProofResponse>,
    ) -> Self {
        AuthorizationResponseMessage {
            id: Uuid::new_v4().to_string(),
            typ: MEDIA_TYPE_PLAIN_MESSAGE.to_string(),
            message_type: AUTHORIZATION_RESPONSE_MESSAGE_TYPE.to_string(),
            thread_id: request.thread_id.clone(),
            from: holder,
            to: request.from.clone(),
            body: AuthorizationResponseBody {
                message: request.body.message.clone(),
                scope,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::query::Operator;
    use crate::claim::schema::{KYC_AGE_CREDENTIAL, KYC_V3_CONTEXT};
    use crate::types::field::FieldElement;

    fn scope(id: u32, circuit_id: CircuitId) -> Result<ZeroKnowledgeProofRequest> {
        Ok(ZeroKnowledgeProofRequest {
            id,
            circuit_id,
            query: Query::new(
                KYC_V3_CONTEXT,
                KYC_AGE_CREDENTIAL,
                "birthday",
                Operator::Lt,
                vec![FieldElement::from_u64(20000101)],
            )?,
        })
    }

    #[test]
    fn test_request_json_shape() -> Result<()> {
        let request = create_authorization_request_with_message(
            "test flow",
            "message to sign",
            "verifier-audience",
            "http://localhost:8080/api/callback?sessionId=1",
        )
        .with_scope(scope(1, CircuitId::AtomicQueryMtpV2)?);
        request.validate()?;

        let json = serde_json::to_value(&request)?;
        assert_eq!(json["type"], AUTHORIZATION_REQUEST_MESSAGE_TYPE);
        assert_eq!(json["thid"], json["id"]);
        assert_eq!(json["body"]["callbackUrl"], "http://localhost:8080/api/callback?sessionId=1");
        assert_eq!(json["body"]["scope"][0]["circuitId"], "credentialAtomicQueryMTPV2");
        assert_eq!(
            json["body"]["scope"][0]["query"]["credentialSubject"]["birthday"]["$lt"],
            "20000101"
        );

        let back: AuthorizationRequestMessage = serde_json::from_value(json)?;
        assert_eq!(back, request);
        Ok(())
    }

    #[test]
    fn test_request_validation() -> Result<()> {
        let base = create_authorization_request("r", "aud", "http://cb");
        assert!(base.validate().is_err());

        let duplicate = base
            .clone()
            .with_scope(scope(1, CircuitId::AtomicQueryMtpV2)?)
            .with_scope(scope(1, CircuitId::AtomicQuerySigV2)?);
        assert!(duplicate.validate().is_err());

        let auth_scope = base.with_scope(scope(1, CircuitId::AuthV2)?);
        assert!(auth_scope.validate().is_err());
        Ok(())
    }
}
