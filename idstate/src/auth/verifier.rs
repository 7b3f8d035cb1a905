//! Verifier side of the authorization flow
//!
//! A session moves `Created -> Pending -> {Verified | Rejected | Expired}`.
//! [`Verifier::start_session`] validates and stores a request (`Pending`);
//! [`Verifier::full_verify`] consumes it and judges the holder's token.
//! Every scope entry must be answered by a proof that verifies, commits to
//! exactly the requested query and references issuer states the registry
//! knows and considers fresh enough.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::message::{
    AuthorizationRequestMessage, AuthorizationResponseMessage, AUTHORIZATION_RESPONSE_MESSAGE_TYPE,
    MEDIA_TYPE_PLAIN_MESSAGE,
};
use crate::auth::query::CircuitQuery;
use crate::auth::resolver::{RetryPolicy, RetryingResolver, StateResolver};
use crate::auth::session::{InMemorySessionStore, SessionStore};
use crate::auth::token::Token;
use crate::claim::schema::SchemaRegistry;
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::types::identifier::Identifier;
use crate::utils::time::{exceeds, now};
use crate::zk::pubsignals::{AtomicQueryPubSignals, AuthPubSignals};
use crate::zk::{CircuitId, ProofVerifier, ZkProof};

/// Verifier policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifierConfig {
    /// How long a superseded state stays acceptable
    pub accepted_state_transition_delay: Duration,
    /// Maximum age of a query proof's timestamp
    pub accepted_proof_generation_delay: Duration,
    /// Bound on the whole callback verification
    pub callback_deadline: Duration,
    /// How long a pending session waits for its callback
    pub session_retention: Duration,
    pub resolver_retry: RetryPolicy,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            accepted_state_transition_delay: Duration::from_secs(5 * 60),
            accepted_proof_generation_delay: Duration::from_secs(60 * 60),
            callback_deadline: Duration::from_secs(30),
            session_retention: Duration::from_secs(60 * 60),
            resolver_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Created,
    Pending,
    Verified,
    Rejected,
    Expired,
}

impl SessionStatus {
    /// Final status of a session given the outcome of its verification.
    pub fn from_outcome<T>(outcome: &Result<T>) -> Self {
        match outcome {
            Ok(_) => SessionStatus::Verified,
            Err(IdentityError::SessionNotFound(_)) | Err(IdentityError::SessionExpired(_)) => {
                SessionStatus::Expired
            }
            Err(_) => SessionStatus::Rejected,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Verified | SessionStatus::Rejected | SessionStatus::Expired
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Created => "created",
            SessionStatus::Pending => "pending",
            SessionStatus::Verified => "verified",
            SessionStatus::Rejected => "rejected",
            SessionStatus::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A holder that passed verification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedHolder {
    pub session_id: String,
    pub holder: Identifier,
    pub response: AuthorizationResponseMessage,
}

pub struct Verifier {
    proof_verifier: Arc<dyn ProofVerifier>,
    resolver: RetryingResolver<Arc<dyn StateResolver>>,
    schemas: SchemaRegistry,
    sessions: Arc<dyn SessionStore>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(
        proof_verifier: Arc<dyn ProofVerifier>,
        resolver: Arc<dyn StateResolver>,
        schemas: SchemaRegistry,
        sessions: Arc<dyn SessionStore>,
        config: VerifierConfig,
    ) -> Self {
        Verifier {
            proof_verifier,
            resolver: RetryingResolver::new(resolver, config.resolver_retry),
            schemas,
            sessions,
            config,
        }
    }

    /// Verifier with the default schemas and an in-memory session store.
    pub fn in_memory(
        proof_verifier: Arc<dyn ProofVerifier>,
        resolver: Arc<dyn StateResolver>,
        config: VerifierConfig,
    ) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new(config.session_retention));
        Self::new(
            proof_verifier,
            resolver,
            SchemaRegistry::with_defaults(),
            sessions,
            config,
        )
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Validate `request` and store it under `session_id`.
    pub fn start_session(&self, session_id: &str, request: AuthorizationRequestMessage) -> Result<()> {
        request.validate()?;
        for scope in &request.body.scope {
            scope.query.resolve(&self.schemas)?;
        }
        let thread_id = request.thread_id.clone();
        self.sessions.put(session_id, request)?;
        info!(session_id, %thread_id, status = %SessionStatus::Pending, "started authorization session");
        Ok(())
    }

    /// Consume the session and verify the holder's token against its request.
    ///
    /// The session is gone afterwards whatever the outcome, so a replayed
    /// token finds no session.
    pub async fn full_verify(&self, session_id: &str, token: &str) -> Result<VerifiedHolder> {
        let outcome = match self.sessions.take_once(session_id) {
            Ok(request) => {
                debug!(session_id, "consumed pending session");
                match tokio::time::timeout(
                    self.config.callback_deadline,
                    self.verify_token(&request, token),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(IdentityError::DeadlineExceeded(format!(
                        "verification took longer than {:?}",
                        self.config.callback_deadline
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        let status = SessionStatus::from_outcome(&outcome);
        match &outcome {
            Ok((holder, _)) => info!(session_id, %holder, %status, "authorization verified"),
            Err(e) if e.is_rejection() => warn!(session_id, %status, error = %e, "authorization rejected"),
            Err(e) => warn!(session_id, %status, kind = ?e.kind(), error = %e, "authorization failed"),
        }
        outcome.map(|(holder, response)| VerifiedHolder {
            session_id: session_id.to_string(),
            holder,
            response,
        })
    }

    /// Verify a compact token answering `request`, returning the holder and
    /// the response it carried.
    pub async fn verify_token(
        &self,
        request: &AuthorizationRequestMessage,
        token: &str,
    ) -> Result<(Identifier, AuthorizationResponseMessage)> {
        let token = Token::parse(token)?;
        let auth = self.verify_auth_token(token.clone()).await?;

        let response: AuthorizationResponseMessage = serde_json::from_slice(token.payload())
            .map_err(|e| IdentityError::InvalidToken(format!("payload: {}", e)))?;
        if response.from != auth.user_id {
            return Err(IdentityError::InvalidToken(format!(
                "response sender {} did not produce the auth proof",
                response.from
            )));
        }

        let now = now();
        self.check_state_freshness(&auth.user_id, &auth.user_state, now)
            .await?;
        self.check_response(request, &response, now).await?;
        Ok((auth.user_id, response))
    }

    /// Verify every scope entry of `response` against `request`.
    pub async fn verify_authorization_response(
        &self,
        request: &AuthorizationRequestMessage,
        response: &AuthorizationResponseMessage,
    ) -> Result<()> {
        self.check_response(request, response, now()).await
    }

    async fn check_response(
        &self,
        request: &AuthorizationRequestMessage,
        response: &AuthorizationResponseMessage,
        now: u64,
    ) -> Result<()> {
        if response.message_type != AUTHORIZATION_RESPONSE_MESSAGE_TYPE {
            return Err(IdentityError::query_mismatch(format!(
                "message type {} is not an authorization response",
                response.message_type
            )));
        }
        if response.typ != MEDIA_TYPE_PLAIN_MESSAGE {
            return Err(IdentityError::query_mismatch(format!(
                "unsupported media type {}",
                response.typ
            )));
        }
        if response.thread_id != request.thread_id {
            return Err(IdentityError::query_mismatch(format!(
                "response belongs to thread {}, expected {}",
                response.thread_id, request.thread_id
            )));
        }
        if response.to != request.from {
            return Err(IdentityError::query_mismatch(format!(
                "response is addressed to {}, expected {}",
                response.to, request.from
            )));
        }
        if response.body.message != request.body.message {
            return Err(IdentityError::query_mismatch(
                "response signs a different message than the request",
            ));
        }

        for scope in &request.body.scope {
            let answer = response
                .body
                .scope
                .iter()
                .find(|answer| answer.id == scope.id)
                .ok_or(IdentityError::MissingProof(scope.id))?;
            if answer.circuit_id != scope.circuit_id {
                return Err(IdentityError::query_mismatch(format!(
                    "scope {} asked for {}, got {}",
                    scope.id, scope.circuit_id, answer.circuit_id
                )));
            }

            self.verify_proof(scope.circuit_id, answer.proof.clone()).await?;
            let signals = AtomicQueryPubSignals::from_signals(&answer.proof.pub_signals)?;
            let expected = scope.query.resolve(&self.schemas)?;
            check_query(scope.id, &expected, &signals, &response.from)?;

            if !scope.query.allowed_issuers().allows(&signals.issuer_id) {
                return Err(IdentityError::query_mismatch(format!(
                    "issuer {} is not allowed for scope {}",
                    signals.issuer_id, scope.id
                )));
            }
            if exceeds(signals.timestamp, now, self.config.accepted_proof_generation_delay) {
                return Err(IdentityError::verification(format!(
                    "proof for scope {} was generated more than {:?} ago",
                    scope.id, self.config.accepted_proof_generation_delay
                )));
            }

            self.check_state_known(&signals.issuer_id, &signals.issuer_state)
                .await?;
            self.check_state_freshness(&signals.issuer_id, &signals.issuer_non_rev_state, now)
                .await?;
            debug!(scope = scope.id, issuer = %signals.issuer_id, "scope request satisfied");
        }
        Ok(())
    }

    async fn verify_auth_token(&self, token: Token) -> Result<AuthPubSignals> {
        let verifier = self.proof_verifier.clone();
        tokio::task::spawn_blocking(move || token.verify(verifier.as_ref()))
            .await
            .map_err(|e| IdentityError::internal(format!("auth verification task failed: {}", e)))?
    }

    async fn verify_proof(&self, circuit: CircuitId, proof: ZkProof) -> Result<()> {
        let verifier = self.proof_verifier.clone();
        tokio::task::spawn_blocking(move || verifier.verify(circuit, &proof))
            .await
            .map_err(|e| IdentityError::internal(format!("{} verification task failed: {}", circuit, e)))?
    }

    /// The state must be published, or be the genesis state of `id`.
    async fn check_state_known(&self, id: &Identifier, state: &FieldElement) -> Result<()> {
        match self.resolver.resolve(id, Some(state)).await {
            Ok(_) => Ok(()),
            Err(IdentityError::StateNotFound(_)) if id.is_genesis_state(state) => {
                debug!(%id, "accepting unpublished genesis state");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`Self::check_state_known`], and a superseded state must have
    /// been replaced less than the accepted delay ago.
    async fn check_state_freshness(&self, id: &Identifier, state: &FieldElement, now: u64) -> Result<()> {
        let resolved = match self.resolver.resolve(id, Some(state)).await {
            Ok(resolved) => resolved,
            Err(IdentityError::StateNotFound(_)) if id.is_genesis_state(state) => {
                debug!(%id, "accepting unpublished genesis state");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if resolved.latest {
            return Ok(());
        }
        let replaced_at = resolved.replaced_at.unwrap_or(resolved.created_at);
        if exceeds(replaced_at, now, self.config.accepted_state_transition_delay) {
            return Err(IdentityError::StaleState(format!(
                "state {} of {} was replaced at {}, more than {:?} ago",
                state, id, replaced_at, self.config.accepted_state_transition_delay
            )));
        }
        Ok(())
    }
}

/// Public signals of a query proof must commit to exactly the requested query.
fn check_query(
    request_id: u32,
    expected: &CircuitQuery,
    signals: &AtomicQueryPubSignals,
    holder: &Identifier,
) -> Result<()> {
    if signals.request_id != request_id {
        return Err(IdentityError::query_mismatch(format!(
            "proof answers request {}, expected {}",
            signals.request_id, request_id
        )));
    }
    if signals.claim_schema != expected.schema {
        return Err(IdentityError::query_mismatch(format!(
            "proof is about schema {}, expected {}",
            signals.claim_schema, expected.schema
        )));
    }
    if signals.slot_index != expected.slot_index {
        return Err(IdentityError::query_mismatch("proof queries another field"));
    }
    if signals.operator != expected.operator {
        return Err(IdentityError::query_mismatch(format!(
            "proof uses operator {}, expected {}",
            signals.operator, expected.operator
        )));
    }
    if signals.values != expected.padded_values()? {
        return Err(IdentityError::query_mismatch("proof uses other operand values"));
    }
    if signals.query_hash != expected.hash()? {
        return Err(IdentityError::query_mismatch("query hash does not match the request"));
    }
    if !signals.is_revocation_checked {
        return Err(IdentityError::query_mismatch("proof skips the revocation check"));
    }
    if signals.user_id != *holder {
        return Err(IdentityError::query_mismatch(format!(
            "proof was made by {}, not by {}",
            signals.user_id, holder
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::query::{Operator, MAX_QUERY_VALUES};
    use crate::claim::schema::{SchemaHash, SlotIndex};
    use crate::types::identifier::IdType;

    fn holder() -> Identifier {
        Identifier::from_genesis_state(IdType::DEFAULT, &FieldElement::from_u64(77))
    }

    fn birthday_query() -> CircuitQuery {
        CircuitQuery {
            schema: SchemaHash::KYC_AGE,
            slot_index: SlotIndex::IndexA,
            operator: Operator::Lt,
            values: vec![FieldElement::from_u64(20000101)],
        }
    }

    fn signals_for(query: &CircuitQuery) -> Result<AtomicQueryPubSignals> {
        Ok(AtomicQueryPubSignals {
            request_id: 1,
            user_id: holder(),
            issuer_id: holder(),
            issuer_state: FieldElement::from_u64(1),
            issuer_non_rev_state: FieldElement::from_u64(1),
            is_revocation_checked: true,
            timestamp: 0,
            claim_schema: query.schema,
            slot_index: query.slot_index,
            operator: query.operator,
            query_hash: query.hash()?,
            values: query.padded_values()?,
        })
    }

    #[test]
    fn test_matching_query_passes() -> Result<()> {
        let query = birthday_query();
        check_query(1, &query, &signals_for(&query)?, &holder())
    }

    #[test]
    fn test_query_mismatches() -> Result<()> {
        let query = birthday_query();

        let mut other_operand = signals_for(&query)?;
        other_operand.values[0] = FieldElement::from_u64(20100101);
        assert!(matches!(
            check_query(1, &query, &other_operand, &holder()),
            Err(IdentityError::QueryMismatch(_))
        ));

        let mut other_operator = signals_for(&query)?;
        other_operator.operator = Operator::Gt;
        assert!(check_query(1, &query, &other_operator, &holder()).is_err());

        let mut other_request = signals_for(&query)?;
        other_request.request_id = 2;
        assert!(check_query(1, &query, &other_request, &holder()).is_err());

        let stranger = Identifier::from_genesis_state(IdType::DEFAULT, &FieldElement::from_u64(78));
        assert!(check_query(1, &query, &signals_for(&query)?, &stranger).is_err());
        assert_eq!(signals_for(&query)?.values.len(), MAX_QUERY_VALUES);
        Ok(())
    }

    #[test]
    fn test_session_status_from_outcome() {
        assert_eq!(SessionStatus::from_outcome(&Ok(())), SessionStatus::Verified);
        assert_eq!(
            SessionStatus::from_outcome::<()>(&Err(IdentityError::SessionNotFound("1".into()))),
            SessionStatus::Expired
        );
        assert_eq!(
            SessionStatus::from_outcome::<()>(&Err(IdentityError::StaleState("s".into()))),
            SessionStatus::Rejected
        );
        assert!(!SessionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_default_config() {
        let config = VerifierConfig::default();
        assert_eq!(config.accepted_state_transition_delay, Duration::from_secs(300));
        assert_eq!(config.callback_deadline, Duration::from_secs(30));
        assert_eq!(config.resolver_retry.max_attempts, 3);
    }
}
