// End-to-end authorization: an issuer publishes states, a holder answers a
// verifier's age query, and the verifier judges the token against the state
// registry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use idstate::auth::message::{
    create_authorization_request, create_authorization_request_with_message,
    AuthorizationRequestMessage, AuthorizationResponseMessage, ZeroKnowledgeProofRequest,
    AUTHORIZATION_REQUEST_MESSAGE_TYPE,
};
use idstate::auth::query::{Operator, Query};
use idstate::auth::resolver::{InMemoryStateRegistry, ResolvedState, RetryPolicy, StateResolver};
use idstate::claim::codec::{Claim, ClaimFields};
use idstate::claim::schema::{SchemaHash, KYC_AGE_CREDENTIAL, KYC_V3_CONTEXT};
use idstate::issuer::{RevocationStatus, RevocationStatusSource};
use idstate::utils::time::now;
use idstate::zk::{CircuitId, TransparentProver, TransparentVerifier};
use idstate::{
    ErrorKind, FieldElement, Holder, Identifier, IdentityError, Issuer, KeyPair, Verifier,
    VerifierConfig,
};

type TestResult = Result<(), IdentityError>;

const CLAIM_NONCE: u64 = 1909830690;

struct Fixture {
    issuer: Issuer,
    holder: Holder,
    registry: Arc<InMemoryStateRegistry>,
}

impl Fixture {
    fn new() -> Result<Self, IdentityError> {
        Ok(Fixture {
            issuer: Issuer::new(KeyPair::from_entropy(b"e2e issuer"), 1)?,
            holder: Holder::new(KeyPair::from_entropy(b"e2e holder"), 1)?,
            registry: Arc::new(InMemoryStateRegistry::new()),
        })
    }

    fn age_claim(&self, nonce: u64) -> Result<Claim, IdentityError> {
        Claim::encode(
            &ClaimFields::new(SchemaHash::KYC_AGE)
                .with_index_id(self.holder.id())
                .with_index_data(FieldElement::from_u64(19960424), FieldElement::ONE)
                .with_expiration(12345654321)
                .with_revocation_nonce(nonce),
        )
    }

    /// Issue an age claim by inclusion and publish the transition `age` seconds ago.
    fn include(&mut self, nonce: u64, age: u64) -> TestResult {
        let issuance = self
            .issuer
            .issue_by_inclusion(self.age_claim(nonce)?, &TransparentProver)?;
        self.registry.transit_state(
            &issuance.state_transition.proof,
            &TransparentVerifier,
            now() - age,
        )?;
        self.holder.store_credential(issuance.credential)
    }

    fn verifier(&self) -> Verifier {
        self.verifier_with(self.registry.clone())
    }

    fn verifier_with(&self, resolver: Arc<dyn StateResolver>) -> Verifier {
        let config = VerifierConfig {
            resolver_retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(10),
                attempt_timeout: Duration::from_secs(1),
            },
            ..VerifierConfig::default()
        };
        Verifier::in_memory(Arc::new(TransparentVerifier), resolver, config)
    }
}

fn birthday_scope(id: u32, circuit_id: CircuitId, before: u64) -> Result<ZeroKnowledgeProofRequest, IdentityError> {
    Ok(ZeroKnowledgeProofRequest {
        id,
        circuit_id,
        query: Query::new(
            KYC_V3_CONTEXT,
            KYC_AGE_CREDENTIAL,
            "birthday",
            Operator::Lt,
            vec![FieldElement::from_u64(before)],
        )?,
    })
}

fn sign_in_request(circuit_id: CircuitId) -> Result<AuthorizationRequestMessage, IdentityError> {
    Ok(
        create_authorization_request("test flow", "verifier", "http://localhost/api/callback?sessionId=1")
            .with_scope(birthday_scope(1, circuit_id, 20000101)?),
    )
}

/// Revocation status frozen at the moment it was taken.
struct FrozenStatus(RevocationStatus);

impl RevocationStatusSource for FrozenStatus {
    fn revocation_status(&self, _issuer: &Identifier, _nonce: u64) -> Result<RevocationStatus, IdentityError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn verified_holder() -> TestResult {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 30)?;
    let verifier = fixture.verifier();

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;
    verifier.start_session("1", request.clone())?;
    let token = fixture.holder.respond(
        &request,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;

    let verified = verifier.full_verify("1", &token).await?;
    assert_eq!(verified.holder, fixture.holder.id());
    assert_eq!(verified.response.thread_id, request.thread_id);

    // The session was consumed; replaying the token finds nothing.
    assert!(matches!(
        verifier.full_verify("1", &token).await,
        Err(IdentityError::SessionNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn revoked_claim_is_rejected() -> TestResult {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 60)?;
    let revocation = fixture.issuer.revoke(CLAIM_NONCE, &TransparentProver)?;
    fixture
        .registry
        .transit_state(&revocation.proof, &TransparentVerifier, now() - 30)?;
    let verifier = fixture.verifier();

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;
    verifier.start_session("1", request.clone())?;
    let token = fixture.holder.respond(
        &request,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;

    let err = verifier
        .full_verify("1", &token)
        .await
        .expect_err("revoked claim must not verify");
    assert_eq!(err.kind(), ErrorKind::ProofVerification);
    assert!(err.is_rejection());
    Ok(())
}

async fn verify_with_superseded_status(replaced_ago: u64) -> Result<Identifier, IdentityError> {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 1_000)?;
    let status = FrozenStatus(fixture.issuer.revocation_status_of(CLAIM_NONCE)?);
    fixture.include(CLAIM_NONCE + 1, replaced_ago)?;
    let verifier = fixture.verifier();

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;
    verifier.start_session("1", request.clone())?;
    let token = fixture
        .holder
        .respond(&request, verifier.schemas(), &status, &TransparentProver)?;
    Ok(verifier.full_verify("1", &token).await?.holder)
}

#[tokio::test]
async fn stale_issuer_state_is_rejected() {
    let result = verify_with_superseded_status(600).await;
    assert!(matches!(result, Err(IdentityError::StaleState(_))));
}

#[tokio::test]
async fn recently_superseded_state_is_accepted() -> TestResult {
    verify_with_superseded_status(60).await?;
    Ok(())
}

#[tokio::test]
async fn missing_proof_is_rejected() -> TestResult {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 30)?;
    let verifier = fixture.verifier();

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?
        .with_scope(birthday_scope(2, CircuitId::AtomicQueryMtpV2, 20050101)?);
    verifier.start_session("1", request.clone())?;

    let scope = &request.body.scope[0];
    let credential = fixture.holder.find_credential(scope, verifier.schemas())?;
    let status = fixture.issuer.revocation_status_of(CLAIM_NONCE)?;
    let proof = fixture.holder.prove_query(
        scope,
        verifier.schemas(),
        credential,
        &status,
        now(),
        &TransparentProver,
    )?;
    let token = fixture
        .holder
        .authorize(&request, vec![proof], &TransparentProver)?;

    assert!(matches!(
        verifier.full_verify("1", &token).await,
        Err(IdentityError::MissingProof(2))
    ));
    Ok(())
}

#[tokio::test]
async fn answer_to_another_query_is_rejected() -> TestResult {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 30)?;
    let verifier = fixture.verifier();

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;
    verifier.start_session("1", request.clone())?;

    let mut looser = request.clone();
    looser.body.scope[0] = birthday_scope(1, CircuitId::AtomicQueryMtpV2, 20100101)?;
    let token = fixture.holder.respond(
        &looser,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;

    assert!(matches!(
        verifier.full_verify("1", &token).await,
        Err(IdentityError::QueryMismatch(_))
    ));
    Ok(())
}

/// Holder answers a copy of the session's request altered by `alter`.
async fn answer_altered_request(
    alter: impl FnOnce(&mut AuthorizationRequestMessage),
) -> Result<Identifier, IdentityError> {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 30)?;
    let verifier = fixture.verifier();

    let request = create_authorization_request_with_message(
        "test flow",
        "message to sign",
        "verifier",
        "http://localhost/api/callback?sessionId=1",
    )
    .with_scope(birthday_scope(1, CircuitId::AtomicQueryMtpV2, 20000101)?);
    verifier.start_session("1", request.clone())?;

    let mut altered = request;
    alter(&mut altered);
    let token = fixture.holder.respond(
        &altered,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;
    Ok(verifier.full_verify("1", &token).await?.holder)
}

#[tokio::test]
async fn signed_message_must_match_the_request() -> TestResult {
    let result = answer_altered_request(|request| {
        request.body.message = "transfer everything to mallory".to_string();
    })
    .await;
    assert!(matches!(result, Err(IdentityError::QueryMismatch(_))));

    answer_altered_request(|_| {}).await?;
    Ok(())
}

#[tokio::test]
async fn response_must_address_the_requesting_verifier() {
    let result = answer_altered_request(|request| {
        request.from = "some-other-verifier".to_string();
    })
    .await;
    assert!(matches!(result, Err(IdentityError::QueryMismatch(_))));
}

#[tokio::test]
async fn request_typed_message_is_not_a_response() -> TestResult {
    let fixture = Fixture::new()?;
    let verifier = fixture.verifier();
    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;

    let mut response = AuthorizationResponseMessage::answering(&request, fixture.holder.id(), Vec::new());
    response.message_type = AUTHORIZATION_REQUEST_MESSAGE_TYPE.to_string();
    assert!(matches!(
        verifier.verify_authorization_response(&request, &response).await,
        Err(IdentityError::QueryMismatch(_))
    ));

    let mut response = AuthorizationResponseMessage::answering(&request, fixture.holder.id(), Vec::new());
    response.typ = "application/json".to_string();
    assert!(matches!(
        verifier.verify_authorization_response(&request, &response).await,
        Err(IdentityError::QueryMismatch(_))
    ));
    Ok(())
}

#[tokio::test]
async fn unpublished_genesis_issuer_is_accepted() -> TestResult {
    let mut fixture = Fixture::new()?;
    let credential = fixture
        .issuer
        .issue_by_signature(fixture.age_claim(CLAIM_NONCE)?)?;
    fixture.holder.store_credential(credential)?;
    let verifier = fixture.verifier();

    let request = sign_in_request(CircuitId::AtomicQuerySigV2)?;
    verifier.start_session("1", request.clone())?;
    let token = fixture.holder.respond(
        &request,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;

    let verified = verifier.full_verify("1", &token).await?;
    assert_eq!(verified.holder, fixture.holder.id());
    Ok(())
}

#[tokio::test]
async fn swapped_payload_is_rejected() -> TestResult {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 30)?;
    let verifier = fixture.verifier();

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;
    verifier.start_session("1", request.clone())?;
    let first = fixture.holder.respond(
        &request,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;
    let second = fixture.holder.respond(
        &request,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;

    let first_parts: Vec<&str> = first.split('.').collect();
    let second_parts: Vec<&str> = second.split('.').collect();
    let forged = format!("{}.{}.{}", first_parts[0], second_parts[1], first_parts[2]);

    assert!(matches!(
        verifier.full_verify("1", &forged).await,
        Err(IdentityError::InvalidToken(_))
    ));
    Ok(())
}

/// Fails the first `failures` lookups as if the registry were unreachable.
struct FlakyRegistry {
    inner: Arc<InMemoryStateRegistry>,
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl StateResolver for FlakyRegistry {
    async fn resolve(
        &self,
        id: &Identifier,
        state: Option<&FieldElement>,
    ) -> Result<ResolvedState, IdentityError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(IdentityError::StateResolution("registry unreachable".to_string()));
        }
        self.inner.resolve(id, state).await
    }
}

#[tokio::test]
async fn transient_resolver_failures_are_retried() -> TestResult {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 30)?;
    let flaky = Arc::new(FlakyRegistry {
        inner: fixture.registry.clone(),
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let verifier = fixture.verifier_with(flaky.clone());

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;
    verifier.start_session("1", request.clone())?;
    let token = fixture.holder.respond(
        &request,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;
    verifier.full_verify("1", &token).await?;
    assert!(flaky.calls.load(Ordering::SeqCst) > 2);
    Ok(())
}

#[tokio::test]
async fn unreachable_registry_is_not_a_rejection() -> TestResult {
    let mut fixture = Fixture::new()?;
    fixture.include(CLAIM_NONCE, 30)?;
    let flaky = Arc::new(FlakyRegistry {
        inner: fixture.registry.clone(),
        failures: u32::MAX,
        calls: AtomicU32::new(0),
    });
    let verifier = fixture.verifier_with(flaky);

    let request = sign_in_request(CircuitId::AtomicQueryMtpV2)?;
    verifier.start_session("1", request.clone())?;
    let token = fixture.holder.respond(
        &request,
        verifier.schemas(),
        &fixture.issuer,
        &TransparentProver,
    )?;

    let err = verifier
        .full_verify("1", &token)
        .await
        .expect_err("lookups never succeed");
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(!err.is_rejection());
    Ok(())
}
