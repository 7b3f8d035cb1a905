// HTTP flow of the verifier node: sign-in request, holder callback, local
// registry endpoints and resolution through a remote registry.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hyper::body::to_bytes;
use idstate::auth::message::AuthorizationRequestMessage;
use idstate::auth::resolver::ResolvedState;
use idstate::claim::codec::{Claim, ClaimFields};
use idstate::claim::schema::SchemaHash;
use idstate::zk::TransparentProver;
use idstate::{FieldElement, Holder, Issuer, KeyPair};
use idstate_verifier_node::config::ResolverKind;
use idstate_verifier_node::{router, AppState, Config};
use serde_json::Value;
use tower::ServiceExt;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Parties {
    issuer: Issuer,
    holder: Holder,
}

impl Parties {
    fn new() -> Result<Self, idstate::IdentityError> {
        Ok(Parties {
            issuer: Issuer::new(KeyPair::from_entropy(b"node issuer"), 1)?,
            holder: Holder::new(KeyPair::from_entropy(b"node holder"), 1)?,
        })
    }

    /// Issue an age claim by inclusion; returns the transition body to publish.
    fn include(&mut self, nonce: u64) -> Result<Value, Box<dyn std::error::Error>> {
        let claim = Claim::encode(
            &ClaimFields::new(SchemaHash::KYC_AGE)
                .with_index_id(self.holder.id())
                .with_index_data(FieldElement::from_u64(19960424), FieldElement::ONE)
                .with_expiration(12345654321)
                .with_revocation_nonce(nonce),
        )?;
        let issuance = self.issuer.issue_by_inclusion(claim, &TransparentProver)?;
        self.holder.store_credential(issuance.credential)?;
        Ok(serde_json::json!({ "proof": issuance.state_transition.proof }))
    }
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>), Box<dyn std::error::Error>> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = to_bytes(response.into_body()).await?;
    Ok((status, body.to_vec()))
}

async fn sign_in(app: &Router) -> Result<AuthorizationRequestMessage, Box<dyn std::error::Error>> {
    let (status, body) = send(app, Request::get("/api/sign-in").body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(serde_json::from_slice(&body)?)
}

/// Path and query of the callback URL in `request`.
fn callback_path(config: &Config, request: &AuthorizationRequestMessage) -> String {
    request
        .body
        .callback_url
        .trim_start_matches(config.api.public_url.as_str())
        .to_string()
}

/// Session id carried by the callback URL of `request`.
fn session_id(request: &AuthorizationRequestMessage) -> Result<uuid::Uuid, Box<dyn std::error::Error>> {
    let (_, id) = request
        .body
        .callback_url
        .split_once("/api/callback?sessionId=")
        .ok_or("callback URL has no session id")?;
    Ok(id.parse()?)
}

async fn publish(app: &Router, transition: &Value) -> Result<StatusCode, Box<dyn std::error::Error>> {
    let request = Request::post("/identities/transitions")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(transition)?))?;
    Ok(send(app, request).await?.0)
}

fn local_node() -> Result<(Arc<AppState>, Router), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::from_config(Config::default())?);
    let app = router(state.clone());
    Ok((state, app))
}

#[tokio::test]
async fn sign_in_returns_a_request_with_a_callback() -> TestResult {
    let (state, app) = local_node()?;
    let first = sign_in(&app).await?;
    let second = sign_in(&app).await?;

    assert_eq!(first.body.reason, "test flow");
    assert_eq!(first.body.scope.len(), 1);
    assert_eq!(first.from, state.config.api.audience);
    let first_session = session_id(&first)?;
    let second_session = session_id(&second)?;
    assert_eq!(first_session.get_version(), Some(uuid::Version::Random));
    assert_ne!(first_session, second_session);
    assert_ne!(first.thread_id, second.thread_id);
    assert_eq!(state.verifier.sessions().len(), 2);
    Ok(())
}

#[tokio::test]
async fn unknown_session_is_not_found() -> TestResult {
    let (_, app) = local_node()?;
    let request = Request::post("/api/callback?sessionId=404").body(Body::from("a.b.c"))?;
    let (status, body) = send(&app, request).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["error"]["code"], 404);
    assert_eq!(error["error"]["kind"], "Session");
    Ok(())
}

#[tokio::test]
async fn callbacks_to_other_sessions_leave_pending_ones_alone() -> TestResult {
    let (state, app) = local_node()?;
    let request = sign_in(&app).await?;

    for guess in ["1", "2", "00000000-0000-0000-0000-000000000000"] {
        let path = format!("/api/callback?sessionId={}", guess);
        let (status, _) = send(&app, Request::post(path.as_str()).body(Body::from("a.b.c"))?).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    assert_eq!(state.verifier.sessions().len(), 1);
    assert!(callback_path(&state.config, &request).contains(&session_id(&request)?.to_string()));
    Ok(())
}

#[tokio::test]
async fn holder_signs_in() -> TestResult {
    let (state, app) = local_node()?;
    let mut parties = Parties::new()?;
    let transition = parties.include(7)?;
    assert_eq!(publish(&app, &transition).await?, StatusCode::CREATED);

    let request = sign_in(&app).await?;
    let token = parties.holder.respond(
        &request,
        state.verifier.schemas(),
        &parties.issuer,
        &TransparentProver,
    )?;
    let path = callback_path(&state.config, &request);

    let (status, body) = send(&app, Request::post(path.as_str()).body(Body::from(token.clone()))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body)?,
        format!("User with ID {} Successfully authenticated", parties.holder.id())
    );

    // The session is consumed by the first callback.
    let (status, _) = send(&app, Request::post(path.as_str()).body(Body::from(token))?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn malformed_token_is_unauthorized() -> TestResult {
    let (state, app) = local_node()?;
    let request = sign_in(&app).await?;
    let path = callback_path(&state.config, &request);

    let (status, body) = send(&app, Request::post(path.as_str()).body(Body::from("not-a-token"))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["error"]["kind"], "ProofVerification");
    Ok(())
}

#[tokio::test]
async fn empty_token_is_a_bad_request() -> TestResult {
    let (state, app) = local_node()?;
    let request = sign_in(&app).await?;
    let path = callback_path(&state.config, &request);

    let (status, _) = send(&app, Request::post(path.as_str()).body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // A refused callback leaves the session pending.
    assert_eq!(state.verifier.sessions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn registry_endpoints_track_transitions() -> TestResult {
    let (_, app) = local_node()?;
    let mut parties = Parties::new()?;
    let issuer_id = parties.issuer.id();
    let genesis = parties.issuer.genesis_state().state;

    let latest = format!("/identities/{}/states/latest", issuer_id);
    let (status, _) = send(&app, Request::get(latest.as_str()).body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let transition = parties.include(8)?;
    assert_eq!(publish(&app, &transition).await?, StatusCode::CREATED);
    // Replaying the same transition no longer starts from the latest state.
    assert_eq!(publish(&app, &transition).await?, StatusCode::CONFLICT);

    let (status, body) = send(&app, Request::get(latest.as_str()).body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    let resolved: ResolvedState = serde_json::from_slice(&body)?;
    assert!(resolved.latest);
    assert_eq!(resolved.state, parties.issuer.tree_state()?.state);

    let first = format!("/identities/{}/states/{}", issuer_id, genesis);
    let (status, body) = send(&app, Request::get(first.as_str()).body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    let resolved: ResolvedState = serde_json::from_slice(&body)?;
    assert!(!resolved.latest);
    assert!(resolved.replaced_at.is_some());
    Ok(())
}

#[tokio::test]
async fn verifier_resolves_through_a_remote_registry() -> TestResult {
    // Registry node on an ephemeral port.
    let (_, registry_app) = local_node()?;
    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    let server = axum::Server::bind(&addr).serve(registry_app.clone().into_make_service());
    let registry_addr = server.local_addr();
    tokio::spawn(server);

    let mut config = Config::default();
    config.resolver.kind = ResolverKind::Http;
    config.resolver.base_url = Some(format!("http://{}", registry_addr));
    let state = Arc::new(AppState::from_config(config)?);
    assert!(state.registry.is_none());
    let app = router(state.clone());

    let mut parties = Parties::new()?;
    let transition = parties.include(9)?;
    assert_eq!(publish(&registry_app, &transition).await?, StatusCode::CREATED);

    let request = sign_in(&app).await?;
    let token = parties.holder.respond(
        &request,
        state.verifier.schemas(),
        &parties.issuer,
        &TransparentProver,
    )?;
    let path = callback_path(&state.config, &request);
    let (status, _) = send(&app, Request::post(path.as_str()).body(Body::from(token))?).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unreachable_registry_is_unavailable() -> TestResult {
    let mut config = Config::default();
    config.resolver.kind = ResolverKind::Http;
    // Nothing listens on the discard port.
    config.resolver.base_url = Some("http://127.0.0.1:9".to_string());
    config.resolver.timeout_ms = 500;
    config.verifier.resolver_attempts = 2;
    config.verifier.resolver_backoff_ms = 10;
    let state = Arc::new(AppState::from_config(config)?);
    let app = router(state.clone());

    let mut parties = Parties::new()?;
    parties.include(10)?;
    let request = sign_in(&app).await?;
    let token = parties.holder.respond(
        &request,
        state.verifier.schemas(),
        &parties.issuer,
        &TransparentProver,
    )?;
    let path = callback_path(&state.config, &request);
    let (status, body) = send(&app, Request::post(path.as_str()).body(Body::from(token))?).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: Value = serde_json::from_slice(&body)?;
    assert_eq!(error["error"]["kind"], "Resolution");
    Ok(())
}

#[tokio::test]
async fn health_reports_pending_sessions() -> TestResult {
    let (_, app) = local_node()?;
    sign_in(&app).await?;
    let (status, body) = send(&app, Request::get("/health").body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body)?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["pending_sessions"], 1);
    Ok(())
}
