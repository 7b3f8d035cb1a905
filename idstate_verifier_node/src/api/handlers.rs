// HTTP handlers for the verifier node

use super::AppState;
use crate::error::{Result, VerifierNodeError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use idstate::auth::message::{create_authorization_request_with_message, AuthorizationRequestMessage};
use idstate::auth::resolver::{InMemoryStateRegistry, ResolvedState, StateResolver};
use idstate::utils::time::now;
use idstate::zk::ZkProof;
use idstate::{FieldElement, IdentityError, Identifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pending_sessions: usize,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_sessions: state.verifier.sessions().len(),
    })
}

/// Issue an authorization request and open a session for its callback.
pub async fn sign_in(State(state): State<Arc<AppState>>) -> Result<Json<AuthorizationRequestMessage>> {
    let session_id = state.next_session_id();
    let config = &state.config;
    let callback_url = format!(
        "{}/api/callback?sessionId={}",
        config.api.public_url.trim_end_matches('/'),
        session_id
    );

    let request = config.request.scope.iter().cloned().fold(
        create_authorization_request_with_message(
            config.request.reason.clone(),
            config.request.message.clone(),
            config.api.audience.clone(),
            callback_url,
        ),
        AuthorizationRequestMessage::with_scope,
    );

    state.verifier.start_session(&session_id, request.clone())?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackParams {
    pub session_id: String,
}

/// Verify the token a holder posts back for its session.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    token: String,
) -> Result<String> {
    let token = token.trim();
    if token.is_empty() {
        return Err(VerifierNodeError::BadRequest("empty token".to_string()));
    }

    let verified = state.verifier.full_verify(&params.session_id, token).await?;
    Ok(format!(
        "User with ID {} Successfully authenticated",
        verified.holder
    ))
}

/// Registry lookups answer 404 for unknown states.
fn registry_lookup(result: idstate::Result<ResolvedState>) -> Result<Json<ResolvedState>> {
    match result {
        Ok(resolved) => Ok(Json(resolved)),
        Err(IdentityError::StateNotFound(msg)) => Err(VerifierNodeError::NotFound(msg)),
        Err(e) => Err(e.into()),
    }
}

fn local_registry(state: &AppState) -> Result<&Arc<InMemoryStateRegistry>> {
    state
        .registry
        .as_ref()
        .ok_or_else(|| VerifierNodeError::BadRequest("this node keeps no registry".to_string()))
}

/// Latest published state of an identity
pub async fn latest_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ResolvedState>> {
    let id: Identifier = id.parse()?;
    registry_lookup(local_registry(&state)?.resolve(&id, None).await)
}

/// Registry record of one state
pub async fn resolve_state(
    State(state): State<Arc<AppState>>,
    Path((id, identity_state)): Path<(String, String)>,
) -> Result<Json<ResolvedState>> {
    let id: Identifier = id.parse()?;
    let identity_state: FieldElement = identity_state.parse()?;
    registry_lookup(
        local_registry(&state)?
            .resolve(&id, Some(&identity_state))
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub proof: ZkProof,
}

/// Publish a proven state transition to the local registry.
pub async fn transit_state(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransitionRequest>,
) -> Result<impl IntoResponse> {
    let registry = local_registry(&state)?;
    registry.transit_state(&request.proof, state.proof_verifier.as_ref(), now())?;
    info!("Published state transition with {} public signals", request.proof.pub_signals.len());
    Ok(StatusCode::CREATED)
}
