// API module for the idstate verifier node
//
// This module implements the HTTP API: sign-in requests, holder callbacks and,
// when the node keeps its own registry, the state registry endpoints.

use crate::config::{Config, ResolverKind};
use crate::error::{Result, VerifierNodeError};
use crate::resolver::HttpStateResolver;
use axum::{
    routing::{get, post},
    Router,
};
use idstate::auth::resolver::{InMemoryStateRegistry, StateResolver};
use idstate::zk::{ProofVerifier, TransparentVerifier};
use idstate::Verifier;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

mod handlers;

pub use handlers::*;

/// Shared state of the HTTP handlers
pub struct AppState {
    pub verifier: Arc<Verifier>,
    /// Checks state transition proofs posted to the local registry
    pub proof_verifier: Arc<dyn ProofVerifier>,
    /// Local registry, served under `/identities` when present
    pub registry: Option<Arc<InMemoryStateRegistry>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        verifier: Arc<Verifier>,
        proof_verifier: Arc<dyn ProofVerifier>,
        registry: Option<Arc<InMemoryStateRegistry>>,
        config: Config,
    ) -> Self {
        Self {
            verifier,
            proof_verifier,
            registry,
            config: Arc::new(config),
        }
    }

    /// Wire a verifier from configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let proof_verifier: Arc<dyn ProofVerifier> = Arc::new(TransparentVerifier);

        let (resolver, registry) = match config.resolver.kind {
            ResolverKind::Memory => {
                let registry = Arc::new(InMemoryStateRegistry::new());
                let resolver: Arc<dyn StateResolver> = registry.clone();
                (resolver, Some(registry))
            }
            ResolverKind::Http => {
                let base_url = config.resolver.base_url.clone().ok_or_else(|| {
                    VerifierNodeError::Config("resolver.base_url is not set".to_string())
                })?;
                let resolver: Arc<dyn StateResolver> =
                    Arc::new(HttpStateResolver::new(base_url, config.resolver.timeout_ms)?);
                (resolver, None)
            }
        };

        let verifier = Verifier::in_memory(proof_verifier.clone(), resolver, config.verifier_config());
        Ok(Self::new(Arc::new(verifier), proof_verifier, registry, config))
    }

    /// Random session id for a callback URL
    pub fn next_session_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Create the API router
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/sign-in", get(handlers::sign_in))
        .route("/api/callback", post(handlers::callback));

    if state.registry.is_some() {
        router = router
            .route("/identities/transitions", post(handlers::transit_state))
            .route("/identities/:id/states/latest", get(handlers::latest_state))
            .route("/identities/:id/states/:state", get(handlers::resolve_state));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Periodically drop sessions nobody called back for.
pub fn spawn_session_sweeper(verifier: Arc<Verifier>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let expired = verifier.sessions().expire();
            if expired > 0 {
                debug!("Expired {} pending sessions", expired);
            }
        }
    })
}

/// API Server
pub struct ApiServer {
    state: Arc<AppState>,
    /// Server bind address
    bind_address: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: Arc<AppState>, bind_address: String) -> Self {
        Self {
            state,
            bind_address,
        }
    }

    /// Start the API server
    pub async fn start(&self) -> Result<()> {
        let app = router(self.state.clone());

        // Parse the bind address
        let addr: SocketAddr = self
            .bind_address
            .parse()
            .map_err(|e| VerifierNodeError::Config(format!("Invalid bind address: {}", e)))?;

        let sweeper = spawn_session_sweeper(
            self.state.verifier.clone(),
            self.state.config.verifier.expiry_sweep_interval(),
        );

        info!("Starting verifier API on {}", self.bind_address);

        let served = axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await
            .map_err(|e| VerifierNodeError::Config(format!("Server error: {}", e)));

        sweeper.abort();
        served
    }
}
