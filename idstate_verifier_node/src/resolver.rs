// State registry client
//
// Resolves identity states against a registry REST API:
//   GET {base}/identities/{id}/states/{state}
//   GET {base}/identities/{id}/states/latest

use std::time::Duration;

use async_trait::async_trait;
use idstate::auth::resolver::{ResolvedState, StateResolver};
use idstate::{FieldElement, IdentityError, Identifier};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Result, VerifierNodeError};

/// [`StateResolver`] backed by a remote registry
pub struct HttpStateResolver {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpStateResolver {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(VerifierNodeError::from)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    fn url(&self, id: &Identifier, state: Option<&FieldElement>) -> String {
        match state {
            Some(state) => format!("{}/identities/{}/states/{}", self.base_url, id, state),
            None => format!("{}/identities/{}/states/latest", self.base_url, id),
        }
    }
}

#[async_trait]
impl StateResolver for HttpStateResolver {
    async fn resolve(
        &self,
        id: &Identifier,
        state: Option<&FieldElement>,
    ) -> idstate::Result<ResolvedState> {
        let url = self.url(id, state);
        debug!("Resolving state via {}", url);

        let response = timeout(self.timeout, self.client.get(&url).send())
            .await
            .map_err(|_| IdentityError::StateResolution(format!("{} timed out", url)))?
            .map_err(|e| IdentityError::StateResolution(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IdentityError::StateNotFound(format!(
                "registry has no record of {} for {}",
                state.map(|s| s.to_string()).unwrap_or_else(|| "latest".into()),
                id
            )));
        }
        if status.is_server_error() {
            return Err(IdentityError::StateResolution(format!(
                "{}: HTTP {}",
                url, status
            )));
        }
        if !status.is_success() {
            return Err(IdentityError::internal(format!(
                "registry refused {}: HTTP {}",
                url, status
            )));
        }

        let resolved: ResolvedState = response
            .json()
            .await
            .map_err(|e| IdentityError::serialization("registry response", e))?;
        if let Some(state) = state {
            if resolved.state != *state {
                return Err(IdentityError::internal(format!(
                    "registry answered {} for a lookup of {}",
                    resolved.state, state
                )));
            }
        }
        Ok(resolved)
    }
}
