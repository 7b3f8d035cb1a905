//! Identity state resolution
//!
//! Verifiers look up identity states in a registry to learn whether a state
//! was published, whether it is the latest one and when it was superseded.
//! [`InMemoryStateRegistry`] is a registry that accepts transitions directly
//! or through a verified state transition proof; [`RetryingResolver`] wraps
//! any resolver with per-attempt timeouts and exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;
use crate::types::identifier::Identifier;
use crate::zk::pubsignals::StateTransitionPubSignals;
use crate::zk::{CircuitId, ProofVerifier, ZkProof};

/// Registry view of one identity state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedState {
    pub state: FieldElement,
    pub latest: bool,
    /// Unix seconds at which the state was published
    pub created_at: u64,
    /// Unix seconds at which a later state replaced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_at: Option<u64>,
}

#[async_trait]
pub trait StateResolver: Send + Sync {
    /// Look up `state` of `id`, or the latest state when `state` is `None`.
    ///
    /// Unknown states yield `StateNotFound`; registry outages yield the
    /// retryable `StateResolution`.
    async fn resolve(&self, id: &Identifier, state: Option<&FieldElement>) -> Result<ResolvedState>;
}

#[async_trait]
impl<R: StateResolver + ?Sized> StateResolver for Arc<R> {
    async fn resolve(&self, id: &Identifier, state: Option<&FieldElement>) -> Result<ResolvedState> {
        (**self).resolve(id, state).await
    }
}

#[derive(Clone, Copy, Debug)]
struct StateRecord {
    state: FieldElement,
    created_at: u64,
    replaced_at: Option<u64>,
}

impl StateRecord {
    fn resolved(&self) -> ResolvedState {
        ResolvedState {
            state: self.state,
            latest: self.replaced_at.is_none(),
            created_at: self.created_at,
            replaced_at: self.replaced_at,
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStateRegistry {
    identities: RwLock<HashMap<Identifier, Vec<StateRecord>>>,
}

impl InMemoryStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transition of `id` from `old_state` to `new_state` at `timestamp`.
    ///
    /// The first transition of an identity must start from its genesis state;
    /// later ones must start from the latest published state.
    pub fn publish(
        &self,
        id: &Identifier,
        old_state: &FieldElement,
        new_state: &FieldElement,
        timestamp: u64,
    ) -> Result<()> {
        let mut identities = self.identities.write();
        let known = identities.get(id).map(Vec::as_slice).unwrap_or_default();

        match known.last() {
            None if !id.is_genesis_state(old_state) => {
                return Err(IdentityError::InvalidTransition(format!(
                    "first transition of {} must start from its genesis state",
                    id
                )))
            }
            Some(latest) if latest.state != *old_state => {
                return Err(IdentityError::InvalidTransition(format!(
                    "{} is not the latest state of {}",
                    old_state, id
                )))
            }
            _ => {}
        }
        if *new_state == *old_state || known.iter().any(|record| record.state == *new_state) {
            return Err(IdentityError::InvalidTransition(format!(
                "state {} of {} was already published",
                new_state, id
            )));
        }

        let records = identities.entry(*id).or_default();
        match records.last_mut() {
            Some(latest) => latest.replaced_at = Some(timestamp),
            None => records.push(StateRecord {
                state: *old_state,
                created_at: 0,
                replaced_at: Some(timestamp),
            }),
        }
        records.push(StateRecord {
            state: *new_state,
            created_at: timestamp,
            replaced_at: None,
        });
        info!(%id, old = %old_state, new = %new_state, "published state transition");
        Ok(())
    }

    /// Verify a state transition proof and publish the transition it proves.
    pub fn transit_state(
        &self,
        proof: &ZkProof,
        verifier: &dyn ProofVerifier,
        timestamp: u64,
    ) -> Result<()> {
        verifier.verify(CircuitId::StateTransition, proof)?;
        let signals = StateTransitionPubSignals::from_signals(&proof.pub_signals)?;
        let published = self.identities.read().contains_key(&signals.user_id);
        if signals.is_old_state_genesis == published {
            return Err(IdentityError::InvalidTransition(format!(
                "genesis flag of {} disagrees with the registry",
                signals.user_id
            )));
        }
        self.publish(&signals.user_id, &signals.old_state, &signals.new_state, timestamp)
    }

    pub fn latest(&self, id: &Identifier) -> Option<FieldElement> {
        self.identities
            .read()
            .get(id)
            .and_then(|records| records.last().map(|record| record.state))
    }

    fn lookup(&self, id: &Identifier, state: Option<&FieldElement>) -> Result<ResolvedState> {
        let identities = self.identities.read();
        let records = identities
            .get(id)
            .ok_or_else(|| IdentityError::StateNotFound(format!("no states published for {}", id)))?;
        let record = match state {
            None => records.last(),
            Some(state) => records.iter().find(|record| record.state == *state),
        };
        record.map(StateRecord::resolved).ok_or_else(|| {
            IdentityError::StateNotFound(format!(
                "state {} is not published for {}",
                state.map(|s| s.to_string()).unwrap_or_default(),
                id
            ))
        })
    }
}

#[async_trait]
impl StateResolver for InMemoryStateRegistry {
    async fn resolve(&self, id: &Identifier, state: Option<&FieldElement>) -> Result<ResolvedState> {
        self.lookup(id, state)
    }
}

/// Retry budget for registry lookups
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

pub struct RetryingResolver<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: StateResolver> RetryingResolver<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        RetryingResolver { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<R: StateResolver> StateResolver for RetryingResolver<R> {
    async fn resolve(&self, id: &Identifier, state: Option<&FieldElement>) -> Result<ResolvedState> {
        let attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut last_error = IdentityError::StateResolution("no attempt made".to_string());

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.policy.attempt_timeout, self.inner.resolve(id, state)).await {
                Ok(Ok(resolved)) => return Ok(resolved),
                Ok(Err(e)) if !e.is_retryable() => return Err(e),
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = IdentityError::StateResolution(format!(
                        "lookup timed out after {:?}",
                        self.policy.attempt_timeout
                    ))
                }
            }
            if attempt < attempts {
                warn!(%id, attempt, error = %last_error, "state lookup failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
        Err(IdentityError::StateResolution(format!(
            "gave up after {} attempts: {}",
            attempts, last_error
        )))
    }
}
