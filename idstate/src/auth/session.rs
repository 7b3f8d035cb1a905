//! Pending authorization sessions
//!
//! A session maps a session id to the request the verifier issued. Sessions
//! are single use: [`SessionStore::take_once`] removes the entry atomically,
//! so of two concurrent callbacks for the same session exactly one gets the
//! request.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::auth::message::AuthorizationRequestMessage;
use crate::types::error::{IdentityError, Result};

pub trait SessionStore: Send + Sync {
    /// Store the request for a new session. Fails if the id is taken.
    fn put(&self, session_id: &str, request: AuthorizationRequestMessage) -> Result<()>;

    /// Remove and return the request of a session.
    fn take_once(&self, session_id: &str) -> Result<AuthorizationRequestMessage>;

    /// Drop sessions older than the retention period, returning how many were dropped.
    fn expire(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct PendingSession {
    request: AuthorizationRequestMessage,
    created_at: Instant,
}

#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, PendingSession>,
    retention: Duration,
}

impl InMemorySessionStore {
    pub fn new(retention: Duration) -> Self {
        InMemorySessionStore {
            sessions: DashMap::new(),
            retention,
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn put(&self, session_id: &str, request: AuthorizationRequestMessage) -> Result<()> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => Err(IdentityError::SessionExists(session_id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(PendingSession {
                    request,
                    created_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    fn take_once(&self, session_id: &str) -> Result<AuthorizationRequestMessage> {
        let (_, session) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| IdentityError::SessionNotFound(session_id.to_string()))?;
        if session.created_at.elapsed() > self.retention {
            return Err(IdentityError::SessionExpired(session_id.to_string()));
        }
        Ok(session.request)
    }

    fn expire(&self) -> usize {
        let before = self.sessions.len();
        let retention = self.retention;
        self.sessions
            .retain(|_, session| session.created_at.elapsed() <= retention);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, "expired pending sessions");
        }
        removed
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
