//! Zero-knowledge authorization
//!
//! Messages exchanged between verifier and holder, the queries a verifier
//! asks, the token a holder answers with, and the verifier's session state
//! machine with its state registry lookups.

pub mod message;
pub mod query;
pub mod resolver;
pub mod session;
pub mod token;
pub mod verifier;

pub use message::{
    create_authorization_request, create_authorization_request_with_message,
    AuthorizationRequestMessage, AuthorizationResponseMessage, ZeroKnowledgeProofRequest,
    ZeroKnowledgeProofResponse,
};
pub use query::{AllowedIssuers, CircuitQuery, Operator, Query};
pub use resolver::{InMemoryStateRegistry, ResolvedState, RetryPolicy, RetryingResolver, StateResolver};
pub use session::{InMemorySessionStore, SessionStore};
pub use token::Token;
pub use verifier::{SessionStatus, VerifiedHolder, Verifier, VerifierConfig};
