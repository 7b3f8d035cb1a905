// idstate verifier node library
//
// HTTP front end of the idstate verifier: issues sign-in requests, verifies
// holder callbacks and resolves identity states against a registry.

pub mod api;
pub mod config;
pub mod error;
pub mod resolver;

pub use crate::api::{router, ApiServer, AppState};
pub use crate::config::Config;
pub use crate::error::{Result, VerifierNodeError};
pub use crate::resolver::HttpStateResolver;
