// Error handling module for the idstate verifier node
//
// Core errors are carried through unchanged and mapped onto HTTP statuses by
// their kind, so a holder can tell "try again" from "proof refused".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use idstate::{ErrorKind, IdentityError};
use std::io;
use std::result;
use thiserror::Error;

/// Result type for verifier node operations
pub type Result<T> = result::Result<T, VerifierNodeError>;

#[derive(Debug, Error, Clone)]
pub enum VerifierNodeError {
    /// Errors from the identity core
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Registry record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request to the node itself
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    IO(String),

    /// HTTP client errors
    #[error("Request error: {0}")]
    Request(String),
}

impl VerifierNodeError {
    pub fn status(&self) -> StatusCode {
        match self {
            VerifierNodeError::Identity(e) => match e {
                IdentityError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                IdentityError::SessionExpired(_) => StatusCode::GONE,
                IdentityError::SessionExists(_) | IdentityError::InvalidTransition(_) => {
                    StatusCode::CONFLICT
                }
                e => match e.kind() {
                    ErrorKind::Encoding => StatusCode::BAD_REQUEST,
                    ErrorKind::Signature
                    | ErrorKind::ProofVerification
                    | ErrorKind::QueryMismatch
                    | ErrorKind::StaleState
                    | ErrorKind::UnknownState => StatusCode::UNAUTHORIZED,
                    ErrorKind::Resolution => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Deadline => StatusCode::GATEWAY_TIMEOUT,
                    ErrorKind::Session => StatusCode::BAD_REQUEST,
                    ErrorKind::Tree | ErrorKind::Issuance | ErrorKind::Internal => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
            },
            VerifierNodeError::NotFound(_) => StatusCode::NOT_FOUND,
            VerifierNodeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            VerifierNodeError::Request(_) => StatusCode::BAD_GATEWAY,
            VerifierNodeError::Config(_) | VerifierNodeError::IO(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error kind for the response body
    pub fn kind(&self) -> String {
        match self {
            VerifierNodeError::Identity(e) => format!("{:?}", e.kind()),
            VerifierNodeError::NotFound(_) => "NotFound".to_string(),
            VerifierNodeError::BadRequest(_) => "BadRequest".to_string(),
            VerifierNodeError::Config(_) => "Config".to_string(),
            VerifierNodeError::IO(_) => "IO".to_string(),
            VerifierNodeError::Request(_) => "Request".to_string(),
        }
    }
}

/// Implement IntoResponse for VerifierNodeError so it can be returned directly from handlers
impl IntoResponse for VerifierNodeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "kind": self.kind(),
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

impl From<io::Error> for VerifierNodeError {
    fn from(err: io::Error) -> Self {
        VerifierNodeError::IO(err.to_string())
    }
}

impl From<reqwest::Error> for VerifierNodeError {
    fn from(err: reqwest::Error) -> Self {
        VerifierNodeError::Request(err.to_string())
    }
}

impl From<toml::ser::Error> for VerifierNodeError {
    fn from(err: toml::ser::Error) -> Self {
        VerifierNodeError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for VerifierNodeError {
    fn from(err: toml::de::Error) -> Self {
        VerifierNodeError::Config(err.to_string())
    }
}
