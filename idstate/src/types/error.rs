use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Error type for identity, issuance and authorization operations
///
/// Every fallible operation in the crate reports one of these variants. The
/// coarse [`ErrorKind`] lets callers (the verifier node in particular) map an
/// error onto a rejection reason or a transport status without matching on
/// every variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A numeric value does not fit below the field modulus
    #[error("Field overflow: {0}")]
    FieldOverflow(String),

    /// A claim was decoded against a schema it does not carry
    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// Byte input is shorter or longer than the encoding requires
    #[error("Truncated input: expected {expected} bytes, got {actual}")]
    TruncatedInput { expected: usize, actual: usize },

    #[error("Invalid claim: {0}")]
    InvalidClaim(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Insertion of a key already present in the tree
    #[error("Key already exists in tree: {0}")]
    KeyExists(String),

    /// Lookup, update or delete of an absent key
    #[error("Key not found in tree: {0}")]
    KeyNotFound(String),

    /// Two keys share a path prefix longer than the tree depth
    #[error("Reached maximum tree level {0}")]
    ReachedMaxLevel(u32),

    #[error("Merkle tree error: {0}")]
    Merkle(String),

    #[error("Signature error: {0}")]
    Signature(String),

    /// A zero-knowledge proof or its public inputs failed verification
    #[error("Proof verification failed: {0}")]
    ProofVerification(String),

    /// A requested scope entry has no matching proof in the response
    #[error("Missing proof for scope request {0}")]
    MissingProof(u32),

    /// Public inputs of a proof disagree with the requested query
    #[error("Query mismatch: {0}")]
    QueryMismatch(String),

    /// A query could not be constructed or resolved against a schema
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A state was superseded longer ago than the accepted delay
    #[error("Stale state: {0}")]
    StaleState(String),

    /// A state is neither published nor the genesis state of its identity
    #[error("State not found: {0}")]
    StateNotFound(String),

    /// Transient failure talking to the state registry
    #[error("State resolution failed: {0}")]
    StateResolution(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Issuance failed: {0}")]
    Issuance(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`IdentityError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Encoding,
    Tree,
    Signature,
    ProofVerification,
    QueryMismatch,
    StaleState,
    UnknownState,
    Resolution,
    Session,
    Issuance,
    Deadline,
    Internal,
}

impl IdentityError {
    /// Create a new serialization error from any displayable source
    pub fn serialization(context: impl Into<String>, source: impl std::fmt::Display) -> Self {
        IdentityError::Serialization(format!("{}: {}", context.into(), source))
    }

    pub fn merkle(message: impl Into<String>) -> Self {
        IdentityError::Merkle(message.into())
    }

    pub fn verification(message: impl Into<String>) -> Self {
        IdentityError::ProofVerification(message.into())
    }

    pub fn query_mismatch(message: impl Into<String>) -> Self {
        IdentityError::QueryMismatch(message.into())
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        IdentityError::InvalidQuery(message.into())
    }

    pub fn issuance(message: impl Into<String>) -> Self {
        IdentityError::Issuance(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        IdentityError::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::FieldOverflow(_)
            | IdentityError::SchemaMismatch { .. }
            | IdentityError::TruncatedInput { .. }
            | IdentityError::InvalidClaim(_)
            | IdentityError::InvalidIdentifier(_)
            | IdentityError::Serialization(_)
            | IdentityError::InvalidQuery(_) => ErrorKind::Encoding,
            IdentityError::KeyExists(_)
            | IdentityError::KeyNotFound(_)
            | IdentityError::ReachedMaxLevel(_)
            | IdentityError::Merkle(_) => ErrorKind::Tree,
            IdentityError::Signature(_) => ErrorKind::Signature,
            IdentityError::ProofVerification(_)
            | IdentityError::MissingProof(_)
            | IdentityError::InvalidToken(_) => ErrorKind::ProofVerification,
            IdentityError::QueryMismatch(_) => ErrorKind::QueryMismatch,
            IdentityError::StaleState(_) => ErrorKind::StaleState,
            IdentityError::StateNotFound(_) | IdentityError::InvalidTransition(_) => {
                ErrorKind::UnknownState
            }
            IdentityError::StateResolution(_) => ErrorKind::Resolution,
            IdentityError::SessionNotFound(_)
            | IdentityError::SessionExpired(_)
            | IdentityError::SessionExists(_) => ErrorKind::Session,
            IdentityError::Issuance(_) => ErrorKind::Issuance,
            IdentityError::DeadlineExceeded(_) => ErrorKind::Deadline,
            IdentityError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only registry lookups are worth retrying; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IdentityError::StateResolution(_))
    }

    /// True when the error means the presented proof was judged and refused,
    /// as opposed to the verifier being unable to judge it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Signature
                | ErrorKind::ProofVerification
                | ErrorKind::QueryMismatch
                | ErrorKind::StaleState
                | ErrorKind::UnknownState
                | ErrorKind::Encoding
        )
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(error: serde_json::Error) -> Self {
        IdentityError::serialization("JSON", error)
    }
}

impl From<hex::FromHexError> for IdentityError {
    fn from(error: hex::FromHexError) -> Self {
        IdentityError::serialization("hex", error)
    }
}

impl From<base64::DecodeError> for IdentityError {
    fn from(error: base64::DecodeError) -> Self {
        IdentityError::serialization("base64", error)
    }
}
