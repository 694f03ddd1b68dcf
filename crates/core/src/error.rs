//! Caller-visible error taxonomy.

use thiserror::Error;

/// Result type used by the identity and policy layers.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Each variant maps to one stable caller-visible status. Messages are safe to
/// show to the caller; infrastructure detail goes to logs, not into `Internal`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty email).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Bad credentials or a bad/expired/missing token.
    #[error("invalid credentials")]
    Unauthorized,

    /// The caller is authenticated but its role lacks the capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or exactly-once rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The resource exists but its validity window has passed.
    #[error("expired: {0}")]
    Expired(String),

    /// The operation needs state the caller does not have yet.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Storage, hashing or signing failed.
    #[error("internal error")]
    Internal,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        Self::Expired(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    /// Short machine-readable code, used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::Unauthorized => "unauthorized",
            DomainError::Forbidden(_) => "forbidden",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::Expired(_) => "expired",
            DomainError::PreconditionFailed(_) => "precondition_failed",
            DomainError::Internal => "internal_error",
        }
    }
}
