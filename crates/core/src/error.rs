//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures that can be decided without
/// touching storage (payload shape, references, ownership). Storage failures
/// belong to the gateway layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The desired-state payload is malformed (e.g. empty or duplicate names).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An id does not belong to the product, or a name did not resolve.
    #[error("unresolved reference: {0}")]
    Reference(String),

    /// A link would cross ownership boundaries or collide with a uniqueness rule.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// An identifier was invalid (e.g. parse failure, negative value).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
