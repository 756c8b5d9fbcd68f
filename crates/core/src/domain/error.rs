// Domain error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid post state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("post not found: {0}")]
    PostNotFound(String),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
