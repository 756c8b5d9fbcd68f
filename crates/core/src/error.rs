// Central error type for the application layer.

use thiserror::Error;

/// Application-level error type.
///
/// Destination-level failures never surface here: they are folded into the
/// per-destination result map as [`crate::domain::DispatchError`]. `AppError`
/// covers everything that aborts a job before fan-out, or fails outside a
/// destination pipeline entirely.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("claim conflict: {0}")]
    ClaimConflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// `ClaimConflict` is a non-fatal skip signal, everything else is a failure.
    pub fn is_claim_conflict(&self) -> bool {
        matches!(self, AppError::ClaimConflict(_))
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

// Infra crates report storage failures as plain strings to avoid a circular
// dependency on sqlx here (orphan rules prevent a From<sqlx::Error> impl).
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Database(err)
    }
}
