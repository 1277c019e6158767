//! Error taxonomy for the approval ceremony and its stores.
//!
//! Every ceremony-level failure is surfaced synchronously to the caller as a
//! structured rejection; nothing here is retried internally. Storage errors
//! are non-fatal at the call sites that hit them — the stores keep serving
//! from memory and log a warning instead of crashing.

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// Challenge session is unknown, already consumed, or too old.
    #[error("invalid or expired session")]
    InvalidSession,

    /// Authentication was attempted before any authenticator was registered.
    #[error("no registered authenticator for '{0}'; register first")]
    NoCredential(String),

    #[error("operation not found")]
    OperationNotFound,

    #[error("operation expired (max {0} seconds)")]
    OperationExpired(i64),

    /// Signature, attestation, origin, or relying-party mismatch.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T, E = ApprovalError> = std::result::Result<T, E>;
