use thiserror::Error;

/// Outcome taxonomy for signup and session operations.
///
/// Every kind except `Unavailable` is safe to surface to the caller; the
/// HTTP layer owns the status-code mapping. `Unavailable` wraps the
/// underlying store or transport failure and its source never leaves the
/// server.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user with such email already exists")]
    AlreadyExists,

    #[error("already confirming this email")]
    AlreadyInProgress,

    #[error("no signup in progress for this email")]
    NotInProgress,

    #[error("invalid verification code")]
    CodeMismatch,

    #[error("user does not exist")]
    NotFound,

    #[error("incorrect password")]
    IncorrectCredential,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("service unavailable")]
    Unavailable(#[source] anyhow::Error),
}

impl AuthError {
    /// Wrap any infrastructure failure as the opaque `Unavailable` kind.
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        Self::Unavailable(err.into())
    }
}
