//! Session error types.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while managing sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Sessions cannot be used: unsupported by the deployment, or this build
    /// cannot generate session identifiers.
    #[error("session failure: {0}")]
    SessionFailure(String),

    /// The session was already ended and no longer holds a server session.
    #[error("session has already ended")]
    Ended,
}

impl SessionError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::SessionFailure(message.into())
    }
}
