//! Client error types.

use causeway_session::SessionError;
use causeway_types::Document;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The server replied with `ok: 0`. The reply still carries time fields.
    #[error("command failed ({code}): {message}")]
    Command {
        code: i32,
        message: String,
        reply: Document,
    },

    /// No reply was received.
    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// The server reply, if one was received.
    pub fn reply(&self) -> Option<&Document> {
        match self {
            Self::Command { reply, .. } => Some(reply),
            Self::Network(_) => None,
        }
    }
}

/// Errors that can occur when using the client.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// Sessions cannot be used with this deployment or build.
    #[error("session failure: {0}")]
    SessionFailure(String),

    /// A caller-supplied argument was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
