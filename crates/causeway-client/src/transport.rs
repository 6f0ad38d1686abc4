//! The seam between the session core and the wire.

use causeway_types::{ClusterTime, Command, Document};

use crate::error::TransportError;

/// What the deployment reported during the handshake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerDescription {
    /// `logicalSessionTimeoutMinutes`; `None` when sessions are unsupported.
    pub logical_session_timeout_minutes: Option<u32>,
    /// The `$clusterTime` gossiped in the handshake reply.
    pub cluster_time: Option<ClusterTime>,
}

impl ServerDescription {
    pub fn supports_sessions(&self) -> bool {
        self.logical_session_timeout_minutes.is_some()
    }
}

/// Sends commands to a deployment and reads replies.
///
/// Implementations own connection management, encoding, authentication and
/// server selection. A transport is shared by every client drawn from a
/// pool, so it is used through `&self`.
pub trait Transport: Send + Sync {
    /// Connects if needed and describes the deployment.
    fn handshake(&self) -> Result<ServerDescription, TransportError>;

    /// Runs one command and returns the server's reply.
    ///
    /// A reply with `ok: 0` is returned as [`TransportError::Command`].
    fn execute(&self, command: &Command) -> Result<Document, TransportError>;

    /// Whether any round trip has ever completed.
    fn has_connected(&self) -> bool;

    /// Server address for monitoring events.
    fn address(&self) -> String;
}
