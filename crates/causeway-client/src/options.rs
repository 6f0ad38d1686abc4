//! Client and per-command options.

use causeway_config::CausewayConfig;
use causeway_session::{ClientSession, DEFAULT_END_SESSIONS_BATCH_SIZE, SessionOptions};
use causeway_types::{Acknowledgement, CommandKind, ReadConcern, WriteConcern};

/// Client-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Attached to the client's log events.
    pub app_name: String,
    /// Most session ids per `endSessions` command at shutdown.
    pub end_sessions_batch_size: usize,
    /// Default causal consistency for [`ClientOptions::session_options`].
    pub causal_consistency: bool,
    /// Run session-less commands in a single-use session when the
    /// deployment supports sessions.
    pub implicit_sessions: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            app_name: "causeway".to_string(),
            end_sessions_batch_size: DEFAULT_END_SESSIONS_BATCH_SIZE,
            causal_consistency: true,
            implicit_sessions: true,
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &CausewayConfig) -> Self {
        Self {
            app_name: config.client.app_name.clone(),
            end_sessions_batch_size: config.client.end_sessions_batch_size,
            causal_consistency: config.client.causal_consistency,
            implicit_sessions: config.client.implicit_sessions,
        }
    }

    pub fn with_end_sessions_batch_size(mut self, batch_size: usize) -> Self {
        self.end_sessions_batch_size = batch_size;
        self
    }

    pub fn with_implicit_sessions(mut self, enabled: bool) -> Self {
        self.implicit_sessions = enabled;
        self
    }

    /// Session options built from the client defaults.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::new().with_causal_consistency(self.causal_consistency)
    }
}

/// Options for one command.
#[derive(Debug, Default)]
pub struct CommandOptions<'a> {
    /// Explicit session. Must belong to the executing client.
    pub session: Option<&'a mut ClientSession>,
    /// Sent on read and read/write commands only.
    pub read_concern: Option<ReadConcern>,
    /// Sent on write and read/write commands only.
    pub write_concern: Option<WriteConcern>,
}

impl<'a> CommandOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: &'a mut ClientSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = Some(write_concern);
        self
    }

    /// Only commands that send a write concern can be unacknowledged.
    pub(crate) fn acknowledgement(&self, kind: CommandKind) -> Acknowledgement {
        self.write_concern
            .as_ref()
            .filter(|_| kind.supports_write_concern())
            .map_or(Acknowledgement::Acknowledged, WriteConcern::acknowledgement)
    }
}
