//! Teardown: returning pooled session ids to the server.
//!
//! When the last handle to a deployment goes away, every identifier the pool
//! knows about (idle or discarded) is sent back in batched `endSessions`
//! commands so the server can free them before its own timeout. Teardown is
//! best effort and never fails.

use std::fmt::Display;

use causeway_types::{Command, Document, SessionId, Value};
use tracing::{debug, warn};

use crate::causal::END_SESSIONS;
use crate::pool::SessionPool;

/// Largest number of ids sent in one `endSessions` command by default.
pub const DEFAULT_END_SESSIONS_BATCH_SIZE: usize = 10_000;

/// Database that `endSessions` runs against.
pub const ADMIN_DATABASE: &str = "admin";

/// Something that can deliver an `endSessions` command.
pub trait EndSessionsSender {
    type Error: Display;

    /// Whether any round trip to the deployment has ever succeeded.
    fn has_connected(&self) -> bool;

    fn send_end_sessions(&self, command: &Command) -> Result<(), Self::Error>;
}

/// What a teardown did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids delivered in batches the server accepted.
    pub ended: usize,
    /// Batches attempted.
    pub batches: usize,
    pub failed_batches: usize,
    /// Ids dropped without being sent because the deployment was never reached.
    pub skipped: usize,
}

/// Splits `ids` into `endSessions` commands of at most `batch_size` ids.
///
/// A batch size of zero is treated as one.
pub fn build_end_sessions_commands(ids: &[SessionId], batch_size: usize) -> Vec<Command> {
    ids.chunks(batch_size.max(1))
        .map(|chunk| {
            let lsids = chunk
                .iter()
                .map(|id| Value::Object(id.to_document()))
                .collect();
            let mut body = Document::new();
            body.insert(END_SESSIONS.to_string(), Value::Array(lsids));
            Command::new(ADMIN_DATABASE, body)
        })
        .collect()
}

/// Drains `pool` and ends every id it held.
pub fn reconcile<S>(pool: &SessionPool, sender: &S, batch_size: usize) -> ReconcileReport
where
    S: EndSessionsSender + ?Sized,
{
    let ids = pool.drain();
    let mut report = ReconcileReport::default();
    if ids.is_empty() {
        return report;
    }

    if !sender.has_connected() {
        warn!(
            sessions = ids.len(),
            "Couldn't send \"endSessions\": no connection to the deployment was ever made"
        );
        report.skipped = ids.len();
        return report;
    }

    for (command, chunk) in build_end_sessions_commands(&ids, batch_size)
        .iter()
        .zip(ids.chunks(batch_size.max(1)))
    {
        report.batches += 1;
        match sender.send_end_sessions(command) {
            Ok(()) => report.ended += chunk.len(),
            Err(e) => {
                report.failed_batches += 1;
                warn!(error = %e, sessions = chunk.len(), "Couldn't send \"endSessions\"");
            }
        }
    }

    debug!(
        ended = report.ended,
        batches = report.batches,
        failed = report.failed_batches,
        "ended pooled sessions"
    );
    report
}
