//! Causal consistency rules for outgoing commands and incoming replies.
//!
//! Outgoing commands may carry three pieces of session state:
//!
//! - `lsid`: the logical session id (never on `endSessions`).
//! - `$clusterTime`: the highest cluster time the sender has seen.
//! - `readConcern.afterClusterTime`: the session's operation time, on
//!   acknowledged read-like commands of causally consistent sessions.
//!
//! Replies (including failed-command replies) may carry `operationTime` and
//! `$clusterTime`, which callers merge monotonically.

use causeway_types::{
    Acknowledgement, ClusterTime, ClusterTimeError, Command, CommandKind, Document, SessionId,
    Timestamp, Value,
};

pub const LSID: &str = "lsid";
pub const CLUSTER_TIME: &str = "$clusterTime";
pub const OPERATION_TIME: &str = "operationTime";
pub const READ_CONCERN: &str = "readConcern";
pub const AFTER_CLUSTER_TIME: &str = "afterClusterTime";
pub const END_SESSIONS: &str = "endSessions";

/// Sets `lsid` unless the command is `endSessions`.
pub fn attach_lsid(command: &mut Command, id: SessionId) {
    if command.name() == END_SESSIONS {
        return;
    }
    command.insert(LSID, Value::Object(id.to_document()));
}

/// Sets `$clusterTime` when a cluster time is known.
pub fn attach_cluster_time(command: &mut Command, cluster_time: Option<&ClusterTime>) {
    if let Some(cluster_time) = cluster_time {
        command.insert(CLUSTER_TIME, cluster_time.to_value());
    }
}

/// Whether a command of this shape may carry a read concern at all.
pub fn read_concern_allowed(kind: CommandKind, acknowledgement: Acknowledgement) -> bool {
    kind.supports_read_concern() && acknowledgement == Acknowledgement::Acknowledged
}

/// Adds `readConcern.afterClusterTime`, keeping any `level` already present.
///
/// Does nothing for commands that cannot carry a read concern, or while the
/// operation time is unset. Returns true when the field was written.
pub fn attach_after_cluster_time(
    command: &mut Command,
    kind: CommandKind,
    acknowledgement: Acknowledgement,
    operation_time: Timestamp,
) -> bool {
    if !read_concern_allowed(kind, acknowledgement) || !operation_time.is_set() {
        return false;
    }

    let mut read_concern = match command.get(READ_CONCERN) {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Document::new(),
    };
    read_concern.insert(AFTER_CLUSTER_TIME.to_string(), operation_time.to_value());
    command.insert(READ_CONCERN, Value::Object(read_concern));
    true
}

/// Reads `operationTime` from a reply. `None` when the field is absent.
pub fn operation_time_of(reply: &Document) -> Option<Result<Timestamp, ClusterTimeError>> {
    reply
        .get(OPERATION_TIME)
        .map(|value| Timestamp::from_value(value, OPERATION_TIME))
}

/// Reads `$clusterTime` from a reply. `None` when the field is absent.
pub fn cluster_time_of(reply: &Document) -> Option<Result<ClusterTime, ClusterTimeError>> {
    reply.get(CLUSTER_TIME).map(ClusterTime::from_value)
}
