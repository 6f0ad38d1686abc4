//! Caller-visible sessions.

use std::sync::Arc;
use std::time::Instant;

use causeway_types::{
    Acknowledgement, ClientId, ClusterTime, Command, CommandKind, Document, SessionId, Timestamp,
};
use tracing::{debug, error};

use crate::causal;
use crate::error::{SessionError, SessionResult};
use crate::pool::SessionPool;
use crate::server_session::ServerSession;

/// Options fixed when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Reads observe the session's previous operations.
    pub causal_consistency: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            causal_consistency: true,
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_causal_consistency(mut self, enabled: bool) -> Self {
        self.causal_consistency = enabled;
        self
    }
}

/// A logical session borrowed from a [`SessionPool`].
///
/// Holds its [`ServerSession`] exclusively until [`ClientSession::end`] (or
/// drop) returns it to the pool. Tracks the causal state of everything done
/// through it: the highest operation time and cluster time observed.
#[derive(Debug)]
pub struct ClientSession {
    server_session: Option<ServerSession>,
    pool: Arc<SessionPool>,
    client_id: ClientId,
    options: SessionOptions,
    cluster_time: Option<ClusterTime>,
    operation_time: Timestamp,
    implicit: bool,
}

impl ClientSession {
    /// Starts an explicit session for `client_id`.
    pub fn start(
        pool: Arc<SessionPool>,
        client_id: ClientId,
        options: SessionOptions,
        now: Instant,
    ) -> SessionResult<Self> {
        let server_session = pool.acquire(now)?;
        debug!(session_id = %server_session.id(), client = %client_id, "started session");
        Ok(Self {
            server_session: Some(server_session),
            pool,
            client_id,
            options,
            cluster_time: None,
            operation_time: Timestamp::ZERO,
            implicit: false,
        })
    }

    /// Starts a session that lives for a single command.
    pub fn start_implicit(
        pool: Arc<SessionPool>,
        client_id: ClientId,
        options: SessionOptions,
        now: Instant,
    ) -> SessionResult<Self> {
        let mut session = Self::start(pool, client_id, options, now)?;
        session.implicit = true;
        Ok(session)
    }

    /// The session id, or `None` once the session has ended.
    pub fn id(&self) -> Option<SessionId> {
        self.server_session.as_ref().map(ServerSession::id)
    }

    /// The lsid document sent with commands, or `None` once ended.
    pub fn lsid(&self) -> Option<Document> {
        self.id().map(|id| id.to_document())
    }

    pub fn cluster_time(&self) -> Option<&ClusterTime> {
        self.cluster_time.as_ref()
    }

    /// The latest operation time, `(0, 0)` before the first acknowledged reply.
    pub fn operation_time(&self) -> Timestamp {
        self.operation_time
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn causal_consistency(&self) -> bool {
        self.options.causal_consistency
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn is_ended(&self) -> bool {
        self.server_session.is_none()
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn server_session(&self) -> Option<&ServerSession> {
        self.server_session.as_ref()
    }

    pub fn server_session_mut(&mut self) -> Option<&mut ServerSession> {
        self.server_session.as_mut()
    }

    /// Merges a `$clusterTime` document.
    ///
    /// Malformed documents are logged and ignored.
    pub fn advance_cluster_time(&mut self, document: &Document) {
        match ClusterTime::parse(document) {
            Ok(cluster_time) => {
                self.advance_cluster_time_to(&cluster_time);
            }
            Err(e) => error!(error = %e, "Cannot parse cluster time"),
        }
    }

    /// Adopts `cluster_time` if it is greater than the current one.
    pub fn advance_cluster_time_to(&mut self, cluster_time: &ClusterTime) -> bool {
        match &self.cluster_time {
            Some(current) if !cluster_time.is_greater_than(current) => false,
            _ => {
                self.cluster_time = Some(cluster_time.clone());
                true
            }
        }
    }

    /// Adopts `(time, increment)` if it is greater than the current operation time.
    pub fn advance_operation_time(&mut self, time: u32, increment: u32) {
        self.operation_time.advance(Timestamp::new(time, increment));
    }

    /// Adds `lsid`, `$clusterTime` and, for causally consistent reads,
    /// `readConcern.afterClusterTime` to an outgoing command.
    pub fn append(
        &self,
        command: &mut Command,
        kind: CommandKind,
        acknowledgement: Acknowledgement,
    ) -> SessionResult<()> {
        let server_session = self.server_session.as_ref().ok_or(SessionError::Ended)?;

        causal::attach_lsid(command, server_session.id());
        causal::attach_cluster_time(command, self.cluster_time.as_ref());
        if self.options.causal_consistency {
            causal::attach_after_cluster_time(command, kind, acknowledgement, self.operation_time);
        }
        Ok(())
    }

    /// Merges the time fields of a reply (or failed-command reply) and marks
    /// the server session used at `now`.
    ///
    /// An unacknowledged command that was sent has no reply; pass `None`.
    /// An acknowledged command with no reply never completed a round trip,
    /// so the server session keeps its previous last-used time.
    pub fn process_reply(
        &mut self,
        reply: Option<&Document>,
        acknowledgement: Acknowledgement,
        now: Instant,
    ) {
        if let Some(reply) = reply {
            if acknowledgement == Acknowledgement::Acknowledged {
                match causal::operation_time_of(reply) {
                    Some(Ok(operation_time)) => {
                        self.operation_time.advance(operation_time);
                    }
                    Some(Err(e)) => error!(error = %e, "Cannot parse operation time"),
                    None => {}
                }
            }

            match causal::cluster_time_of(reply) {
                Some(Ok(cluster_time)) => {
                    self.advance_cluster_time_to(&cluster_time);
                }
                Some(Err(e)) => error!(error = %e, "Cannot parse cluster time"),
                None => {}
            }
        }

        let round_trip = reply.is_some() || acknowledgement == Acknowledgement::Unacknowledged;
        if let Some(server_session) = self.server_session.as_mut().filter(|_| round_trip) {
            server_session.touch(now);
        }
    }

    /// Returns the server session to the pool. Later calls do nothing.
    pub fn end(&mut self) {
        self.end_at(Instant::now());
    }

    /// [`ClientSession::end`] with an explicit clock reading.
    pub fn end_at(&mut self, now: Instant) {
        if let Some(server_session) = self.server_session.take() {
            debug!(session_id = %server_session.id(), implicit = self.implicit, "ended session");
            self.pool.release(server_session, now);
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    /// A session holding a known id, so tests do not depend on id generation.
    fn session_in(pool: &Arc<SessionPool>) -> ClientSession {
        pool.release(
            ServerSession::with_id(SessionId::from_bytes([9; 16])),
            Instant::now(),
        );
        ClientSession::start(
            Arc::clone(pool),
            ClientId::next(),
            SessionOptions::default(),
            Instant::now(),
        )
        .expect("pooled session")
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .expect("log buffer")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
        }
    }

    fn with_captured_logs(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        captured.contents()
    }

    #[test]
    fn options_default_to_causal() {
        assert!(SessionOptions::default().causal_consistency);
        assert!(!SessionOptions::new().with_causal_consistency(false).causal_consistency);
    }

    #[test]
    fn fresh_session_has_no_time_state() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let session = session_in(&pool);
        assert_eq!(session.operation_time(), Timestamp::ZERO);
        assert!(session.cluster_time().is_none());
        assert!(!session.is_implicit());
        assert_eq!(
            session.lsid(),
            Some(SessionId::from_bytes([9; 16]).to_document())
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn operation_time_is_monotonic() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);

        session.advance_operation_time(1, 1);
        session.advance_operation_time(1, 0);
        assert_eq!(session.operation_time(), Timestamp::new(1, 1));
        session.advance_operation_time(2, 2);
        assert_eq!(session.operation_time(), Timestamp::new(2, 2));
    }

    #[test]
    fn cluster_time_is_monotonic_and_ignores_garbage() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);
        let ct = |t, i| doc(json!({"clusterTime": {"$timestamp": {"t": t, "i": i}}}));

        session.advance_cluster_time(&ct(1, 1));
        session.advance_cluster_time(&ct(1, 0));
        assert_eq!(
            session.cluster_time().map(ClusterTime::timestamp),
            Some(Timestamp::new(1, 1))
        );

        let logs = with_captured_logs(|| {
            session.advance_cluster_time(&doc(json!({"foo": 1})));
            session.advance_cluster_time(&doc(json!({"clusterTime": 1})));
        });
        assert!(logs.contains("Cannot parse cluster time"), "logs: {logs}");
        assert_eq!(
            session.cluster_time().map(ClusterTime::timestamp),
            Some(Timestamp::new(1, 1))
        );

        session.advance_cluster_time(&ct(2, 2));
        assert_eq!(
            session.cluster_time().map(ClusterTime::timestamp),
            Some(Timestamp::new(2, 2))
        );
    }

    #[test]
    fn append_attaches_session_state() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);
        let mut first = Command::from_value("db", json!({"find": "coll"}));
        session
            .append(&mut first, CommandKind::Read, Acknowledgement::Acknowledged)
            .expect("append");
        assert!(first.contains_key("lsid"));
        assert!(!first.contains_key("$clusterTime"));
        assert!(!first.contains_key("readConcern"));

        session.advance_operation_time(5, 1);
        session.advance_cluster_time_to(&ClusterTime::from_timestamp(Timestamp::new(6, 0)));
        let mut second = Command::from_value("db", json!({"find": "coll"}));
        session
            .append(&mut second, CommandKind::Read, Acknowledgement::Acknowledged)
            .expect("append");
        assert_eq!(
            second.get("readConcern"),
            Some(&json!({"afterClusterTime": {"$timestamp": {"t": 5, "i": 1}}}))
        );
        assert_eq!(
            second.get("$clusterTime"),
            Some(&json!({"clusterTime": {"$timestamp": {"t": 6, "i": 0}}}))
        );
    }

    #[test]
    fn non_causal_sessions_skip_after_cluster_time() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        pool.release(
            ServerSession::with_id(SessionId::from_bytes([4; 16])),
            Instant::now(),
        );
        let mut session = ClientSession::start(
            Arc::clone(&pool),
            ClientId::next(),
            SessionOptions::new().with_causal_consistency(false),
            Instant::now(),
        )
        .expect("pooled session");
        session.advance_operation_time(5, 1);

        let mut cmd = Command::from_value("db", json!({"find": "coll"}));
        session
            .append(&mut cmd, CommandKind::Read, Acknowledgement::Acknowledged)
            .expect("append");
        assert!(!cmd.contains_key("readConcern"));
    }

    #[test]
    fn process_reply_merges_and_touches() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);
        let now = Instant::now();
        let reply = doc(json!({
            "ok": 1,
            "operationTime": {"$timestamp": {"t": 7, "i": 1}},
            "$clusterTime": {"clusterTime": {"$timestamp": {"t": 7, "i": 2}}}
        }));

        session.process_reply(Some(&reply), Acknowledgement::Acknowledged, now);
        assert_eq!(session.operation_time(), Timestamp::new(7, 1));
        assert_eq!(
            session.cluster_time().map(ClusterTime::timestamp),
            Some(Timestamp::new(7, 2))
        );
        assert_eq!(
            session.server_session().and_then(ServerSession::last_used),
            Some(now)
        );
    }

    #[test]
    fn unacknowledged_replies_leave_operation_time() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);
        let reply = doc(json!({"operationTime": {"$timestamp": {"t": 7, "i": 1}}}));
        let now = Instant::now();

        session.process_reply(Some(&reply), Acknowledgement::Unacknowledged, now);
        assert_eq!(session.operation_time(), Timestamp::ZERO);
        session.process_reply(None, Acknowledgement::Unacknowledged, now);
        assert_eq!(
            session.server_session().and_then(ServerSession::last_used),
            Some(now)
        );
    }

    #[test]
    fn missing_acknowledged_reply_leaves_last_used() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);
        let before = session.server_session().and_then(ServerSession::last_used);

        session.process_reply(
            None,
            Acknowledgement::Acknowledged,
            Instant::now() + Duration::from_secs(60),
        );
        assert_eq!(
            session.server_session().and_then(ServerSession::last_used),
            before
        );
    }

    #[test]
    fn end_returns_session_once() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);
        let id = session.id().expect("live session");

        session.end();
        assert!(session.is_ended());
        assert!(session.lsid().is_none());
        assert_eq!(pool.idle_ids(), vec![id]);

        session.end();
        assert_eq!(pool.len(), 1);
        assert_eq!(
            session.append(
                &mut Command::from_value("db", json!({"ping": 1})),
                CommandKind::Generic,
                Acknowledgement::Acknowledged
            ),
            Err(SessionError::Ended)
        );
    }

    #[test]
    fn drop_returns_session() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let id = {
            let session = session_in(&pool);
            session.id().expect("live session")
        };
        assert!(pool.contains(&id));
    }

    #[test]
    fn ending_an_expired_session_discards_it() {
        let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
        let mut session = session_in(&pool);
        let id = session.id().expect("live session");
        let used = Instant::now();
        session.process_reply(None, Acknowledgement::Unacknowledged, used);

        session.end_at(used + Duration::from_secs(30 * 60));
        assert!(pool.is_empty());
        assert_eq!(pool.drain(), vec![id]);
    }

    proptest! {
        #[test]
        fn operation_time_tracks_the_maximum(pairs in proptest::collection::vec((0u32..100, 0u32..100), 1..40)) {
            let pool = Arc::new(SessionPool::with_timeout_minutes(Some(30)));
            let mut session = session_in(&pool);
            let mut previous = Timestamp::ZERO;
            for (t, i) in pairs {
                session.advance_operation_time(t, i);
                prop_assert!(session.operation_time() >= previous);
                previous = session.operation_time();
            }
        }
    }
}
