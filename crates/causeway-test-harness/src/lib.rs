//! # causeway-test-harness: a mock deployment for integration tests
//!
//! [`MockServer`] implements [`Transport`] in process. It keeps a logical
//! cluster clock that ticks on every command, answers with `operationTime`
//! and `$clusterTime`, records every command it receives, fails any command
//! named `bad`, and reports whether a round trip ever happened.
//!
//! [`LogCapture`] records `tracing` output for assertions on log messages.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use causeway_client::{ServerDescription, Transport, TransportError};
use causeway_types::{ClusterTime, Command, Document, SessionId, Timestamp, Value};
use serde_json::json;
use tracing::trace;

/// Error code the server uses for unknown commands.
pub const COMMAND_NOT_FOUND: i32 = 59;

/// Session timeout reported by a default [`MockServer`].
pub const DEFAULT_SESSION_TIMEOUT_MINUTES: u32 = 30;

#[derive(Debug)]
struct MockState {
    clock: Timestamp,
    commands: Vec<Command>,
    connected: bool,
}

/// An in-process deployment.
#[derive(Debug)]
pub struct MockServer {
    state: Mutex<MockState>,
    session_timeout_minutes: Option<u32>,
    reachable: bool,
    address: String,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// A reachable deployment supporting sessions with a 30 minute timeout.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                clock: Timestamp::new(1, 0),
                commands: Vec::new(),
                connected: false,
            }),
            session_timeout_minutes: Some(DEFAULT_SESSION_TIMEOUT_MINUTES),
            reachable: true,
            address: "mock:27017".to_string(),
        }
    }

    /// A deployment reporting `timeout` as its session timeout (`None`: no sessions).
    pub fn with_session_timeout(mut self, timeout: Option<u32>) -> Self {
        self.session_timeout_minutes = timeout;
        self
    }

    /// A deployment that does not support sessions.
    pub fn without_sessions(self) -> Self {
        self.with_session_timeout(None)
    }

    /// A deployment every round trip to fails with a network error.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Wraps the server for sharing with a client.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every command received, oldest first.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// Commands whose name is `name`, oldest first.
    pub fn commands_named(&self, name: &str) -> Vec<Command> {
        self.lock()
            .commands
            .iter()
            .filter(|command| command.name() == name)
            .cloned()
            .collect()
    }

    pub fn last_command(&self) -> Option<Command> {
        self.lock().commands.last().cloned()
    }

    pub fn command_count(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    /// The current cluster time.
    pub fn clock(&self) -> Timestamp {
        self.lock().clock
    }

    /// Every id sent in `endSessions` commands, in order.
    pub fn ended_session_ids(&self) -> Vec<SessionId> {
        self.commands_named("endSessions")
            .iter()
            .filter_map(|command| command.get("endSessions").and_then(Value::as_array))
            .flatten()
            .filter_map(|lsid| lsid.as_object().and_then(SessionId::from_document))
            .collect()
    }

    fn cluster_time_document(clock: Timestamp) -> Value {
        json!({
            "clusterTime": clock.to_value(),
            "signature": {"keyId": 0}
        })
    }

    fn tick(state: &mut MockState) -> Timestamp {
        state.clock = Timestamp::new(state.clock.time(), state.clock.increment() + 1);
        state.clock
    }
}

fn into_document(value: Value) -> Document {
    match value {
        Value::Object(document) => document,
        _ => Document::new(),
    }
}

impl Transport for MockServer {
    fn handshake(&self) -> Result<ServerDescription, TransportError> {
        if !self.reachable {
            return Err(TransportError::Network(format!(
                "No suitable servers found: {} unreachable",
                self.address
            )));
        }
        let mut state = self.lock();
        state.connected = true;
        Ok(ServerDescription {
            logical_session_timeout_minutes: self.session_timeout_minutes,
            cluster_time: Some(ClusterTime::from_timestamp(state.clock)),
        })
    }

    fn execute(&self, command: &Command) -> Result<Document, TransportError> {
        if !self.reachable {
            return Err(TransportError::Network(format!(
                "connection to {} refused",
                self.address
            )));
        }

        let mut state = self.lock();
        state.connected = true;
        state.commands.push(command.clone());
        let operation_time = Self::tick(&mut state);
        trace!(command = command.name(), %operation_time, "mock server received command");

        let cluster_time = Self::cluster_time_document(operation_time);
        if command.name() == "bad" {
            let message = "no such command: 'bad'".to_string();
            let reply = into_document(json!({
                "ok": 0,
                "errmsg": message,
                "code": COMMAND_NOT_FOUND,
                "operationTime": operation_time.to_value(),
                "$clusterTime": cluster_time,
            }));
            return Err(TransportError::Command {
                code: COMMAND_NOT_FOUND,
                message,
                reply,
            });
        }

        Ok(into_document(json!({
            "ok": 1,
            "operationTime": operation_time.to_value(),
            "$clusterTime": cluster_time,
        })))
    }

    fn has_connected(&self) -> bool {
        self.lock().connected
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

/// Collects formatted `tracing` output.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with a subscriber writing into this capture.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_carry_increasing_times() {
        let server = MockServer::new();
        let ping = Command::from_value("admin", json!({"ping": 1}));

        let first = server.execute(&ping).expect("ping");
        let second = server.execute(&ping).expect("ping");
        let op = |reply: &Document| {
            Timestamp::from_value(&reply["operationTime"], "operationTime").expect("timestamp")
        };
        assert!(op(&second) > op(&first));
        assert_eq!(server.command_count(), 2);
        assert!(server.has_connected());
    }

    #[test]
    fn bad_commands_fail_with_a_reply() {
        let server = MockServer::new();
        let err = server
            .execute(&Command::from_value("db", json!({"bad": 1})))
            .expect_err("bad command");
        let reply = err.reply().expect("reply");
        assert_eq!(reply["ok"], json!(0));
        assert!(reply.contains_key("operationTime"));
        assert!(reply.contains_key("$clusterTime"));
    }

    #[test]
    fn unreachable_server_never_connects() {
        let server = MockServer::new().unreachable();
        assert!(server.handshake().is_err());
        assert!(matches!(
            server.execute(&Command::from_value("admin", json!({"ping": 1}))),
            Err(TransportError::Network(_))
        ));
        assert!(!server.has_connected());
        assert_eq!(server.command_count(), 0);
    }

    #[test]
    fn log_capture_records_events() {
        let capture = LogCapture::new();
        capture.capture(|| tracing::warn!("something odd"));
        assert!(capture.contains("something odd"));
    }
}
