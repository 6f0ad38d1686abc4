//! Session-aware command execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use causeway_session::end_sessions::{self, EndSessionsSender, ReconcileReport};
use causeway_session::{ClientSession, SessionOptions, causal};
use causeway_types::{
    Acknowledgement, ClientId, Command, CommandKind, Document, SessionId, Value,
};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult, TransportError};
use crate::monitor::{
    CommandFailedEvent, CommandMonitor, CommandStartedEvent, CommandSucceededEvent,
    next_request_id,
};
use crate::options::{ClientOptions, CommandOptions};
use crate::topology::Topology;
use crate::transport::{ServerDescription, Transport};

const WRITE_CONCERN: &str = "writeConcern";

/// A handle for running commands against one deployment.
///
/// A client created with [`Client::new`] owns its deployment: dropping it
/// (or calling [`Client::shutdown`]) ends every pooled server session. A
/// client obtained from a [`ClientPool`](crate::ClientPool) shares the
/// deployment with its siblings and leaves teardown to the pool.
pub struct Client {
    id: ClientId,
    topology: Arc<Topology>,
    options: ClientOptions,
    monitor: Option<Arc<dyn CommandMonitor>>,
    pooled: bool,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("topology", &self.topology)
            .field("options", &self.options)
            .field("pooled", &self.pooled)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self::build(Arc::new(Topology::new(transport)), options, None, false)
    }

    pub(crate) fn pooled(
        topology: Arc<Topology>,
        options: ClientOptions,
        monitor: Option<Arc<dyn CommandMonitor>>,
    ) -> Self {
        Self::build(topology, options, monitor, true)
    }

    fn build(
        topology: Arc<Topology>,
        options: ClientOptions,
        monitor: Option<Arc<dyn CommandMonitor>>,
        pooled: bool,
    ) -> Self {
        let id = ClientId::next();
        debug!(client = %id, app_name = %options.app_name, pooled, "created client");
        Self {
            id,
            topology,
            options,
            monitor,
            pooled,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Installs a command monitor.
    pub fn with_monitor(mut self, monitor: Arc<dyn CommandMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Starts an explicit session.
    ///
    /// Runs the handshake first if the deployment has not been described.
    pub fn start_session(&self, options: SessionOptions) -> ClientResult<ClientSession> {
        if !SessionId::generation_supported() {
            return Err(ClientError::SessionFailure(
                "need a cryptography library to use sessions".to_string(),
            ));
        }

        let description = self.topology.describe()?;
        if !description.supports_sessions() {
            return Err(ClientError::SessionFailure(
                "Server does not support sessions".to_string(),
            ));
        }

        let session = ClientSession::start(
            Arc::clone(self.topology.pool()),
            self.id,
            options,
            Instant::now(),
        )?;
        Ok(session)
    }

    /// Starts an explicit session with the client's default options.
    pub fn start_default_session(&self) -> ClientResult<ClientSession> {
        self.start_session(self.options.session_options())
    }

    /// Runs a command verbatim: never attaches read or write concerns.
    pub fn command(&self, command: Command, options: CommandOptions<'_>) -> ClientResult<Document> {
        self.run(command, CommandKind::Generic, options)
    }

    /// Runs a read command, applying the read concern.
    pub fn read_command(
        &self,
        command: Command,
        options: CommandOptions<'_>,
    ) -> ClientResult<Document> {
        self.run(command, CommandKind::Read, options)
    }

    /// Runs a write command, applying the write concern.
    pub fn write_command(
        &self,
        command: Command,
        options: CommandOptions<'_>,
    ) -> ClientResult<Document> {
        self.run(command, CommandKind::Write, options)
    }

    /// Runs a command that reads and writes, applying both concerns.
    pub fn read_write_command(
        &self,
        command: Command,
        options: CommandOptions<'_>,
    ) -> ClientResult<Document> {
        self.run(command, CommandKind::ReadWrite, options)
    }

    fn run(
        &self,
        mut command: Command,
        kind: CommandKind,
        options: CommandOptions<'_>,
    ) -> ClientResult<Document> {
        let acknowledgement = options.acknowledgement(kind);
        let CommandOptions {
            session,
            read_concern,
            write_concern,
        } = options;

        if let Some(session) = session.as_deref() {
            self.check_session(session)?;
        }

        let description = self.topology.describe()?;

        if kind.supports_write_concern() {
            if let Some(write_concern) = write_concern.filter(|wc| !wc.is_default()) {
                command.insert(WRITE_CONCERN, Value::Object(write_concern.to_document()));
            }
        }
        if causal::read_concern_allowed(kind, acknowledgement) {
            if let Some(read_concern) = read_concern.filter(|rc| !rc.is_default()) {
                command.insert(
                    causal::READ_CONCERN,
                    Value::Object(read_concern.to_document()),
                );
            }
        }

        let mut implicit = if session.is_none() {
            self.implicit_session(&description, acknowledgement)
        } else {
            None
        };
        let mut session = session.or(implicit.as_mut());

        let deployment_time = self.topology.cluster_time();
        match session.as_deref_mut() {
            Some(session) => {
                if let Some(cluster_time) = &deployment_time {
                    session.advance_cluster_time_to(cluster_time);
                }
                session.append(&mut command, kind, acknowledgement)?;
            }
            None => causal::attach_cluster_time(&mut command, deployment_time.as_ref()),
        }

        let result = self.dispatch(&command);
        let now = Instant::now();

        let reply = match (acknowledgement, &result) {
            (Acknowledgement::Unacknowledged, _) => None,
            (Acknowledgement::Acknowledged, Ok(reply)) => Some(reply),
            (Acknowledgement::Acknowledged, Err(error)) => error.reply(),
        };
        if let Some(reply) = reply {
            self.gossip(reply);
        }
        if let Some(session) = session.filter(|_| {
            acknowledgement == Acknowledgement::Acknowledged || result.is_ok()
        }) {
            session.process_reply(reply, acknowledgement, now);
        }
        if let Some(mut implicit) = implicit {
            implicit.end_at(now);
        }

        match acknowledgement {
            Acknowledgement::Acknowledged => Ok(result?),
            Acknowledgement::Unacknowledged => result.map(|_| Document::new()).map_err(Into::into),
        }
    }

    fn check_session(&self, session: &ClientSession) -> ClientResult<()> {
        if session.client_id() != self.id {
            return Err(ClientError::InvalidArgument(format!(
                "Invalid sessionId: session was started by {}, not {}",
                session.client_id(),
                self.id
            )));
        }
        if session.is_ended() {
            return Err(ClientError::InvalidArgument(
                "Invalid sessionId: session has ended".to_string(),
            ));
        }
        Ok(())
    }

    fn implicit_session(
        &self,
        description: &ServerDescription,
        acknowledgement: Acknowledgement,
    ) -> Option<ClientSession> {
        if !self.options.implicit_sessions
            || acknowledgement == Acknowledgement::Unacknowledged
            || !description.supports_sessions()
            || !SessionId::generation_supported()
        {
            return None;
        }
        ClientSession::start_implicit(
            Arc::clone(self.topology.pool()),
            self.id,
            self.options.session_options(),
            Instant::now(),
        )
        .ok()
    }

    fn gossip(&self, reply: &Document) {
        match causal::cluster_time_of(reply) {
            Some(Ok(cluster_time)) => {
                self.topology.advance_cluster_time(&cluster_time);
            }
            Some(Err(e)) => debug!(error = %e, "ignoring malformed $clusterTime in reply"),
            None => {}
        }
    }

    /// Sends a command as-is, reporting it to the monitor.
    fn dispatch(&self, command: &Command) -> Result<Document, TransportError> {
        let transport = self.topology.transport();
        let address = transport.address();
        let request_id = next_request_id();
        let command_name = command.name();

        if let Some(monitor) = &self.monitor {
            monitor.started(&CommandStartedEvent {
                command: command.body(),
                database_name: command.database(),
                command_name,
                request_id,
                operation_id: request_id,
                address: &address,
            });
        }
        debug!(command = command_name, database = command.database(), request_id, "sending command");

        let start = Instant::now();
        let result = transport.execute(command);
        let duration = start.elapsed();

        if let Some(monitor) = &self.monitor {
            match &result {
                Ok(reply) => monitor.succeeded(&CommandSucceededEvent {
                    reply,
                    command_name,
                    request_id,
                    operation_id: request_id,
                    address: &address,
                    duration,
                }),
                Err(error) => monitor.failed(&CommandFailedEvent {
                    error,
                    command_name,
                    request_id,
                    operation_id: request_id,
                    address: &address,
                    duration,
                }),
            }
        }
        result
    }

    /// Ends every pooled server session. Later calls do nothing.
    ///
    /// Pooled clients leave this to their [`ClientPool`](crate::ClientPool).
    pub fn shutdown(&self) -> ReconcileReport {
        if self.pooled || self.shut_down.swap(true, Ordering::SeqCst) {
            return ReconcileReport::default();
        }
        self.end_pooled_sessions()
    }

    pub(crate) fn end_pooled_sessions(&self) -> ReconcileReport {
        let report = end_sessions::reconcile(
            self.topology.pool().as_ref(),
            self,
            self.options.end_sessions_batch_size,
        );
        info!(
            client = %self.id,
            ended = report.ended,
            batches = report.batches,
            skipped = report.skipped,
            "shut down"
        );
        report
    }
}

impl EndSessionsSender for Client {
    type Error = TransportError;

    fn has_connected(&self) -> bool {
        self.topology.transport().has_connected()
    }

    fn send_end_sessions(&self, command: &Command) -> Result<(), TransportError> {
        self.dispatch(command).map(|_| ())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
