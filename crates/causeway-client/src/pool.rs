//! A pool of clients sharing one deployment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use causeway_session::ReconcileReport;
use tracing::debug;

use crate::client::Client;
use crate::monitor::CommandMonitor;
use crate::options::ClientOptions;
use crate::topology::Topology;
use crate::transport::Transport;

/// Hands out [`Client`]s that share one [`Topology`], and therefore one
/// server session pool.
///
/// Dropping the pool (or calling [`ClientPool::shutdown`]) ends every pooled
/// server session. Individual clients never do.
pub struct ClientPool {
    topology: Arc<Topology>,
    options: ClientOptions,
    monitor: Option<Arc<dyn CommandMonitor>>,
    idle: Mutex<Vec<Client>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("topology", &self.topology)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ClientPool {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self {
            topology: Arc::new(Topology::new(transport)),
            options,
            monitor: None,
            idle: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Installs a command monitor on every client created afterwards.
    pub fn with_monitor(mut self, monitor: Arc<dyn CommandMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Takes an idle client, or creates one.
    pub fn pop(&self) -> Client {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        reused.unwrap_or_else(|| {
            Client::pooled(
                Arc::clone(&self.topology),
                self.options.clone(),
                self.monitor.clone(),
            )
        })
    }

    /// Returns a client obtained from [`ClientPool::pop`].
    ///
    /// Clients of other deployments are dropped.
    pub fn push(&self, client: Client) {
        if !client.is_pooled() || !Arc::ptr_eq(client.topology(), &self.topology) {
            debug!(client = %client.id(), "dropping client that does not belong to this pool");
            return;
        }
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(client);
    }

    /// Ends every pooled server session. Later calls do nothing.
    pub fn shutdown(&self) -> ReconcileReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ReconcileReport::default();
        }
        let client = self.pop();
        let report = client.end_pooled_sessions();
        self.push(client);
        report
    }
}

impl Drop for ClientPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
