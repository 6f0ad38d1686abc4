//! The deployment handle shared by every client of one deployment.

use std::sync::{Arc, PoisonError, RwLock};

use causeway_session::SessionPool;
use causeway_types::ClusterTime;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::transport::{ServerDescription, Transport};

/// Shared state for one deployment: the transport, what the handshake
/// reported, the highest cluster time seen, and the server session pool.
pub struct Topology {
    transport: Arc<dyn Transport>,
    pool: Arc<SessionPool>,
    description: RwLock<Option<ServerDescription>>,
    cluster_time: RwLock<Option<ClusterTime>>,
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("address", &self.transport.address())
            .field("pool", &self.pool)
            .field("description", &self.description)
            .field("cluster_time", &self.cluster_time)
            .finish_non_exhaustive()
    }
}

impl Topology {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pool: Arc::new(SessionPool::new()),
            description: RwLock::new(None),
            cluster_time: RwLock::new(None),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Describes the deployment, running the handshake on first use.
    pub fn describe(&self) -> Result<ServerDescription, TransportError> {
        if let Some(description) = self.description() {
            return Ok(description);
        }

        let description = self.transport.handshake()?;
        info!(
            address = %self.transport.address(),
            session_timeout_minutes = ?description.logical_session_timeout_minutes,
            "discovered deployment"
        );
        self.pool
            .set_timeout_minutes(description.logical_session_timeout_minutes);
        if let Some(cluster_time) = &description.cluster_time {
            self.advance_cluster_time(cluster_time);
        }
        *self
            .description
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(description.clone());
        Ok(description)
    }

    /// The last handshake result, without connecting.
    pub fn description(&self) -> Option<ServerDescription> {
        self.description
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `None` until described, or when the deployment does not support sessions.
    pub fn session_timeout_minutes(&self) -> Option<u32> {
        self.description()
            .and_then(|d| d.logical_session_timeout_minutes)
    }

    pub fn cluster_time(&self) -> Option<ClusterTime> {
        self.cluster_time
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Adopts `cluster_time` if it is greater than the current one.
    pub fn advance_cluster_time(&self, cluster_time: &ClusterTime) -> bool {
        let mut current = self
            .cluster_time
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(existing) if !cluster_time.is_greater_than(existing) => false,
            _ => {
                debug!(cluster_time = %cluster_time.timestamp(), "advanced deployment cluster time");
                *current = Some(cluster_time.clone());
                true
            }
        }
    }
}
