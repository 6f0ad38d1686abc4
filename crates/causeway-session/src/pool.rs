//! The shared pool of idle server sessions.
//!
//! One pool exists per deployment handle. Sessions are handed out
//! most-recently-used first so that a small working set of identifiers stays
//! warm on the server while the rest age out and are reaped.
//!
//! Reaping is opportunistic: `acquire` skips expired entries at the head and
//! `release` sweeps the whole list. Identifiers the pool discards are
//! remembered as "owed" so teardown can still tell the server about them.
//! At most [`MAX_OWED_SESSIONS`] are kept; past that the oldest are
//! forgotten and left to time out on the server.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use causeway_types::SessionId;
use tracing::debug;

use crate::end_sessions::DEFAULT_END_SESSIONS_BATCH_SIZE;
use crate::error::SessionResult;
use crate::server_session::ServerSession;
use crate::session_list::SessionList;

/// Most discarded identifiers remembered for teardown: one full
/// `endSessions` batch.
pub const MAX_OWED_SESSIONS: usize = DEFAULT_END_SESSIONS_BATCH_SIZE;

#[derive(Debug, Default)]
struct PoolInner {
    idle: SessionList,
    owed: VecDeque<SessionId>,
    timeout_minutes: Option<u32>,
}

impl PoolInner {
    fn forget(&mut self, sessions: Vec<ServerSession>) {
        for session in sessions {
            debug!(session_id = %session.id(), "reaped expired server session");
            self.owe(session.id());
        }
    }

    fn owe(&mut self, id: SessionId) {
        if self.owed.len() == MAX_OWED_SESSIONS {
            if let Some(oldest) = self.owed.pop_front() {
                debug!(session_id = %oldest, "owed list full, leaving session to expire on the server");
            }
        }
        self.owed.push_back(id);
    }
}

/// Mutex-protected LIFO pool of idle [`ServerSession`]s.
#[derive(Debug, Default)]
pub struct SessionPool {
    inner: Mutex<PoolInner>,
}

impl SessionPool {
    /// Creates an empty pool. Nothing is allocated until the first release.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pool with a known server session timeout.
    pub fn with_timeout_minutes(timeout_minutes: Option<u32>) -> Self {
        let pool = Self::new();
        pool.set_timeout_minutes(timeout_minutes);
        pool
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        // Every operation leaves the list consistent before it can panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the server's logical session timeout, in minutes.
    pub fn set_timeout_minutes(&self, timeout_minutes: Option<u32>) {
        self.lock().timeout_minutes = timeout_minutes;
    }

    pub fn timeout_minutes(&self) -> Option<u32> {
        self.lock().timeout_minutes
    }

    /// Takes the most recently released unexpired session, or mints one.
    pub fn acquire(&self, now: Instant) -> SessionResult<ServerSession> {
        {
            let mut inner = self.lock();
            let timeout = inner.timeout_minutes;
            while let Some(session) = inner.idle.pop_front() {
                if session.is_expired(now, timeout) {
                    inner.forget(vec![session]);
                    continue;
                }
                debug!(session_id = %session.id(), "reusing pooled server session");
                return Ok(session);
            }
        }

        let session = ServerSession::new()?;
        debug!(session_id = %session.id(), "minted server session");
        Ok(session)
    }

    /// Returns a session to the pool.
    ///
    /// Expired pooled sessions are swept first. The returned session keeps its
    /// `last_used`; a session that never carried a command is stamped with
    /// `now`. If the session itself has expired it is discarded.
    pub fn release(&self, mut session: ServerSession, now: Instant) {
        if session.last_used().is_none() {
            session.touch(now);
        }

        let mut inner = self.lock();
        let timeout = inner.timeout_minutes;
        let reaped = inner.idle.reap(now, timeout);
        inner.forget(reaped);

        if session.is_expired(now, timeout) {
            inner.forget(vec![session]);
        } else {
            inner.idle.push_front(session);
        }
    }

    /// Drops a session without pooling it, remembering its identifier.
    pub fn discard(&self, session: ServerSession) {
        debug!(session_id = %session.id(), "discarded server session");
        self.lock().owe(session.id());
    }

    /// Empties the pool, returning every idle identifier (most recent first)
    /// followed by the remembered discarded ones, oldest first.
    pub fn drain(&self) -> Vec<SessionId> {
        let mut inner = self.lock();
        let mut ids: Vec<SessionId> = inner.idle.drain().iter().map(ServerSession::id).collect();
        ids.extend(inner.owed.drain(..));
        ids
    }

    /// Number of idle sessions.
    pub fn len(&self) -> usize {
        self.lock().idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().idle.is_empty()
    }

    /// Idle identifiers, head first.
    pub fn idle_ids(&self) -> Vec<SessionId> {
        self.lock().idle.iter().map(ServerSession::id).collect()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.lock().idle.iter().any(|session| session.id() == *id)
    }

    /// `last_used` of the session the next `acquire` would consider first.
    pub fn head_last_used(&self) -> Option<Instant> {
        self.lock().idle.front().and_then(ServerSession::last_used)
    }

    /// Number of discarded identifiers awaiting teardown.
    pub fn owed_len(&self) -> usize {
        self.lock().owed.len()
    }
}
