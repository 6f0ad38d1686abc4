//! Server-side logical sessions.

use std::time::{Duration, Instant};

use causeway_types::SessionId;

#[cfg(not(feature = "session-ids"))]
use crate::error::SessionError;
use crate::error::SessionResult;

/// Idle time subtracted from the server's session timeout before a pooled
/// session is considered expired.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// One reusable logical session identifier plus its liveness timestamp.
///
/// A `ServerSession` is owned either by the pool or by exactly one client
/// session. It is deliberately not `Clone`.
#[derive(Debug)]
pub struct ServerSession {
    id: SessionId,
    last_used: Option<Instant>,
}

impl ServerSession {
    /// Mints a session with a fresh random identifier that has never been used.
    #[cfg(feature = "session-ids")]
    pub fn new() -> SessionResult<Self> {
        Ok(Self::with_id(SessionId::generate()))
    }

    /// Mints a session with a fresh random identifier that has never been used.
    #[cfg(not(feature = "session-ids"))]
    pub fn new() -> SessionResult<Self> {
        Err(SessionError::failure(
            "need a cryptography library to generate session identifiers",
        ))
    }

    /// Wraps a known identifier.
    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            last_used: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the session last carried a command; `None` if it never has.
    pub fn last_used(&self) -> Option<Instant> {
        self.last_used
    }

    pub fn set_last_used(&mut self, at: Instant) {
        self.last_used = Some(at);
    }

    /// Records use at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.set_last_used(now);
    }

    /// Whether the server may already have forgotten this session.
    ///
    /// Sessions are never expired while the timeout is unknown or before
    /// their first use.
    pub fn is_expired(&self, now: Instant, timeout_minutes: Option<u32>) -> bool {
        let (Some(timeout), Some(last_used)) = (timeout_minutes, self.last_used) else {
            return false;
        };
        let timeout = Duration::from_secs(u64::from(timeout) * 60);
        let threshold = timeout.saturating_sub(EXPIRY_SAFETY_MARGIN);
        now.saturating_duration_since(last_used) >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn session_used_at(at: Instant) -> ServerSession {
        let mut session = ServerSession::with_id(SessionId::from_bytes([7; 16]));
        session.set_last_used(at);
        session
    }

    #[test]
    fn never_used_session_does_not_expire() {
        let session = ServerSession::with_id(SessionId::from_bytes([1; 16]));
        let later = Instant::now() + Duration::from_secs(86_400);
        assert!(session.last_used().is_none());
        assert!(!session.is_expired(later, Some(30)));
    }

    #[test]
    fn unknown_timeout_never_expires() {
        let start = Instant::now();
        let session = session_used_at(start);
        assert!(!session.is_expired(start + Duration::from_secs(86_400), None));
    }

    // 30 minute timeout: expired once 29 minutes have elapsed.
    #[test_case(0, false ; "just used")]
    #[test_case(29 * 60 - 1, false ; "one second left")]
    #[test_case(29 * 60, true ; "at the threshold")]
    #[test_case(31 * 60, true ; "past the timeout")]
    fn expiry_threshold(elapsed_secs: u64, expired: bool) {
        let start = Instant::now();
        let session = session_used_at(start);
        let now = start + Duration::from_secs(elapsed_secs);
        assert_eq!(session.is_expired(now, Some(30)), expired);
    }

    #[test]
    fn clock_skew_does_not_expire() {
        let start = Instant::now();
        let session = session_used_at(start + Duration::from_secs(10));
        assert!(!session.is_expired(start, Some(30)));
    }

    #[test]
    fn one_minute_timeout_expires_immediately_after_use() {
        let start = Instant::now();
        let session = session_used_at(start);
        assert!(session.is_expired(start, Some(1)));
    }

    #[test]
    fn touch_records_use() {
        let mut session = ServerSession::with_id(SessionId::from_bytes([2; 16]));
        let now = Instant::now();
        session.touch(now);
        assert_eq!(session.last_used(), Some(now));
    }

    #[cfg(feature = "session-ids")]
    #[test]
    fn minted_sessions_are_distinct() {
        let a = ServerSession::new().expect("mint");
        let b = ServerSession::new().expect("mint");
        assert_ne!(a.id(), b.id());
    }
}
