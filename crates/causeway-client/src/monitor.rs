//! Command monitoring.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use causeway_types::Document;

use crate::error::TransportError;

static NEXT_REQUEST_ID: AtomicI64 = AtomicI64::new(1);

pub(crate) fn next_request_id() -> i64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct CommandStartedEvent<'a> {
    pub command: &'a Document,
    pub database_name: &'a str,
    pub command_name: &'a str,
    pub request_id: i64,
    pub operation_id: i64,
    pub address: &'a str,
}

#[derive(Debug, Clone)]
pub struct CommandSucceededEvent<'a> {
    pub reply: &'a Document,
    pub command_name: &'a str,
    pub request_id: i64,
    pub operation_id: i64,
    pub address: &'a str,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct CommandFailedEvent<'a> {
    pub error: &'a TransportError,
    pub command_name: &'a str,
    pub request_id: i64,
    pub operation_id: i64,
    pub address: &'a str,
    pub duration: Duration,
}

/// Observer for every command a client sends, `endSessions` included.
///
/// All methods default to doing nothing.
pub trait CommandMonitor: Send + Sync {
    fn started(&self, _event: &CommandStartedEvent<'_>) {}

    fn succeeded(&self, _event: &CommandSucceededEvent<'_>) {}

    fn failed(&self, _event: &CommandFailedEvent<'_>) {}
}
