//! # causeway-types: Core types for `Causeway`
//!
//! This crate contains the value types shared across the session core:
//! - Documents ([`Document`], [`Value`])
//! - Logical time ([`Timestamp`], [`ClusterTime`], [`ClusterTimeError`])
//! - Identities ([`SessionId`], [`ClientId`])
//! - Commands ([`Command`], [`CommandKind`])
//! - Concerns ([`ReadConcern`], [`WriteConcern`], [`Acknowledgement`])
//!
//! Documents use the extended-JSON conventions of the wire protocol:
//! timestamps are `{"$timestamp": {"t": .., "i": ..}}` and binary values are
//! `{"$binary": {"base64": .., "subType": ..}}`.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use serde_json::Value;

/// An ordered command, reply, or option document.
pub type Document = serde_json::Map<String, Value>;

// ============================================================================
// Logical Time
// ============================================================================

/// A `(timestamp, increment)` pair issued by the server cluster.
///
/// Ordering is lexicographic: the timestamp decides, the increment breaks
/// ties. [`Timestamp::ZERO`] is the "unset" value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    time: u32,
    increment: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        time: 0,
        increment: 0,
    };

    pub fn new(time: u32, increment: u32) -> Self {
        Self { time, increment }
    }

    /// Seconds component.
    pub fn time(&self) -> u32 {
        self.time
    }

    /// Ordinal within the second.
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Returns true unless this is the `(0, 0)` sentinel.
    pub fn is_set(&self) -> bool {
        *self != Self::ZERO
    }

    /// Renders as `{"$timestamp": {"t": .., "i": ..}}`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "$timestamp": { "t": self.time, "i": self.increment } })
    }

    /// Parses a `{"$timestamp": {"t": .., "i": ..}}` value.
    ///
    /// `field` names the enclosing field for error messages.
    pub fn from_value(value: &Value, field: &'static str) -> Result<Self, ClusterTimeError> {
        let inner = value
            .as_object()
            .and_then(|doc| doc.get("$timestamp"))
            .and_then(Value::as_object)
            .ok_or(ClusterTimeError::NotATimestamp(field))?;

        let component = |key: &str| {
            inner
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or(ClusterTimeError::NotATimestamp(field))
        };

        Ok(Self::new(component("t")?, component("i")?))
    }

    /// Replaces `self` with `candidate` if the candidate is strictly greater.
    ///
    /// Returns true when the value changed.
    pub fn advance(&mut self, candidate: Timestamp) -> bool {
        if candidate > *self {
            *self = candidate;
            true
        } else {
            false
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.time, self.increment)
    }
}

impl From<(u32, u32)> for Timestamp {
    fn from((time, increment): (u32, u32)) -> Self {
        Self::new(time, increment)
    }
}

/// Why a cluster-time document could not be used.
///
/// Cluster-time advancement is best effort: callers log these and keep the
/// previous value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterTimeError {
    /// The value is not a document.
    #[error("cluster time must be a document")]
    NotADocument,

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present but not a well-formed timestamp.
    #[error("field `{0}` is not a timestamp")]
    NotATimestamp(&'static str),
}

/// A gossiped cluster time, e.g.
/// `{"clusterTime": {"$timestamp": {..}}, "signature": {..}}`.
///
/// The document is kept verbatim (the server signs it) alongside the parsed
/// timestamp used for comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterTime {
    document: Document,
    timestamp: Timestamp,
}

impl ClusterTime {
    /// Validates and wraps a cluster-time document.
    pub fn parse(document: &Document) -> Result<Self, ClusterTimeError> {
        let field = document
            .get("clusterTime")
            .ok_or(ClusterTimeError::MissingField("clusterTime"))?;
        let timestamp = Timestamp::from_value(field, "clusterTime")?;
        Ok(Self {
            document: document.clone(),
            timestamp,
        })
    }

    /// Like [`ClusterTime::parse`] for an arbitrary value.
    pub fn from_value(value: &Value) -> Result<Self, ClusterTimeError> {
        value
            .as_object()
            .ok_or(ClusterTimeError::NotADocument)
            .and_then(Self::parse)
    }

    /// Builds an unsigned cluster time from a timestamp.
    pub fn from_timestamp(timestamp: Timestamp) -> Self {
        let mut document = Document::new();
        document.insert("clusterTime".to_string(), timestamp.to_value());
        Self {
            document,
            timestamp,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.document.clone())
    }

    /// Strict lexicographic comparison of the embedded timestamps.
    pub fn is_greater_than(&self, other: &ClusterTime) -> bool {
        self.timestamp > other.timestamp
    }
}

// ============================================================================
// Identities
// ============================================================================

/// Binary subtype used for UUID session identifiers.
const UUID_SUBTYPE: &str = "04";

/// Logical session identifier ("lsid").
///
/// Opaque to the client: compared for equality and serialized, never
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Generates a fresh random identifier.
    #[cfg(feature = "session-ids")]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Whether this build can generate identifiers at all.
    pub const fn generation_supported() -> bool {
        cfg!(feature = "session-ids")
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Renders the lsid document `{"id": {"$binary": {..}}}` sent on the wire.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(
            "id".to_string(),
            serde_json::json!({
                "$binary": {
                    "base64": BASE64.encode(self.0.as_bytes()),
                    "subType": UUID_SUBTYPE,
                }
            }),
        );
        document
    }

    /// Parses an lsid document produced by [`SessionId::to_document`].
    pub fn from_document(document: &Document) -> Option<Self> {
        let binary = document.get("id")?.get("$binary")?;
        if binary.get("subType")?.as_str()? != UUID_SUBTYPE {
            return None;
        }
        let raw = BASE64.decode(binary.get("base64")?.as_str()?).ok()?;
        let bytes: [u8; 16] = raw.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a client handle.
///
/// Sessions remember the client that created them so that commands issued
/// through another client can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocates the next identifier. Never returns the same value twice.
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

// ============================================================================
// Commands
// ============================================================================

/// The shape of a command, which decides what the session core may attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Generic command helper: never gets a read concern.
    Generic,
    /// Read command (find, aggregate without `$out`, count, ...).
    Read,
    /// Write command (insert, update, delete, ...).
    Write,
    /// Read/write command (aggregate with `$out`, findAndModify, ...).
    ReadWrite,
}

impl CommandKind {
    pub fn supports_read_concern(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn supports_write_concern(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// A command addressed to a database.
///
/// The command name is the first key of the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    database: String,
    body: Document,
}

impl Command {
    pub fn new(database: impl Into<String>, body: Document) -> Self {
        Self {
            database: database.into(),
            body,
        }
    }

    /// Builds a command from a JSON object literal.
    ///
    /// Non-object values produce an empty body.
    pub fn from_value(database: impl Into<String>, value: Value) -> Self {
        let body = match value {
            Value::Object(body) => body,
            _ => Document::new(),
        };
        Self::new(database, body)
    }

    /// The command name, or `""` for an empty body.
    pub fn name(&self) -> &str {
        self.body.keys().next().map_or("", String::as_str)
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn body(&self) -> &Document {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Document {
        &mut self.body
    }

    pub fn into_body(self) -> Document {
        self.body
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    /// Inserts or replaces a field, keeping existing key order.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.body.insert(key.into(), value);
    }
}

// ============================================================================
// Read & Write Concerns
// ============================================================================

/// Read concern level names understood by the server.
pub mod read_concern_level {
    pub const LOCAL: &str = "local";
    pub const MAJORITY: &str = "majority";
    pub const LINEARIZABLE: &str = "linearizable";
    pub const AVAILABLE: &str = "available";
    pub const SNAPSHOT: &str = "snapshot";
}

/// A read concern. The default (no level) renders as an empty document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadConcern {
    level: Option<String>,
}

impl ReadConcern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: Some(level.into()),
        }
    }

    pub fn local() -> Self {
        Self::with_level(read_concern_level::LOCAL)
    }

    pub fn majority() -> Self {
        Self::with_level(read_concern_level::MAJORITY)
    }

    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    pub fn is_default(&self) -> bool {
        self.level.is_none()
    }

    /// Renders the read concern, omitting defaults.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        if let Some(level) = &self.level {
            document.insert("level".to_string(), Value::String(level.clone()));
        }
        document
    }
}

/// Whether the server acknowledges a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Acknowledgement {
    #[default]
    Acknowledged,
    /// Fire-and-forget (`w: 0`): no reply is read.
    Unacknowledged,
}

/// The `w` component of a write concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteAcknowledgement {
    Nodes(u32),
    Majority,
}

/// A write concern. The default defers to the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteConcern {
    w: Option<WriteAcknowledgement>,
}

impl WriteConcern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(n: u32) -> Self {
        Self {
            w: Some(WriteAcknowledgement::Nodes(n)),
        }
    }

    pub fn majority() -> Self {
        Self {
            w: Some(WriteAcknowledgement::Majority),
        }
    }

    /// `w: 0`.
    pub fn unacknowledged() -> Self {
        Self::nodes(0)
    }

    pub fn w(&self) -> Option<&WriteAcknowledgement> {
        self.w.as_ref()
    }

    pub fn acknowledgement(&self) -> Acknowledgement {
        match self.w {
            Some(WriteAcknowledgement::Nodes(0)) => Acknowledgement::Unacknowledged,
            _ => Acknowledgement::Acknowledged,
        }
    }

    pub fn is_default(&self) -> bool {
        self.w.is_none()
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        match &self.w {
            Some(WriteAcknowledgement::Nodes(n)) => {
                document.insert("w".to_string(), Value::from(*n));
            }
            Some(WriteAcknowledgement::Majority) => {
                document.insert("w".to_string(), Value::from("majority"));
            }
            None => {}
        }
        document
    }
}
