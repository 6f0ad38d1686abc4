//! # causeway-client: Session-aware client for `Causeway`
//!
//! This crate runs commands against a deployment through a [`Transport`],
//! threading logical sessions and causal consistency through every command.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use causeway_client::{Client, ClientOptions, CommandOptions};
//! use causeway_session::SessionOptions;
//! use causeway_types::Command;
//!
//! let client = Client::new(Arc::new(transport), ClientOptions::default());
//! let mut session = client.start_session(SessionOptions::default())?;
//!
//! client.write_command(
//!     Command::from_value("shop", json!({"insert": "orders", "documents": [{"sku": 1}]})),
//!     CommandOptions::new().with_session(&mut session),
//! )?;
//!
//! // Sees the insert above, even on a lagging secondary.
//! let reply = client.read_command(
//!     Command::from_value("shop", json!({"find": "orders"})),
//!     CommandOptions::new().with_session(&mut session),
//! )?;
//! ```
//!
//! ## Configuration
//!
//! [`ClientOptions::from_config`] builds options from a
//! [`causeway_config::CausewayConfig`], which layers built-in defaults,
//! `causeway.toml` files and `CAUSEWAY_*` environment variables.
//!
//! ## Teardown
//!
//! A standalone [`Client`] ends its pooled server sessions when dropped. With
//! a [`ClientPool`], the pool does so instead.

mod client;
mod error;
mod monitor;
mod options;
mod pool;
mod topology;
mod transport;

pub use client::Client;
pub use error::{ClientError, ClientResult, TransportError};
pub use monitor::{CommandFailedEvent, CommandMonitor, CommandStartedEvent, CommandSucceededEvent};
pub use options::{ClientOptions, CommandOptions};
pub use pool::ClientPool;
pub use topology::Topology;
pub use transport::{ServerDescription, Transport};

// Re-export the session and value types callers need alongside the client
pub use causeway_session::{ClientSession, ReconcileReport, SessionError, SessionOptions};
pub use causeway_types::{
    ClusterTime, Command, Document, ReadConcern, SessionId, Timestamp, WriteConcern,
};
