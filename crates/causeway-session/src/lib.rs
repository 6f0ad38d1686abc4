//! # causeway-session: Logical sessions for `Causeway`
//!
//! This crate owns the session state of a client:
//! - [`ServerSession`]: one reusable server-side session id
//! - [`SessionPool`]: the shared LIFO pool of idle server sessions
//! - [`ClientSession`]: a caller's session, carrying causal time state
//! - [`causal`]: rules for attaching session state to commands and merging
//!   it back from replies
//! - [`end_sessions`]: returning ids to the server at teardown
//!
//! Nothing here performs I/O. Command execution lives in `causeway-client`,
//! which drives these types around its transport.
//!
//! # Features
//!
//! - `session-ids` (default): random session id generation. Without it every
//!   attempt to mint a session fails with [`SessionError::SessionFailure`].

pub mod causal;
pub mod client_session;
pub mod end_sessions;
pub mod error;
pub mod pool;
pub mod server_session;
mod session_list;

pub use client_session::{ClientSession, SessionOptions};
pub use end_sessions::{
    DEFAULT_END_SESSIONS_BATCH_SIZE, EndSessionsSender, ReconcileReport,
    build_end_sessions_commands, reconcile,
};
pub use error::{SessionError, SessionResult};
pub use pool::{MAX_OWED_SESSIONS, SessionPool};
pub use server_session::{EXPIRY_SAFETY_MARGIN, ServerSession};
