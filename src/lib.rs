//! proxyauth - authorization helper for forward proxies
//!
//! This crate answers proxy login attempts over a line protocol. Credentials,
//! allowlisted client addresses, the master password and backconnect servers
//! are kept in sync with a remote management API and decided locally, or
//! checked per attempt behind a verdict cache.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod startup;

pub use auth::{can_login, PendingQuery, Snapshot, Verdict};
pub use config::{Config, ConfigResolution, ConfigResolver};
pub use error::{AuthError, Result};
pub use server::{ProtocolMode, QueryServer};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
