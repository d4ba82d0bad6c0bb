//! Error handling module for proxyauth
//!
//! This module provides the crate error type and result alias.

mod error;

// Re-export the main error types and utilities
pub use error::{AuthError, Result};
