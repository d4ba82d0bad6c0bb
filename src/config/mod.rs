//! Configuration module for proxyauth
//!
//! This module provides configuration types, environment overrides and the
//! resolver that merges command line, environment and file sources.

mod config;
pub mod environment;
pub mod resolver;

// Re-export the main configuration types
pub use config::{
    ApiInfo, CacheConfig, Config, DecisionMode, EndpointFlavour, HelperConfig, LogFormat,
    LoggingConfig, PayloadFormat, RemoteConfig, Settings, SyncConfig,
    DEFAULT_ALLOW_TTL_SECS, DEFAULT_AUTH_THREADS, DEFAULT_DENY_TTL_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SYNC_INTERVAL_SECS,
};
pub use environment::{EnvVars, EnvironmentOverrides};
pub use resolver::{CliOverrides, ConfigResolution, ConfigResolver, ValueSource};
