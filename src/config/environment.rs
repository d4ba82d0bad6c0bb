//! Environment variable integration for proxyauth configuration

use crate::error::{AuthError, Result};
use std::path::PathBuf;
use tracing::debug;

/// Environment variable names used by proxyauth
pub struct EnvVars;

impl EnvVars {
    pub const API_ADDR: &'static str = "PROXYAUTH_API_ADDR";
    pub const API_KEY: &'static str = "PROXYAUTH_API_KEY";
    pub const SERVER_ID: &'static str = "PROXYAUTH_SERVER_ID";
    pub const AUTH_THREADS: &'static str = "PROXYAUTH_AUTH_THREADS";
    pub const API_INFO_FILE: &'static str = "PROXYAUTH_API_INFO_FILE";
    pub const CONFIG_PATH: &'static str = "PROXYAUTH_CONFIG_PATH";
}

/// Environment configuration overrides
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOverrides {
    pub api_addr: Option<String>,
    pub api_key: Option<String>,
    pub server_id: Option<String>,
    pub auth_threads: Option<usize>,
    pub api_info_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl EnvironmentOverrides {
    /// Load environment variable overrides from the process environment
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load overrides through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut overrides = EnvironmentOverrides {
            api_addr: get(EnvVars::API_ADDR),
            api_key: get(EnvVars::API_KEY),
            server_id: get(EnvVars::SERVER_ID),
            auth_threads: None,
            api_info_file: get(EnvVars::API_INFO_FILE).map(PathBuf::from),
            config_path: get(EnvVars::CONFIG_PATH).map(PathBuf::from),
        };

        if let Some(threads) = get(EnvVars::AUTH_THREADS) {
            let parsed = threads.trim().parse::<usize>().map_err(|e| {
                AuthError::config(format!(
                    "Invalid {}: {} ({})",
                    EnvVars::AUTH_THREADS,
                    threads,
                    e
                ))
            })?;
            debug!("Environment override: {}={}", EnvVars::AUTH_THREADS, parsed);
            overrides.auth_threads = Some(parsed);
        }

        Ok(overrides)
    }

    /// Check if any environment overrides are active
    pub fn has_overrides(&self) -> bool {
        !self.get_override_summary().is_empty()
    }

    /// Get summary of active overrides for logging; the API key is never printed
    pub fn get_override_summary(&self) -> Vec<String> {
        let mut summary = Vec::new();

        if let Some(ref addr) = self.api_addr {
            summary.push(format!("{}={}", EnvVars::API_ADDR, addr));
        }
        if self.api_key.is_some() {
            summary.push(format!("{}=[REDACTED]", EnvVars::API_KEY));
        }
        if let Some(ref id) = self.server_id {
            summary.push(format!("{}={}", EnvVars::SERVER_ID, id));
        }
        if let Some(threads) = self.auth_threads {
            summary.push(format!("{}={}", EnvVars::AUTH_THREADS, threads));
        }
        if let Some(ref path) = self.api_info_file {
            summary.push(format!("{}={:?}", EnvVars::API_INFO_FILE, path));
        }
        if let Some(ref path) = self.config_path {
            summary.push(format!("{}={:?}", EnvVars::CONFIG_PATH, path));
        }

        summary
    }
}
