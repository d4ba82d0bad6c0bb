//! Error types and handling for proxyauth

use thiserror::Error;

/// Result type alias for proxyauth operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Main error type for proxyauth
#[derive(Error, Debug)]
pub enum AuthError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Remote authorization source could not be reached or answered with a failure status
    #[error("Authorization source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// Authorization payload could not be decompressed or decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a source unavailable error
    pub fn source_unavailable<S: Into<String>>(message: S) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying on the next sync cycle
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::SourceUnavailable { .. }
                | AuthError::Decode { .. }
                | AuthError::Http(_)
                | AuthError::Io(_)
                | AuthError::Serde(_)
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AuthError::Config { .. } => "config",
            AuthError::SourceUnavailable { .. } => "source",
            AuthError::Decode { .. } => "decode",
            AuthError::Io(_) => "io",
            AuthError::Serde(_) => "serialization",
            AuthError::Yaml(_) => "yaml",
            AuthError::Http(_) => "http",
            AuthError::Internal(_) => "internal",
        }
    }
}
