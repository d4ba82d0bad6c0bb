//! Configuration types for proxyauth

use crate::error::{AuthError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default number of concurrent auth workers
pub const DEFAULT_AUTH_THREADS: usize = 1;

/// Default interval between synchronization cycles in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Default timeout for requests to the management API in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default TTL for cached allow verdicts in seconds
pub const DEFAULT_ALLOW_TTL_SECS: u64 = 720;

/// Default TTL for cached deny verdicts in seconds
pub const DEFAULT_DENY_TTL_SECS: u64 = 180;

/// Connection details for the management API
#[derive(Clone)]
pub struct RemoteConfig {
    /// Base address of the management API
    pub api_addr: Url,
    /// API key, sent as the basic auth password
    pub api_key: SecretString,
    /// Identifier of the proxy server this helper runs on
    pub server_id: u64,
}

impl RemoteConfig {
    /// Build and validate a remote configuration from raw values
    pub fn new(api_addr: &str, api_key: &str, server_id: &str) -> Result<Self> {
        let api_addr = api_addr.trim();
        if api_addr.is_empty() {
            return Err(AuthError::config("API address cannot be empty"));
        }

        let url = Url::parse(api_addr)
            .map_err(|e| AuthError::config(format!("Invalid API address '{}': {}", api_addr, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AuthError::config(format!(
                "Invalid API address '{}': scheme must be http or https",
                api_addr
            )));
        }

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AuthError::config("API key cannot be empty"));
        }

        let server_id = server_id.trim().parse::<u64>().map_err(|e| {
            AuthError::config(format!("Invalid server identifier '{}': {}", server_id.trim(), e))
        })?;

        Ok(Self {
            api_addr: url,
            api_key: SecretString::new(api_key.to_string()),
            server_id,
        })
    }

    /// Build an endpoint URL below the API base address
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_addr.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Build an endpoint URL scoped to this server
    pub fn server_endpoint(&self, path: &str) -> String {
        self.endpoint(&format!("server/{}/{}", self.server_id, path))
    }

    /// Expose the API key for building requests
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_addr", &self.api_addr.as_str())
            .field("api_key", &"[REDACTED]")
            .field("server_id", &self.server_id)
            .finish()
    }
}

/// Raw remote connection values read from the api info file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiInfo {
    pub api_addr: Option<String>,
    pub api_key: Option<String>,
    pub server_id: Option<String>,
}

impl ApiInfo {
    /// Load the api info file: address, key and server id, one per line
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::config(format!("Failed to read api info file {:?}: {}", path, e))
        })?;
        Ok(Self::parse(&content))
    }

    /// Parse api info content; missing or blank lines stay unset
    pub fn parse(content: &str) -> Self {
        let mut lines = content.lines().map(str::trim);
        let mut next = || lines.next().filter(|l| !l.is_empty()).map(str::to_string);

        Self {
            api_addr: next(),
            api_key: next(),
            server_id: next(),
        }
    }
}

/// How login decisions are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionMode {
    /// Decide locally against the synced snapshot
    #[default]
    Snapshot,
    /// Ask the management API per attempt, with a verdict cache in front
    PerRequest,
}

impl std::str::FromStr for DecisionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "per-request" | "per_request" => Ok(Self::PerRequest),
            other => Err(format!("unknown decision mode '{}'", other)),
        }
    }
}

impl fmt::Display for DecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => write!(f, "snapshot"),
            Self::PerRequest => write!(f, "per-request"),
        }
    }
}

/// Naming of the hash and data endpoints on the management API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointFlavour {
    /// `auth_hash` and `auth_data`
    #[default]
    Data,
    /// `auth_config_hash` and `auth_config`
    Config,
}

impl EndpointFlavour {
    /// Path of the version hash endpoint, relative to the server scope
    pub fn hash_path(&self) -> &'static str {
        match self {
            Self::Data => "auth_hash",
            Self::Config => "auth_config_hash",
        }
    }

    /// Path of the full data endpoint, relative to the server scope
    pub fn data_path(&self) -> &'static str {
        match self {
            Self::Data => "auth_data",
            Self::Config => "auth_config",
        }
    }
}

impl std::str::FromStr for EndpointFlavour {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "data" => Ok(Self::Data),
            "config" => Ok(Self::Config),
            other => Err(format!("unknown endpoint flavour '{}'", other)),
        }
    }
}

/// Encoding of the data endpoint body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Gzip compressed JSON document
    #[default]
    Json,
    /// Plain `IP=` blocks with a separate master password endpoint
    Legacy,
}

impl std::str::FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown payload format '{}'", other)),
        }
    }
}

/// Helper protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// Number of concurrent auth workers
    pub auth_threads: usize,
    /// Whether input lines carry a channel token
    pub concurrent: bool,
    /// How decisions are obtained
    pub decision_mode: DecisionMode,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            auth_threads: DEFAULT_AUTH_THREADS,
            concurrent: true,
            decision_mode: DecisionMode::default(),
        }
    }
}

/// Synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between synchronization cycles
    pub interval_secs: u64,
    /// Per-request timeout against the management API
    pub request_timeout_secs: u64,
    /// Endpoint naming
    pub endpoint_flavour: EndpointFlavour,
    /// Data payload encoding
    pub payload_format: PayloadFormat,
    /// Poll `master_password/get` each cycle; its value overrides the payload's
    pub master_password_endpoint: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            endpoint_flavour: EndpointFlavour::default(),
            payload_format: PayloadFormat::default(),
            master_password_endpoint: false,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether the master password comes from its own endpoint
    ///
    /// Legacy payloads carry no master password, so they always use it.
    pub fn uses_master_password_endpoint(&self) -> bool {
        self.master_password_endpoint || self.payload_format == PayloadFormat::Legacy
    }
}

/// Verdict cache settings for per-request decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub allow_ttl_secs: u64,
    pub deny_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            allow_ttl_secs: DEFAULT_ALLOW_TTL_SECS,
            deny_ttl_secs: DEFAULT_DENY_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn allow_ttl(&self) -> Duration {
        Duration::from_secs(self.allow_ttl_secs)
    }

    pub fn deny_ttl(&self) -> Duration {
        Duration::from_secs(self.deny_ttl_secs)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Optional settings file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub helper: HelperConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            AuthError::config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if self.helper.auth_threads < 1 {
            return Err(AuthError::config("auth_threads must be greater than 0"));
        }

        if self.sync.interval_secs == 0 {
            return Err(AuthError::config("sync.interval_secs must be greater than 0"));
        }

        if self.sync.request_timeout_secs == 0 {
            return Err(AuthError::config(
                "sync.request_timeout_secs must be greater than 0",
            ));
        }

        if self.cache.allow_ttl_secs == 0 || self.cache.deny_ttl_secs == 0 {
            return Err(AuthError::config("cache TTLs must be greater than 0"));
        }

        Ok(())
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub settings: Settings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_config_endpoints() {
        let remote = RemoteConfig::new("https://api.example.com/", "secret", "42").unwrap();

        assert_eq!(
            remote.server_endpoint("auth_hash"),
            "https://api.example.com/server/42/auth_hash"
        );
        assert_eq!(
            remote.endpoint("master_password/get"),
            "https://api.example.com/master_password/get"
        );
        assert_eq!(remote.api_key(), "secret");
    }

    #[test]
    fn test_remote_config_rejects_bad_values() {
        assert!(RemoteConfig::new("", "key", "1").is_err());
        assert!(RemoteConfig::new("not a url", "key", "1").is_err());
        assert!(RemoteConfig::new("ftp://api.example.com", "key", "1").is_err());
        assert!(RemoteConfig::new("https://api.example.com", "  ", "1").is_err());
        assert!(RemoteConfig::new("https://api.example.com", "key", "abc").is_err());
        assert!(RemoteConfig::new("https://api.example.com", "key", "-3").is_err());
    }

    #[test]
    fn test_remote_config_debug_redacts_key() {
        let remote = RemoteConfig::new("https://api.example.com", "hunter2", "7").unwrap();
        let debug = format!("{:?}", remote);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_api_info_parse() {
        let info = ApiInfo::parse("https://api.example.com\nkey123\n17\n");
        assert_eq!(info.api_addr.as_deref(), Some("https://api.example.com"));
        assert_eq!(info.api_key.as_deref(), Some("key123"));
        assert_eq!(info.server_id.as_deref(), Some("17"));

        let partial = ApiInfo::parse("https://api.example.com\n");
        assert_eq!(partial.api_key, None);
        assert_eq!(partial.server_id, None);
    }

    #[test]
    fn test_settings_defaults_from_empty_yaml() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.helper.auth_threads, 1);
        assert!(settings.helper.concurrent);
        assert_eq!(settings.sync.interval_secs, 60);
        assert_eq!(settings.sync.request_timeout_secs, 10);
        assert_eq!(settings.cache.allow_ttl_secs, 720);
        assert_eq!(settings.cache.deny_ttl_secs, 180);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_yaml_overrides() {
        let yaml = r#"
helper:
  auth_threads: 8
  decision_mode: per-request
sync:
  endpoint_flavour: config
  payload_format: legacy
logging:
  format: json
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.helper.auth_threads, 8);
        assert_eq!(settings.helper.decision_mode, DecisionMode::PerRequest);
        assert_eq!(settings.sync.endpoint_flavour, EndpointFlavour::Config);
        assert_eq!(settings.sync.payload_format, PayloadFormat::Legacy);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.sync.interval_secs, 60);
        assert!(settings.sync.uses_master_password_endpoint());
    }

    #[test]
    fn test_master_password_endpoint_with_json_payload() {
        let settings: Settings = serde_yaml::from_str("sync:\n  master_password_endpoint: true\n").unwrap();
        assert_eq!(settings.sync.payload_format, PayloadFormat::Json);
        assert!(settings.sync.uses_master_password_endpoint());

        assert!(!Settings::default().sync.uses_master_password_endpoint());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.helper.auth_threads = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.sync.interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_endpoint_flavour_paths() {
        assert_eq!(EndpointFlavour::Data.hash_path(), "auth_hash");
        assert_eq!(EndpointFlavour::Data.data_path(), "auth_data");
        assert_eq!(EndpointFlavour::Config.hash_path(), "auth_config_hash");
        assert_eq!(EndpointFlavour::Config.data_path(), "auth_config");
    }
}
