//! Configuration resolution with priority system
//!
//! Remote connection values resolve flag > environment > api info file.
//! Everything else resolves flag > environment > settings file > defaults.

use crate::config::environment::EnvironmentOverrides;
use crate::config::{
    ApiInfo, Config, DecisionMode, EndpointFlavour, PayloadFormat, RemoteConfig, Settings,
};
use crate::error::{AuthError, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_addr: Option<String>,
    pub api_key: Option<String>,
    pub server_id: Option<String>,
    pub api_info_file: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub auth_threads: Option<usize>,
    pub non_concurrent: bool,
    pub decision_mode: Option<DecisionMode>,
    pub endpoint_flavour: Option<EndpointFlavour>,
    pub payload_format: Option<PayloadFormat>,
    pub master_password_endpoint: bool,
    pub log_level: Option<String>,
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Environment,
    File,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Flag => write!(f, "command line"),
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::File => write!(f, "api info file"),
        }
    }
}

/// Configuration resolution result with metadata
#[derive(Debug, Clone)]
pub struct ConfigResolution {
    pub config: Config,
    pub settings_path: Option<PathBuf>,
    pub api_info_path: Option<PathBuf>,
    pub env_overrides: EnvironmentOverrides,
    pub api_addr_source: ValueSource,
    pub api_key_source: ValueSource,
    pub server_id_source: ValueSource,
}

/// Configuration resolver with priority system
pub struct ConfigResolver {
    env_overrides: EnvironmentOverrides,
}

impl ConfigResolver {
    /// Create a resolver reading overrides from the process environment
    pub fn new() -> Result<Self> {
        Ok(Self {
            env_overrides: EnvironmentOverrides::load()?,
        })
    }

    /// Create a resolver with explicit environment overrides
    pub fn with_env(env_overrides: EnvironmentOverrides) -> Self {
        Self { env_overrides }
    }

    /// Resolve configuration with full priority system
    pub fn resolve(&self, cli: &CliOverrides) -> Result<ConfigResolution> {
        let env = &self.env_overrides;

        // Step 1: settings file
        let settings_path = cli.config_path.clone().or_else(|| env.config_path.clone());
        let mut settings = match settings_path {
            Some(ref path) => {
                info!("Loading settings from: {:?}", path);
                Settings::from_file(path)?
            }
            None => {
                debug!("No settings file given, using defaults");
                Settings::default()
            }
        };

        // Step 2: api info file
        let api_info_path = cli.api_info_file.clone().or_else(|| env.api_info_file.clone());
        let api_info = match api_info_path {
            Some(ref path) => {
                debug!("Reading api info file: {:?}", path);
                ApiInfo::from_file(path)?
            }
            None => ApiInfo::default(),
        };

        // Step 3: remote connection triple
        let (api_addr, api_addr_source) =
            Self::pick("API address", &cli.api_addr, &env.api_addr, &api_info.api_addr)?;
        let (api_key, api_key_source) =
            Self::pick("API key", &cli.api_key, &env.api_key, &api_info.api_key)?;
        let (server_id, server_id_source) =
            Self::pick("server identifier", &cli.server_id, &env.server_id, &api_info.server_id)?;

        let remote = RemoteConfig::new(&api_addr, &api_key, &server_id)?;

        // Step 4: remaining flag and environment overrides
        if let Some(threads) = cli.auth_threads.or(env.auth_threads) {
            settings.helper.auth_threads = threads;
        }
        if cli.non_concurrent {
            settings.helper.concurrent = false;
        }
        if let Some(mode) = cli.decision_mode {
            settings.helper.decision_mode = mode;
        }
        if let Some(flavour) = cli.endpoint_flavour {
            settings.sync.endpoint_flavour = flavour;
        }
        if let Some(format) = cli.payload_format {
            settings.sync.payload_format = format;
        }
        if cli.master_password_endpoint {
            settings.sync.master_password_endpoint = true;
        }
        if let Some(ref level) = cli.log_level {
            settings.logging.level = level.clone();
        }

        // Step 5: validate
        settings.validate()?;

        Ok(ConfigResolution {
            config: Config { remote, settings },
            settings_path,
            api_info_path,
            env_overrides: env.clone(),
            api_addr_source,
            api_key_source,
            server_id_source,
        })
    }

    fn pick(
        name: &str,
        flag: &Option<String>,
        env: &Option<String>,
        file: &Option<String>,
    ) -> Result<(String, ValueSource)> {
        if let Some(value) = flag {
            return Ok((value.clone(), ValueSource::Flag));
        }
        if let Some(value) = env {
            return Ok((value.clone(), ValueSource::Environment));
        }
        if let Some(value) = file {
            return Ok((value.clone(), ValueSource::File));
        }
        Err(AuthError::config(format!(
            "Missing {} (set it by flag, environment variable or api info file)",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn api_info_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_resolve_from_api_info_file() {
        let file = api_info_file("https://api.example.com\nfilekey\n3\n");
        let cli = CliOverrides {
            api_info_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let resolution = ConfigResolver::with_env(EnvironmentOverrides::default())
            .resolve(&cli)
            .unwrap();

        assert_eq!(resolution.config.remote.server_id, 3);
        assert_eq!(resolution.config.remote.api_key(), "filekey");
        assert_eq!(resolution.api_key_source, ValueSource::File);
        assert_eq!(resolution.config.settings.helper.auth_threads, 1);
    }

    #[test]
    fn test_flag_beats_env_beats_file() {
        let file = api_info_file("https://file.example.com\nfilekey\n3\n");
        let env = EnvironmentOverrides {
            api_addr: Some("https://env.example.com".to_string()),
            api_key: Some("envkey".to_string()),
            auth_threads: Some(6),
            ..Default::default()
        };
        let cli = CliOverrides {
            api_addr: Some("https://flag.example.com".to_string()),
            api_info_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let resolution = ConfigResolver::with_env(env).resolve(&cli).unwrap();
        let remote = &resolution.config.remote;

        assert_eq!(remote.api_addr.host_str(), Some("flag.example.com"));
        assert_eq!(remote.api_key(), "envkey");
        assert_eq!(remote.server_id, 3);
        assert_eq!(resolution.api_addr_source, ValueSource::Flag);
        assert_eq!(resolution.api_key_source, ValueSource::Environment);
        assert_eq!(resolution.server_id_source, ValueSource::File);
        assert_eq!(resolution.config.settings.helper.auth_threads, 6);
    }

    #[test]
    fn test_missing_remote_values_fail() {
        let cli = CliOverrides {
            api_addr: Some("https://api.example.com".to_string()),
            api_key: Some("k".to_string()),
            ..Default::default()
        };

        let err = ConfigResolver::with_env(EnvironmentOverrides::default())
            .resolve(&cli)
            .unwrap_err();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("server identifier"));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let cli = CliOverrides {
            api_addr: Some("https://api.example.com".to_string()),
            api_key: Some("k".to_string()),
            server_id: Some("1".to_string()),
            auth_threads: Some(0),
            ..Default::default()
        };

        assert!(ConfigResolver::with_env(EnvironmentOverrides::default())
            .resolve(&cli)
            .is_err());
    }

    #[test]
    fn test_settings_file_and_flags() {
        let mut settings = NamedTempFile::new().unwrap();
        writeln!(settings, "helper:\n  auth_threads: 3\n  concurrent: true").unwrap();

        let cli = CliOverrides {
            api_addr: Some("https://api.example.com".to_string()),
            api_key: Some("k".to_string()),
            server_id: Some("1".to_string()),
            config_path: Some(settings.path().to_path_buf()),
            non_concurrent: true,
            decision_mode: Some(DecisionMode::PerRequest),
            ..Default::default()
        };

        let resolution = ConfigResolver::with_env(EnvironmentOverrides::default())
            .resolve(&cli)
            .unwrap();
        let helper = &resolution.config.settings.helper;

        assert_eq!(helper.auth_threads, 3);
        assert!(!helper.concurrent);
        assert_eq!(helper.decision_mode, DecisionMode::PerRequest);
    }
}
