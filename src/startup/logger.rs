//! Startup summary logging

use crate::config::{ConfigResolution, DecisionMode, PayloadFormat};
use tracing::{info, warn};

/// Logs the resolved configuration once at startup
pub struct StartupLogger;

impl StartupLogger {
    /// Display startup information; the api key is never printed
    pub fn display_startup_info(resolution: &ConfigResolution, version: &str) {
        info!("proxyauth v{} starting", version);

        Self::display_configuration_resolution(resolution);

        if resolution.env_overrides.has_overrides() {
            Self::display_environment_overrides(resolution);
        }

        Self::display_helper_settings(resolution);
    }

    fn display_configuration_resolution(resolution: &ConfigResolution) {
        let remote = &resolution.config.remote;

        info!("Configuration:");
        match resolution.settings_path {
            Some(ref path) => info!("   Settings file: {:?}", path),
            None => info!("   Settings file: built-in defaults"),
        }
        if let Some(ref path) = resolution.api_info_path {
            info!("   Api info file: {:?}", path);
        }
        info!("   API address: {} ({})", remote.api_addr, resolution.api_addr_source);
        info!("   API key: <redacted> ({})", resolution.api_key_source);
        info!("   Server id: {} ({})", remote.server_id, resolution.server_id_source);
    }

    fn display_environment_overrides(resolution: &ConfigResolution) {
        info!("Environment overrides:");
        for summary in resolution.env_overrides.get_override_summary() {
            info!("   {}", summary);
        }
    }

    fn display_helper_settings(resolution: &ConfigResolution) {
        let settings = &resolution.config.settings;

        info!("Helper:");
        info!(
            "   Protocol: {}",
            if settings.helper.concurrent { "concurrent" } else { "non-concurrent" }
        );
        info!("   Auth workers: {}", settings.helper.auth_threads);
        info!("   Decision mode: {}", settings.helper.decision_mode);

        match settings.helper.decision_mode {
            DecisionMode::Snapshot => {
                info!(
                    "   Sync: every {}s from {}/{}",
                    settings.sync.interval_secs,
                    settings.sync.endpoint_flavour.hash_path(),
                    settings.sync.endpoint_flavour.data_path()
                );
                if settings.sync.payload_format == PayloadFormat::Legacy {
                    info!("   Payload: legacy blocks");
                }
                if settings.sync.uses_master_password_endpoint() {
                    info!("   Master password: master_password/get (overrides payload)");
                }
            }
            DecisionMode::PerRequest => {
                info!(
                    "   Verdict cache: allow {}s, deny {}s",
                    settings.cache.allow_ttl_secs, settings.cache.deny_ttl_secs
                );
            }
        }

        if !settings.helper.concurrent && settings.helper.auth_threads > 1 {
            warn!("   Non-concurrent protocol answers in order; extra auth workers stay idle");
        }
    }
}
